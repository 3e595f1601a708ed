use crate::cache::{CachePartition, RecommendationCache};
use crate::domain::recommendation::{Recommendation, RecommendationSource};
use crate::resolver::Resolver;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use uuid::Uuid;

/// Snapshot of what the rendering boundary may display: the current list
/// plus the pass-through loading/error signals.
#[derive(Debug, Clone, Default)]
pub struct RefreshState {
    pub recommendations: Vec<Recommendation>,
    pub loading: bool,
    pub error: Option<String>,
    pub last_refresh_time: Option<DateTime<Utc>>,
    pub last_refresh_id: Option<Uuid>,
    pub source: Option<RecommendationSource>,
}

/// Owns the polling loop and serializes resolutions. At most one resolution
/// is in flight; a `fetch_data` call arriving while one is running awaits
/// its completion instead of starting another.
pub struct BackgroundRefresher {
    resolver: Resolver,
    cache: Arc<RecommendationCache>,
    ai_mode: bool,
    auto_refresh: AtomicBool,
    state: RwLock<RefreshState>,
    run_guard: tokio::sync::Mutex<()>,
    completed: tokio::sync::watch::Sender<u64>,
}

impl BackgroundRefresher {
    pub fn new(resolver: Resolver, cache: Arc<RecommendationCache>, ai_mode: bool) -> Self {
        let (completed, _) = tokio::sync::watch::channel(0u64);
        Self {
            resolver,
            cache,
            ai_mode,
            auto_refresh: AtomicBool::new(true),
            state: RwLock::new(RefreshState::default()),
            run_guard: tokio::sync::Mutex::new(()),
            completed,
        }
    }

    pub fn ai_mode(&self) -> bool {
        self.ai_mode
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        self.auto_refresh.store(enabled, Ordering::Relaxed);
    }

    pub fn auto_refresh(&self) -> bool {
        self.auto_refresh.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> RefreshState {
        match self.state.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut RefreshState) -> R) -> R {
        let mut guard = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Runs one resolution, or joins the one already in flight. On success
    /// the list is replaced atomically and written through to the cache
    /// partition for this mode; on exhaustion the visible list is cleared so
    /// stale data never sits next to an error.
    pub async fn fetch_data(&self, force_refresh: bool) -> RefreshState {
        // Subscribe before probing the guard: the completion signal is sent
        // after the guard is released, so a signal from the holder we lose
        // the race to is always newer than this receiver's seen value.
        let mut rx = self.completed.subscribe();
        let guard = match self.run_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                // In-flight resolution; await its completion and reuse it.
                let _ = rx.changed().await;
                return self.state();
            }
        };

        self.with_state(|st| st.loading = true);

        let outcome = self.resolver.resolve(force_refresh, self.ai_mode).await;

        let snapshot = self.with_state(|st| {
            st.loading = false;
            match outcome {
                Ok(resolved) => {
                    if resolved.source != RecommendationSource::Cache {
                        self.cache.put(
                            CachePartition::for_ai_mode(self.ai_mode),
                            resolved.items.clone(),
                        );
                    }
                    st.recommendations = resolved.items;
                    st.error = None;
                    st.last_refresh_time = Some(Utc::now());
                    st.last_refresh_id = Some(Uuid::new_v4());
                    st.source = Some(resolved.source);
                }
                Err(err) => {
                    tracing::error!(error = %err, ai_mode = self.ai_mode, "refresh failed");
                    st.recommendations = Vec::new();
                    st.error = Some(err.to_string());
                    st.source = None;
                }
            }
            st.clone()
        });

        drop(guard);
        self.completed.send_modify(|n| *n = n.wrapping_add(1));
        snapshot
    }

    /// Periodic loop: one `fetch_data(false)` per tick while auto-refresh is
    /// enabled. Errors are recorded in the state and logged, never fatal.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick of a tokio interval fires immediately; the eager
        // initial fetch is the host's call, not this loop's.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if !self.auto_refresh() {
                continue;
            }
            let state = self.fetch_data(false).await;
            if let Some(error) = &state.error {
                tracing::warn!(%error, "periodic refresh left no data");
            } else {
                tracing::debug!(
                    count = state.recommendations.len(),
                    source = state.source.map(|s| s.as_str()).unwrap_or("none"),
                    "periodic refresh complete"
                );
            }
        }
    }

    pub fn spawn(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recommendation::Recommendation;
    use crate::resolver::{ResolveOptions, Resolver};
    use crate::sources::scored::RawScoredRecommendation;
    use crate::sources::{ScoredSource, SourceFailure, ThemeSelection, ThemeSource};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FlakyScored {
        calls: AtomicUsize,
        fail: AtomicBool,
        delay: Duration,
    }

    impl FlakyScored {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                delay,
            }
        }
    }

    #[async_trait::async_trait]
    impl ScoredSource for FlakyScored {
        fn source_name(&self) -> &'static str {
            "flaky_scored"
        }

        async fn fetch_scored(&self) -> Result<Vec<RawScoredRecommendation>, SourceFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(SourceFailure::Transport {
                    detail: "connection refused".to_string(),
                });
            }
            Ok(serde_json::from_value(serde_json::json!([
                { "symbol": "AAPL", "score": 85.0, "price": 100.0, "change_percent": 2.5 }
            ]))
            .unwrap())
        }
    }

    struct NeverTheme;

    #[async_trait::async_trait]
    impl ThemeSource for NeverTheme {
        fn source_name(&self) -> &'static str {
            "never_theme"
        }

        async fn fetch_theme(
            &self,
            _selection: &ThemeSelection,
        ) -> Result<Vec<Recommendation>, SourceFailure> {
            Err(SourceFailure::Transport {
                detail: "unreachable".to_string(),
            })
        }
    }

    fn refresher(delay: Duration) -> (Arc<BackgroundRefresher>, Arc<FlakyScored>) {
        let scored = Arc::new(FlakyScored::new(delay));
        let cache = Arc::new(RecommendationCache::new(Duration::from_secs(60)));
        let resolver = Resolver::new(
            scored.clone(),
            Arc::new(NeverTheme),
            cache.clone(),
            ResolveOptions::default(),
        );
        (
            Arc::new(BackgroundRefresher::new(resolver, cache, false)),
            scored,
        )
    }

    #[tokio::test]
    async fn success_populates_state_and_writes_through_to_cache() {
        let (refresher, scored) = refresher(Duration::ZERO);

        let state = refresher.fetch_data(true).await;
        assert_eq!(state.recommendations.len(), 1);
        assert_eq!(state.error, None);
        assert!(!state.loading);
        assert!(state.last_refresh_time.is_some());
        assert!(state.last_refresh_id.is_some());
        assert_eq!(state.source, Some(RecommendationSource::Scored));
        assert_eq!(scored.calls.load(Ordering::SeqCst), 1);

        // The next non-forced fetch is served from the written-through cache.
        let cached = refresher.fetch_data(false).await;
        assert_eq!(cached.source, Some(RecommendationSource::Cache));
        assert_eq!(scored.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_calls_share_one_resolution() {
        let (refresher, scored) = refresher(Duration::from_millis(50));

        let a = refresher.clone();
        let b = refresher.clone();
        let (first, second) = tokio::join!(a.fetch_data(true), b.fetch_data(true));

        assert_eq!(scored.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.recommendations.len(), 1);
        assert_eq!(second.recommendations.len(), 1);
        assert_eq!(first.last_refresh_id, second.last_refresh_id);
    }

    #[tokio::test]
    async fn late_arriving_call_joins_the_in_flight_resolution() {
        let (refresher, scored) = refresher(Duration::from_millis(50));

        let first = {
            let r = refresher.clone();
            tokio::spawn(async move { r.fetch_data(true).await })
        };
        // Arrive mid-flight, after the first resolution is already running.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = tokio::time::timeout(Duration::from_secs(1), refresher.fetch_data(true))
            .await
            .expect("joining an in-flight resolution must not hang");
        let first = first.await.unwrap();

        assert_eq!(scored.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.recommendations.len(), 1);
        assert_eq!(first.last_refresh_id, second.last_refresh_id);
    }

    #[tokio::test]
    async fn failure_clears_a_previously_displayed_list() {
        let (refresher, scored) = refresher(Duration::ZERO);

        let ok = refresher.fetch_data(true).await;
        assert_eq!(ok.recommendations.len(), 1);

        scored.fail.store(true, Ordering::SeqCst);
        let failed = refresher.fetch_data(true).await;
        assert!(failed.recommendations.is_empty());
        let error = failed.error.unwrap();
        assert!(error.starts_with("no data available from any recommendation source"));
        assert_eq!(failed.source, None);
        // The last successful refresh time is retained.
        assert_eq!(failed.last_refresh_time, ok.last_refresh_time);
    }

    #[tokio::test]
    async fn auto_refresh_toggle_is_observable() {
        let (refresher, _) = refresher(Duration::ZERO);
        assert!(refresher.auto_refresh());
        refresher.set_auto_refresh(false);
        assert!(!refresher.auto_refresh());
    }
}
