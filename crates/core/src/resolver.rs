use crate::cache::{CachePartition, RecommendationCache};
use crate::domain::recommendation::{Recommendation, RecommendationSource};
use crate::sources::{ScoredSource, SourceFailure, ThemeSelection, ThemeSource};
use std::fmt;
use std::sync::Arc;

/// Per-resolver knobs. The theme path exists behind a flag that defaults to
/// disabled; the chain never reaches it otherwise.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub theme_fallback_enabled: bool,
    pub theme_selection: ThemeSelection,
}

impl ResolveOptions {
    pub fn from_env() -> Self {
        Self {
            theme_fallback_enabled: crate::config::theme_fallback_enabled_from_env(),
            theme_selection: ThemeSelection::from_env(),
        }
    }
}

/// Outcome of one resolution: the list plus which chain step produced it.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub items: Vec<Recommendation>,
    pub source: RecommendationSource,
}

/// All sources failed. Carries the ordered per-source failures so callers
/// can report diagnostics without parsing logs.
#[derive(Debug, Clone)]
pub struct ResolveError {
    pub attempts: Vec<(RecommendationSource, SourceFailure)>,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no data available from any recommendation source")?;
        for (source, failure) in &self.attempts {
            write!(f, "; {}: {}", source.as_str(), failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolveError {}

pub struct Resolver {
    scored: Arc<dyn ScoredSource>,
    theme: Arc<dyn ThemeSource>,
    cache: Arc<RecommendationCache>,
    options: ResolveOptions,
}

impl Resolver {
    pub fn new(
        scored: Arc<dyn ScoredSource>,
        theme: Arc<dyn ThemeSource>,
        cache: Arc<RecommendationCache>,
        options: ResolveOptions,
    ) -> Self {
        Self {
            scored,
            theme,
            cache,
            options,
        }
    }

    /// Strict ordered fallback chain: cache, then the scored API, then the
    /// theme API when enabled. Short-circuits on the first success; sources
    /// are never merged. Intermediate failures are logged and swallowed,
    /// only exhaustion of the chain is an error.
    pub async fn resolve(
        &self,
        force_refresh: bool,
        ai_mode: bool,
    ) -> Result<Resolved, ResolveError> {
        if !force_refresh {
            let partition = CachePartition::for_ai_mode(ai_mode);
            if let Some(items) = self.cache.get(partition) {
                tracing::debug!(
                    partition = partition.key(),
                    count = items.len(),
                    "resolved from cache"
                );
                return Ok(Resolved {
                    items,
                    source: RecommendationSource::Cache,
                });
            }
        }

        let mut attempts: Vec<(RecommendationSource, SourceFailure)> = Vec::new();

        match self.scored.fetch_scored().await {
            Ok(raw) => {
                let items: Vec<Recommendation> = raw
                    .into_iter()
                    .map(|r| r.into_recommendation())
                    .collect();
                tracing::info!(
                    source = self.scored.source_name(),
                    count = items.len(),
                    "resolved from scored API"
                );
                return Ok(Resolved {
                    items,
                    source: RecommendationSource::Scored,
                });
            }
            Err(failure) => {
                tracing::warn!(
                    source = self.scored.source_name(),
                    kind = failure.kind(),
                    error = %failure,
                    "scored API failed; advancing fallback chain"
                );
                attempts.push((RecommendationSource::Scored, failure));
            }
        }

        if self.options.theme_fallback_enabled {
            match self.theme.fetch_theme(&self.options.theme_selection).await {
                Ok(items) => {
                    tracing::info!(
                        source = self.theme.source_name(),
                        count = items.len(),
                        "resolved from theme API"
                    );
                    return Ok(Resolved {
                        items,
                        source: RecommendationSource::Theme,
                    });
                }
                Err(failure) => {
                    tracing::warn!(
                        source = self.theme.source_name(),
                        kind = failure.kind(),
                        error = %failure,
                        "theme API failed; chain exhausted"
                    );
                    attempts.push((RecommendationSource::Theme, failure));
                }
            }
        }

        Err(ResolveError { attempts })
    }
}
