use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use swingdesk_core::cache::RecommendationCache;
use swingdesk_core::domain::recommendation::{Recommendation, RecommendationSource};
use swingdesk_core::refresh::{BackgroundRefresher, RefreshState};
use swingdesk_core::resolver::{ResolveOptions, Resolver};
use swingdesk_core::sources::scored::HttpScoredSource;
use swingdesk_core::sources::theme::{DisabledThemeSource, HttpThemeSource};
use swingdesk_core::sources::ThemeSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = swingdesk_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let ai_mode = std::env::var("AI_MODE")
        .ok()
        .and_then(|s| s.parse::<bool>().ok())
        .unwrap_or(false);

    let refresher: Option<Arc<BackgroundRefresher>> = match build_refresher(&settings, ai_mode) {
        Ok(refresher) => Some(refresher),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "upstream clients unavailable; starting API in degraded mode");
            None
        }
    };

    if let Some(refresher) = &refresher {
        let initial = refresher.fetch_data(false).await;
        if let Some(error) = &initial.error {
            tracing::warn!(%error, "initial refresh produced no data");
        }

        let interval = swingdesk_core::config::refresh_interval_from_env();
        refresher.clone().spawn(interval);
        tracing::info!(interval_secs = interval.as_secs(), ai_mode, "refresh loop started");
    }

    let state = AppState { refresher };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/recommendations", get(get_recommendations))
        .route("/recommendations/refresh", post(post_refresh))
        .route("/recommendations/:symbol", get(get_recommendation_by_symbol))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_refresher(
    settings: &swingdesk_core::config::Settings,
    ai_mode: bool,
) -> anyhow::Result<Arc<BackgroundRefresher>> {
    let options = ResolveOptions::from_env();

    let scored = Arc::new(HttpScoredSource::from_settings(settings)?);
    let theme: Arc<dyn ThemeSource> = if options.theme_fallback_enabled {
        Arc::new(HttpThemeSource::from_settings(settings)?)
    } else {
        Arc::new(DisabledThemeSource)
    };

    let cache = Arc::new(RecommendationCache::from_env());
    let resolver = Resolver::new(scored, theme, cache.clone(), options);

    Ok(Arc::new(BackgroundRefresher::new(resolver, cache, ai_mode)))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    refresher: Option<Arc<BackgroundRefresher>>,
}

#[derive(Debug, Serialize)]
struct RecommendationsPayload {
    recommendations: Vec<Recommendation>,
    count: usize,
    loading: bool,
    error: Option<String>,
    last_refresh_time: Option<DateTime<Utc>>,
    refresh_id: Option<Uuid>,
    source: Option<RecommendationSource>,
}

impl From<RefreshState> for RecommendationsPayload {
    fn from(state: RefreshState) -> Self {
        Self {
            count: state.recommendations.len(),
            recommendations: state.recommendations,
            loading: state.loading,
            error: state.error,
            last_refresh_time: state.last_refresh_time,
            refresh_id: state.last_refresh_id,
            source: state.source,
        }
    }
}

async fn get_recommendations(
    State(state): State<AppState>,
) -> Result<Json<RecommendationsPayload>, StatusCode> {
    let Some(refresher) = &state.refresher else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    Ok(Json(refresher.state().into()))
}

async fn post_refresh(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RecommendationsPayload>), StatusCode> {
    let Some(refresher) = &state.refresher else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let refreshed = refresher.fetch_data(true).await;
    let status = if refreshed.error.is_some() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };

    Ok((status, Json(refreshed.into())))
}

async fn get_recommendation_by_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Recommendation>, StatusCode> {
    let Some(refresher) = &state.refresher else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let current = refresher.state();
    let item = current
        .recommendations
        .into_iter()
        .find(|r| r.symbol.eq_ignore_ascii_case(&symbol))
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(item))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &swingdesk_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
