use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swingdesk_core::cache::RecommendationCache;
use swingdesk_core::domain::recommendation::{Recommendation, RiskLevel};
use swingdesk_core::resolver::{ResolveOptions, Resolved, Resolver};
use swingdesk_core::sources::scored::HttpScoredSource;
use swingdesk_core::sources::theme::{DisabledThemeSource, HttpThemeSource};
use swingdesk_core::sources::ThemeSource;

#[derive(Debug, Parser)]
#[command(name = "swingdesk_worker")]
struct Args {
    /// Bypass the cache and go straight to the upstream chain.
    #[arg(long)]
    force: bool,

    /// Resolve against the AI cache partition instead of the standard one.
    #[arg(long)]
    ai_mode: bool,

    /// Enable the theme fallback for this run, regardless of
    /// THEME_FALLBACK_ENABLED.
    #[arg(long)]
    theme_fallback: bool,

    /// Print the resolved list as JSON instead of a table.
    #[arg(long)]
    json: bool,
}

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

    let args = Args::parse();

    let mut options = ResolveOptions::from_env();
    if args.theme_fallback {
        options.theme_fallback_enabled = true;
    }

    let scored = Arc::new(HttpScoredSource::from_settings(&settings)?);
    let theme: Arc<dyn ThemeSource> = if options.theme_fallback_enabled {
        Arc::new(HttpThemeSource::from_settings(&settings)?)
    } else {
        Arc::new(DisabledThemeSource)
    };
    let cache = Arc::new(RecommendationCache::from_env());

    let resolver = Resolver::new(scored, theme, cache, options);

    match resolver.resolve(args.force, args.ai_mode).await {
        Ok(resolved) => {
            tracing::info!(
                count = resolved.items.len(),
                source = resolved.source.as_str(),
                force = args.force,
                ai_mode = args.ai_mode,
                "resolution complete"
            );
            print_resolved(&resolved, args.json)?;
            Ok(())
        }
        Err(err) => {
            let err = anyhow::Error::new(err);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "resolution exhausted every source");
            Err(err)
        }
    }
}

fn print_resolved(resolved: &Resolved, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        let out = serde_json::to_string_pretty(&resolved.items)
            .context("failed to serialize recommendations")?;
        println!("{out}");
        return Ok(());
    }

    println!(
        "{:<8} {:<24} {:>7} {:>10} {:>10} {:>10} {:>8} {:<8}",
        "SYMBOL", "NAME", "SCORE", "PRICE", "TARGET", "STOP", "CHG%", "RISK"
    );
    for rec in &resolved.items {
        println!(
            "{:<8} {:<24} {:>7.1} {:>10.2} {:>10.2} {:>10.2} {:>8.2} {:<8}",
            rec.symbol,
            truncate(&rec.name, 24),
            rec.score,
            rec.price,
            rec.target,
            rec.stop_loss,
            rec.change_percent,
            rec.risk_level.as_str(),
        );
    }
    println!("{}", summary_line(&resolved.items, resolved.source.as_str()));
    Ok(())
}

fn summary_line(items: &[Recommendation], source: &str) -> String {
    let count_of = |level: RiskLevel| items.iter().filter(|r| r.risk_level == level).count();
    format!(
        "{} recommendations (source={source}): {} low / {} medium / {} high risk",
        items.len(),
        count_of(RiskLevel::Low),
        count_of(RiskLevel::Medium),
        count_of(RiskLevel::High),
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
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
