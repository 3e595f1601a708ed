pub mod scored;
pub mod theme;

use crate::domain::recommendation::Recommendation;
use self::scored::RawScoredRecommendation;
use std::fmt;

/// Non-fatal upstream failure; every variant advances the fallback chain.
#[derive(Debug, Clone)]
pub enum SourceFailure {
    // Upstream answered but declined: bad status, null or empty list.
    Rejected { detail: String },
    // Network error, HTTP error status, or an unparseable body.
    Transport { detail: String },
}

impl SourceFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceFailure::Rejected { .. } => "rejected",
            SourceFailure::Transport { .. } => "transport",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            SourceFailure::Rejected { detail } => detail,
            SourceFailure::Transport { detail } => detail,
        }
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.detail())
    }
}

impl std::error::Error for SourceFailure {}

#[async_trait::async_trait]
pub trait ScoredSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_scored(&self) -> Result<Vec<RawScoredRecommendation>, SourceFailure>;
}

#[async_trait::async_trait]
pub trait ThemeSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_theme(
        &self,
        selection: &ThemeSelection,
    ) -> Result<Vec<Recommendation>, SourceFailure>;
}

/// Theme API selection; absent fields are omitted from the request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThemeSelection {
    pub market_condition: Option<String>,
    pub risk_tolerance: Option<String>,
    pub time_period: Option<String>,
}

impl ThemeSelection {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| {
            std::env::var(key)
                .ok()
                .filter(|s| !s.trim().is_empty())
        };
        Self {
            market_condition: non_empty("THEME_MARKET_CONDITION"),
            risk_tolerance: non_empty("THEME_RISK_TOLERANCE"),
            time_period: non_empty("THEME_TIME_PERIOD"),
        }
    }
}
