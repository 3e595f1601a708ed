use crate::config::Settings;
use crate::domain::recommendation::{Recommendation, RiskLevel, HOLDING_PERIOD};
use crate::sources::{ScoredSource, SourceFailure};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/recommendations/scored";

pub const MAX_RECOMMENDATIONS: u32 = 50;
pub const MIN_SCORE: f64 = 70.0;
pub const RISK_PROFILE: &str = "moderate";

#[derive(Debug, Clone)]
pub struct HttpScoredSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
}

impl HttpScoredSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_scored_api_base_url()?.to_string();
        let api_key = settings.scored_api_key.clone();

        let timeout_secs = std::env::var("SCORED_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let path = std::env::var("SCORED_API_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build scored API http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap, SourceFailure> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            let value = HeaderValue::from_str(api_key).map_err(|e| SourceFailure::Transport {
                detail: format!("invalid scored API key header: {e}"),
            })?;
            headers.insert("x-api-key", value);
        }
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl ScoredSource for HttpScoredSource {
    fn source_name(&self) -> &'static str {
        "scored_http"
    }

    async fn fetch_scored(&self) -> Result<Vec<RawScoredRecommendation>, SourceFailure> {
        let headers = self.headers()?;

        let res = self
            .http
            .post(self.url())
            .headers(headers)
            .json(&ScoredRequest::fixed())
            .send()
            .await
            .map_err(|e| SourceFailure::Transport {
                detail: format!("scored API request failed: {e}"),
            })?;

        let status = res.status();
        let text = res.text().await.map_err(|e| SourceFailure::Transport {
            detail: format!("failed to read scored API response: {e}"),
        })?;

        if !status.is_success() {
            return Err(SourceFailure::Transport {
                detail: format!("scored API HTTP {status}: {text}"),
            });
        }

        let parsed =
            serde_json::from_str::<ScoredResponse>(&text).map_err(|e| SourceFailure::Transport {
                detail: format!("scored API response is not the expected JSON: {e}"),
            })?;

        parsed.into_accepted()
    }
}

/// Fixed request body of the primary API. The parameters never vary per
/// call; mode switches only select cache partitions.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRequest {
    pub max_recommendations: u32,
    pub min_score: f64,
    pub risk_profile: &'static str,
    pub include_metadata: bool,
}

impl ScoredRequest {
    pub fn fixed() -> Self {
        Self {
            max_recommendations: MAX_RECOMMENDATIONS,
            min_score: MIN_SCORE,
            risk_profile: RISK_PROFILE,
            include_metadata: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoredResponse {
    pub status: String,

    #[serde(default)]
    pub recommendations: Option<Vec<RawScoredRecommendation>>,
    #[serde(default)]
    pub total_count: Option<usize>,
    #[serde(default)]
    pub execution_time: Option<f64>,
}

impl ScoredResponse {
    /// Success only when status is literally "success" and the list is
    /// present and non-empty. Everything else is a rejection.
    pub fn into_accepted(self) -> Result<Vec<RawScoredRecommendation>, SourceFailure> {
        if self.status != "success" {
            return Err(SourceFailure::Rejected {
                detail: format!("scored API status={}", self.status),
            });
        }
        match self.recommendations {
            Some(items) if !items.is_empty() => Ok(items),
            Some(_) => Err(SourceFailure::Rejected {
                detail: "scored API returned status=success with an empty list".to_string(),
            }),
            None => Err(SourceFailure::Rejected {
                detail: "scored API returned status=success with no list".to_string(),
            }),
        }
    }
}

/// Raw record of the primary API. Every field that upstream may omit is an
/// explicit Option here; defaults are applied once, in
/// `into_recommendation`, and nowhere else.
#[derive(Debug, Clone, Deserialize)]
pub struct RawScoredRecommendation {
    pub symbol: String,

    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub change_percent: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub analysis: Option<RawAnalysis>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAnalysis {
    #[serde(default)]
    pub technical_score: Option<f64>,
    #[serde(default)]
    pub fundamental_score: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl RawScoredRecommendation {
    /// Normalization boundary. Absent-field policy: name falls back to the
    /// symbol, sector to "N/A", every numeric to 0.0. Target and stop-loss
    /// are the fixed 5% swing band around the current price.
    pub fn into_recommendation(self) -> Recommendation {
        let score = self.score.unwrap_or(0.0);
        let price = self.price.unwrap_or(0.0);
        let change_percent = self.change_percent.unwrap_or(0.0);
        let analysis = self.analysis;

        Recommendation {
            name: self.name.unwrap_or_else(|| self.symbol.clone()),
            symbol: self.symbol,
            score,
            price,
            target: price * 1.05,
            stop_loss: price * 0.95,
            change: price * change_percent / 100.0,
            change_percent,
            volume: self.volume.unwrap_or(0.0),
            sector: self.sector.unwrap_or_else(|| "N/A".to_string()),
            risk_level: RiskLevel::from_score(score),
            holding_period: HOLDING_PERIOD.to_string(),
            signals: Vec::new(),
            momentum: analysis
                .as_ref()
                .and_then(|a| a.technical_score)
                .unwrap_or(0.0),
            volatility: 0.0,
            ai_score: Some(score),
            ai_confidence: analysis.as_ref().and_then(|a| a.confidence),
            ai_summary: analysis.and_then(|a| a.summary),
        }
    }
}
