use serde::{Deserialize, Serialize};

pub const HOLDING_PERIOD: &str = "3-10 days";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: String,
    pub name: String,
    pub score: f64,
    pub price: f64,
    pub target: f64,
    pub stop_loss: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: f64,
    pub sector: String,
    pub risk_level: RiskLevel,
    pub holding_period: String,
    pub signals: Vec<String>,
    pub momentum: f64,
    pub volatility: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            RiskLevel::Low
        } else if score >= 70.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

// Which step of the fallback chain produced the active list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    Cache,
    Scored,
    Theme,
}

impl RecommendationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationSource::Cache => "cache",
            RecommendationSource::Scored => "scored",
            RecommendationSource::Theme => "theme",
        }
    }
}
