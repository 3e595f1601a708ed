use crate::config::Settings;
use crate::domain::recommendation::Recommendation;
use crate::sources::scored::MAX_RECOMMENDATIONS;
use crate::sources::{SourceFailure, ThemeSelection, ThemeSource};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/recommendations/themes";

#[derive(Debug, Clone)]
pub struct HttpThemeSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
}

impl HttpThemeSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_theme_api_base_url()?.to_string();
        let api_key = settings.theme_api_key.clone();

        let timeout_secs = std::env::var("THEME_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let path = std::env::var("THEME_API_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build theme API http client")?;

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
                detail: format!("invalid theme API key header: {e}"),
            })?;
            headers.insert("x-api-key", value);
        }
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl ThemeSource for HttpThemeSource {
    fn source_name(&self) -> &'static str {
        "theme_http"
    }

    async fn fetch_theme(
        &self,
        selection: &ThemeSelection,
    ) -> Result<Vec<Recommendation>, SourceFailure> {
        let headers = self.headers()?;

        let res = self
            .http
            .post(self.url())
            .headers(headers)
            .json(&ThemeRequest::from_selection(selection))
            .send()
            .await
            .map_err(|e| SourceFailure::Transport {
                detail: format!("theme API request failed: {e}"),
            })?;

        let status = res.status();
        let text = res.text().await.map_err(|e| SourceFailure::Transport {
            detail: format!("failed to read theme API response: {e}"),
        })?;

        if !status.is_success() {
            return Err(SourceFailure::Transport {
                detail: format!("theme API HTTP {status}: {text}"),
            });
        }

        let parsed =
            serde_json::from_str::<ThemeResponse>(&text).map_err(|e| SourceFailure::Transport {
                detail: format!("theme API response is not the expected JSON: {e}"),
            })?;

        parsed.into_accepted()
    }
}

/// Stand-in injected when the theme fallback is off; the resolver never
/// reaches it in that configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledThemeSource;

#[async_trait::async_trait]
impl ThemeSource for DisabledThemeSource {
    fn source_name(&self) -> &'static str {
        "theme_disabled"
    }

    async fn fetch_theme(
        &self,
        _selection: &ThemeSelection,
    ) -> Result<Vec<Recommendation>, SourceFailure> {
        Err(SourceFailure::Rejected {
            detail: "theme fallback is disabled".to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ThemeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_tolerance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_period: Option<String>,
    pub max_recommendations: u32,
}

impl ThemeRequest {
    pub fn from_selection(selection: &ThemeSelection) -> Self {
        Self {
            market_condition: selection.market_condition.clone(),
            risk_tolerance: selection.risk_tolerance.clone(),
            time_period: selection.time_period.clone(),
            max_recommendations: MAX_RECOMMENDATIONS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThemeResponse {
    pub success: bool,

    #[serde(default)]
    pub recommendations: Option<Vec<Recommendation>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ThemeResponse {
    /// Items are already in output shape and are passed through unmodified.
    /// An empty or absent list is a rejection like any other.
    pub fn into_accepted(self) -> Result<Vec<Recommendation>, SourceFailure> {
        if !self.success {
            let detail = match self.error {
                Some(msg) => format!("theme API success=false: {msg}"),
                None => "theme API success=false".to_string(),
            };
            return Err(SourceFailure::Rejected { detail });
        }
        match self.recommendations {
            Some(items) if !items.is_empty() => Ok(items),
            _ => Err(SourceFailure::Rejected {
                detail: "theme API returned success=true with no recommendations".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recommendation::{RiskLevel, HOLDING_PERIOD};
    use serde_json::json;

    fn theme_item(symbol: &str) -> serde_json::Value {
        json!({
            "symbol": symbol,
            "name": format!("{symbol} Corp"),
            "score": 82.0,
            "price": 50.0,
            "target": 52.5,
            "stop_loss": 47.5,
            "change": 0.5,
            "change_percent": 1.0,
            "volume": 100_000.0,
            "sector": "Energy",
            "risk_level": "low",
            "holding_period": HOLDING_PERIOD,
            "signals": [],
            "momentum": 60.0,
            "volatility": 0.0
        })
    }

    #[test]
    fn request_omits_absent_selection_fields() {
        let req = ThemeRequest::from_selection(&ThemeSelection {
            market_condition: Some("bullish".to_string()),
            risk_tolerance: None,
            time_period: None,
        });

        let v = serde_json::to_value(req).unwrap();
        assert_eq!(
            v,
            json!({ "market_condition": "bullish", "max_recommendations": 50 })
        );
    }

    #[test]
    fn passes_through_successful_list_unmodified() {
        let res: ThemeResponse = serde_json::from_value(json!({
            "success": true,
            "recommendations": [theme_item("XOM"), theme_item("CVX")]
        }))
        .unwrap();

        let items = res.into_accepted().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].symbol, "XOM");
        assert_eq!(items[0].risk_level, RiskLevel::Low);
        assert_eq!(items[1].price, 50.0);
    }

    #[test]
    fn failure_folds_upstream_error_into_detail() {
        let res: ThemeResponse = serde_json::from_value(json!({
            "success": false,
            "error": "no themes for selection"
        }))
        .unwrap();

        let err = res.into_accepted().unwrap_err();
        assert!(matches!(err, SourceFailure::Rejected { .. }));
        assert!(err.detail().contains("no themes for selection"));
    }

    #[test]
    fn empty_list_is_a_rejection() {
        let res: ThemeResponse =
            serde_json::from_value(json!({ "success": true, "recommendations": [] })).unwrap();
        assert!(matches!(
            res.into_accepted(),
            Err(SourceFailure::Rejected { .. })
        ));
    }
}
