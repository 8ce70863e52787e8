//! Core data models for the chat pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Intent =================
//

/// Classified purpose of a user utterance.
///
/// Anything the planner emits outside the known taxonomy deserializes to
/// `GeneralChat`, which routes to the plain assistant path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    StockAnalysis,
    MarketNews,
    #[serde(other)]
    GeneralChat,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::StockAnalysis => "stock_analysis",
            Intent::MarketNews => "market_news",
            Intent::GeneralChat => "general_chat",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Plan =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// Routing plan produced once per request by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub intent: Intent,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl Plan {
    /// Fallback plan used whenever planner output cannot be decoded.
    pub fn general_chat() -> Self {
        Self {
            intent: Intent::GeneralChat,
            entities: Vec::new(),
        }
    }

    /// Ticker symbol, if the leading entity is a non-empty ticker.
    pub fn ticker(&self) -> Option<&str> {
        self.entities
            .first()
            .filter(|e| e.kind == "ticker" && !e.value.trim().is_empty())
            .map(|e| e.value.as_str())
    }
}

//
// ================= Stock Payload =================
//

/// Consolidated stock data handed to the synthesizer.
///
/// Each section is independently optional: a source whose body lacked the
/// expected keys simply contributes nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<Quote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<Overview>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub news: Vec<NewsHeadline>,
}

impl StockPayload {
    pub fn is_empty(&self) -> bool {
        self.quote.is_none() && self.overview.is_none() && self.news.is_empty()
    }
}

/// Alpha Vantage ships numeric fields as strings; they are forwarded as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub price: Option<String>,
    pub change_percent: Option<String>,
    pub volume: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overview {
    pub market_cap: Option<String>,
    pub pe_ratio: Option<String>,
    pub eps: Option<String>,
    #[serde(rename = "52_week_high")]
    pub week52_high: Option<String>,
    #[serde(rename = "52_week_low")]
    pub week52_low: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsHeadline {
    pub title: Option<String>,
    pub sentiment: Option<String>,
}

//
// ================= Market News =================
//

/// One item of the financial-markets news listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: Option<String>,
    pub summary: Option<String>,
}

//
// ================= Request / Response =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Terminal artifact returned to the caller; immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    pub response: String,
    pub backend: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_deserializes_known_values() {
        let plan: Plan =
            serde_json::from_str(r#"{"intent": "stock_analysis", "entities": []}"#).unwrap();
        assert_eq!(plan.intent, Intent::StockAnalysis);

        let plan: Plan = serde_json::from_str(r#"{"intent": "market_news"}"#).unwrap();
        assert_eq!(plan.intent, Intent::MarketNews);
        assert!(plan.entities.is_empty());
    }

    #[test]
    fn test_unknown_intent_falls_back_to_general_chat() {
        let plan: Plan =
            serde_json::from_str(r#"{"intent": "weather_report", "entities": []}"#).unwrap();
        assert_eq!(plan.intent, Intent::GeneralChat);
    }

    #[test]
    fn test_missing_intent_is_a_decode_error() {
        let result = serde_json::from_str::<Plan>(r#"{"entities": []}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_ticker_requires_type_and_non_empty_value() {
        let plan: Plan = serde_json::from_str(
            r#"{"intent": "stock_analysis", "entities": [{"type": "ticker", "value": "TSLA"}]}"#,
        )
        .unwrap();
        assert_eq!(plan.ticker(), Some("TSLA"));

        let plan: Plan = serde_json::from_str(
            r#"{"intent": "stock_analysis", "entities": [{"type": "company", "value": "Tesla"}]}"#,
        )
        .unwrap();
        assert_eq!(plan.ticker(), None);

        let plan: Plan = serde_json::from_str(
            r#"{"intent": "stock_analysis", "entities": [{"type": "ticker", "value": "  "}]}"#,
        )
        .unwrap();
        assert_eq!(plan.ticker(), None);

        assert_eq!(Plan::general_chat().ticker(), None);
    }

    #[test]
    fn test_payload_serialization_omits_missing_sections() {
        let payload = StockPayload {
            quote: Some(Quote {
                price: Some("245.30".to_string()),
                change_percent: Some("1.2%".to_string()),
                volume: None,
            }),
            overview: None,
            news: vec![],
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("quote").is_some());
        assert!(json.get("overview").is_none());
        assert!(json.get("news").is_none());
    }
}
