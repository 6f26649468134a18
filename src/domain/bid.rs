//! Bids returned by the preload endpoint

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Where a bid wants to be shown relative to the conversation.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, Default)]
pub enum DisplayPosition {
    #[default]
    #[serde(rename = "afterUserMessage")]
    AfterUserMessage,
    #[serde(rename = "afterAssistantMessage")]
    AfterAssistantMessage,
}

impl DisplayPosition {
    /// Lenient parse: anything unrecognised falls back to `AfterUserMessage`
    /// instead of failing the whole preload response.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw {
            Some("afterUserMessage") => DisplayPosition::AfterUserMessage,
            Some("afterAssistantMessage") => DisplayPosition::AfterAssistantMessage,
            other => {
                tracing::warn!(
                    position = ?other,
                    "Unknown ad display position, defaulting to afterUserMessage"
                );
                DisplayPosition::AfterUserMessage
            }
        }
    }
}

impl<'de> Deserialize<'de> for DisplayPosition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(DisplayPosition::parse_lenient(value.as_str()))
    }
}

/// A server-selected ad opportunity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bid {
    #[serde(rename = "bidId")]
    pub bid_id: String,
    /// Placement code, e.g. `inlineAd`
    pub code: String,
    #[serde(rename = "adDisplayPosition", default)]
    pub display_position: DisplayPosition,
}

impl Bid {
    pub fn new(
        bid_id: impl Into<String>,
        code: impl Into<String>,
        display_position: DisplayPosition,
    ) -> Self {
        Self {
            bid_id: bid_id.into(),
            code: code.into(),
            display_position,
        }
    }
}

/// Successful preload answer, after server-side error flags were checked.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreloadOutcome {
    pub session_id: Option<String>,
    pub bids: Option<Vec<Bid>>,
    pub remote_log_level: Option<String>,
    /// Server override for the next preload timeout
    pub preload_timeout: Option<Duration>,
}
