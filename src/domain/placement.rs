//! Resolved placements and the public ad result

use std::collections::BTreeMap;

use super::{Bid, Message};
use crate::error::AdsError;

/// Everything a rendering surface needs to show one bid next to one message.
///
/// Derived, never stored: recomputed whenever bids or messages change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdPlacement {
    /// Message the ad is attached to
    pub message_id: String,
    pub bid: Bid,
    /// URL the inline surface loads
    pub render_url: String,
    /// Base ad server URL (used to resolve relative click targets)
    pub ad_server_url: String,
    /// Last N messages of the conversation, pushed to the surface on init
    pub messages: Vec<Message>,
    pub sdk: String,
    /// Pass-through parameters, e.g. `theme`
    pub other_params: BTreeMap<String, String>,
}

/// Placements keyed by message id. Messages without ads are absent.
pub type PlacementMap = BTreeMap<String, Vec<AdPlacement>>;

/// Result published to ad observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdResult {
    /// Ads are available; key is the message id they attach to.
    Success(PlacementMap),
    /// Nothing to show, and why.
    Error(AdsError),
}

impl AdResult {
    pub fn placements(&self) -> Option<&PlacementMap> {
        match self {
            AdResult::Success(map) => Some(map),
            AdResult::Error(_) => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, AdResult::Error(AdsError::AdUnavailable))
    }
}
