//! Placement resolution
//!
//! Pure mapping from (bids, enabled codes, message window) to per-message
//! placements. Only the latest User message and the latest Assistant message
//! of the window can carry ads; messages without an eligible bid are absent
//! from the result.

use std::collections::BTreeMap;

use url::Url;

use crate::config::AdsConfig;
use crate::domain::device::SDK_NAME;
use crate::domain::{AdPlacement, Bid, DisplayPosition, Message, PlacementMap, Role};

/// Which surface a URL is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceComponent {
    /// Inline ad next to a message
    Frame,
    /// Overlay opened by the ad creative
    Modal,
}

impl SurfaceComponent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceComponent::Frame => "frame",
            SurfaceComponent::Modal => "modal",
        }
    }
}

/// Session-level parameters every placement is rendered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    pub ad_server_url: String,
    pub sdk: String,
    pub other_params: BTreeMap<String, String>,
    /// Messages handed to each placement
    pub message_window: usize,
}

impl RenderContext {
    pub fn from_config(config: &AdsConfig, message_window: usize) -> Self {
        Self {
            ad_server_url: config.ad_server_url.clone(),
            sdk: SDK_NAME.to_string(),
            other_params: config.other_params(),
            message_window,
        }
    }

    /// `{base}/api/{component}/{bidId}?messageId=..&code=..&sdk=..&<other params>`
    pub fn surface_url(&self, component: SurfaceComponent, bid: &Bid, message_id: &str) -> String {
        let raw = format!(
            "{}/api/{}/{}",
            self.ad_server_url,
            component.as_str(),
            bid.bid_id
        );

        let mut url = match Url::parse(&raw) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(url = %raw, error = %e, "Cannot build surface URL");
                return raw;
            }
        };

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("messageId", message_id)
                .append_pair("code", &bid.code)
                .append_pair("sdk", &self.sdk);
            for (key, value) in &self.other_params {
                query.append_pair(key, value);
            }
        }

        url.into()
    }

    pub fn render_url(&self, bid: &Bid, message_id: &str) -> String {
        self.surface_url(SurfaceComponent::Frame, bid, message_id)
    }

    pub fn modal_url(&self, bid: &Bid, message_id: &str) -> String {
        self.surface_url(SurfaceComponent::Modal, bid, message_id)
    }
}

/// Attach bids to messages.
///
/// A bid with an enabled code goes to the latest User message when it asks for
/// `AfterUserMessage`, to the latest Assistant message when it asks for
/// `AfterAssistantMessage`, and nowhere else.
pub fn resolve(
    bids: &[Bid],
    enabled_codes: &[String],
    messages: &[Message],
    context: &RenderContext,
) -> PlacementMap {
    let mut result = PlacementMap::new();
    if bids.is_empty() || messages.is_empty() {
        return result;
    }

    let latest_user = messages.iter().rev().find(|m| m.role == Role::User);
    let latest_assistant = messages.iter().rev().find(|m| m.role == Role::Assistant);

    let window_start = messages.len().saturating_sub(context.message_window);
    let window = &messages[window_start..];

    for bid in bids.iter().filter(|b| enabled_codes.contains(&b.code)) {
        let target = match bid.display_position {
            DisplayPosition::AfterUserMessage => latest_user,
            DisplayPosition::AfterAssistantMessage => latest_assistant,
        };
        let Some(target) = target else {
            continue;
        };

        result
            .entry(target.id.clone())
            .or_default()
            .push(AdPlacement {
                message_id: target.id.clone(),
                bid: bid.clone(),
                render_url: context.render_url(bid, &target.id),
                ad_server_url: context.ad_server_url.clone(),
                messages: window.to_vec(),
                sdk: context.sdk.clone(),
                other_params: context.other_params.clone(),
            });
    }

    result
}
