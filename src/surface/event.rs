//! Typed events of the surface protocol
//!
//! [`ProtocolEvent`] is what ad content sends to the host; [`CallbackEvent`] is
//! the `event-iframe` sub-family; [`AdEvent`] is the public projection handed
//! to the application.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

/// Identifies the overlay a modal event refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRef {
    pub code: String,
    pub component: String,
}

/// Inbound event decoded from surface JSON. Never fails to exist: anything
/// malformed becomes [`ProtocolEvent::Unknown`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    Init,
    Show,
    Hide,
    Resize {
        height: f64,
    },
    Click {
        id: String,
        content: String,
        message_id: String,
        url: String,
    },
    View {
        id: String,
        content: String,
        message_id: String,
    },
    AdDone {
        id: String,
        content: String,
        message_id: String,
    },
    Error {
        message: String,
    },
    OpenModal {
        code: String,
        component: String,
        /// Absent on the wire means "use the host default"
        timeout_ms: Option<u64>,
    },
    ModalInit(ComponentRef),
    ModalError(ComponentRef),
    ModalClose(ComponentRef),
    Callback(CallbackEvent),
    Unknown {
        event_type: String,
        raw: String,
    },
}

impl ProtocolEvent {
    /// Wire `type` this event was decoded from.
    pub fn type_name(&self) -> &str {
        match self {
            ProtocolEvent::Init => "init-iframe",
            ProtocolEvent::Show => "show-iframe",
            ProtocolEvent::Hide => "hide-iframe",
            ProtocolEvent::Resize { .. } => "resize-iframe",
            ProtocolEvent::Click { .. } => "click-iframe",
            ProtocolEvent::View { .. } => "view-iframe",
            ProtocolEvent::AdDone { .. } => "ad-done-iframe",
            ProtocolEvent::Error { .. } => "error-iframe",
            ProtocolEvent::OpenModal { .. } => "open-component-iframe",
            ProtocolEvent::ModalInit(_) => "init-component-iframe",
            ProtocolEvent::ModalError(_) => "error-component-iframe",
            ProtocolEvent::ModalClose(_) => "close-component-iframe",
            ProtocolEvent::Callback(_) => "event-iframe",
            ProtocolEvent::Unknown { event_type, .. } => event_type,
        }
    }

    /// Open timeout of an `OpenModal`, falling back to `default`.
    pub fn modal_timeout(&self, default: Duration) -> Option<Duration> {
        match self {
            ProtocolEvent::OpenModal { timeout_ms, .. } => {
                Some(timeout_ms.map(Duration::from_millis).unwrap_or(default))
            }
            _ => None,
        }
    }
}

/// `event-iframe` payloads, dispatched by `name`.
///
/// Payload fields missing on the wire decode as empty strings.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackEvent {
    Viewed {
        code: String,
        bid_id: String,
        content: String,
        message_id: String,
        format: String,
    },
    Clicked {
        code: String,
        bid_id: String,
        content: String,
        message_id: String,
        url: String,
        format: String,
        area: String,
    },
    RenderStarted {
        code: String,
        bid_id: String,
    },
    RenderCompleted {
        code: String,
        bid_id: String,
    },
    Error {
        code: String,
        message: String,
        err_code: String,
    },
    RewardGranted {
        code: String,
        bid_id: String,
    },
    VideoStarted {
        code: String,
        bid_id: String,
    },
    VideoCompleted {
        code: String,
        bid_id: String,
    },
    Generic {
        name: String,
        code: String,
        payload: Map<String, Value>,
    },
}

impl CallbackEvent {
    pub fn code(&self) -> &str {
        match self {
            CallbackEvent::Viewed { code, .. }
            | CallbackEvent::Clicked { code, .. }
            | CallbackEvent::RenderStarted { code, .. }
            | CallbackEvent::RenderCompleted { code, .. }
            | CallbackEvent::Error { code, .. }
            | CallbackEvent::RewardGranted { code, .. }
            | CallbackEvent::VideoStarted { code, .. }
            | CallbackEvent::VideoCompleted { code, .. }
            | CallbackEvent::Generic { code, .. } => code,
        }
    }
}

/// Ad interaction reported to the application.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdEvent {
    Viewed {
        code: String,
        bid_id: String,
        content: String,
        message_id: String,
        format: String,
    },
    Clicked {
        code: String,
        bid_id: String,
        content: String,
        message_id: String,
        url: String,
        format: String,
        area: String,
    },
    RenderStarted {
        code: String,
        bid_id: String,
    },
    RenderCompleted {
        code: String,
        bid_id: String,
    },
    Error {
        code: String,
        message: String,
        err_code: String,
    },
    RewardGranted {
        code: String,
        bid_id: String,
    },
    VideoStarted {
        code: String,
        bid_id: String,
    },
    VideoCompleted {
        code: String,
        bid_id: String,
    },
    Generic {
        name: String,
        code: String,
        payload: Map<String, Value>,
    },
}

impl From<CallbackEvent> for AdEvent {
    fn from(event: CallbackEvent) -> Self {
        match event {
            CallbackEvent::Viewed {
                code,
                bid_id,
                content,
                message_id,
                format,
            } => AdEvent::Viewed {
                code,
                bid_id,
                content,
                message_id,
                format,
            },
            CallbackEvent::Clicked {
                code,
                bid_id,
                content,
                message_id,
                url,
                format,
                area,
            } => AdEvent::Clicked {
                code,
                bid_id,
                content,
                message_id,
                url,
                format,
                area,
            },
            CallbackEvent::RenderStarted { code, bid_id } => AdEvent::RenderStarted { code, bid_id },
            CallbackEvent::RenderCompleted { code, bid_id } => {
                AdEvent::RenderCompleted { code, bid_id }
            }
            CallbackEvent::Error {
                code,
                message,
                err_code,
            } => AdEvent::Error {
                code,
                message,
                err_code,
            },
            CallbackEvent::RewardGranted { code, bid_id } => AdEvent::RewardGranted { code, bid_id },
            CallbackEvent::VideoStarted { code, bid_id } => AdEvent::VideoStarted { code, bid_id },
            CallbackEvent::VideoCompleted { code, bid_id } => {
                AdEvent::VideoCompleted { code, bid_id }
            }
            CallbackEvent::Generic {
                name,
                code,
                payload,
            } => AdEvent::Generic {
                name,
                code,
                payload,
            },
        }
    }
}
