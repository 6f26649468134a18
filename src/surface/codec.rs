//! Surface protocol codec
//!
//! Envelope: `{"type": string, "data": object | null}`; `error-iframe` carries
//! its text in a top-level `message`.
//!
//! Decoding is total. Content is third-party code, so anything that does not
//! match the table below becomes `ProtocolEvent::Unknown` instead of an error.
//!
//! | type                     | required data fields              |
//! |--------------------------|-----------------------------------|
//! | `init-iframe`            | -                                 |
//! | `show-iframe`            | -                                 |
//! | `hide-iframe`            | -                                 |
//! | `resize-iframe`          | `height` (number)                 |
//! | `click-iframe`           | `id content messageId url`        |
//! | `view-iframe`            | `id content messageId`            |
//! | `ad-done-iframe`         | `id content messageId`            |
//! | `error-iframe`           | (top-level `message`, optional)   |
//! | `open-component-iframe`  | `code component` (`timeout` opt.) |
//! | `*-component-iframe`     | `code component`                  |
//! | `event-iframe`           | `name code payload{}`             |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::event::{CallbackEvent, ComponentRef, ProtocolEvent};
use crate::domain::{AdPlacement, Message};

pub const PARSE_ERROR_TYPE: &str = "parse-error";
const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

// ============================================================================
// Inbound
// ============================================================================

/// Decode one inbound surface message.
pub fn decode(raw: &str) -> ProtocolEvent {
    let root = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(root)) => root,
        _ => return unknown(PARSE_ERROR_TYPE, raw),
    };

    let event_type = root.get("type").and_then(Value::as_str).unwrap_or("");
    let data = root.get("data").and_then(Value::as_object);

    let decoded = match event_type {
        "init-iframe" => Some(ProtocolEvent::Init),
        "show-iframe" => Some(ProtocolEvent::Show),
        "hide-iframe" => Some(ProtocolEvent::Hide),
        "resize-iframe" => data
            .and_then(|d| d.get("height"))
            .and_then(Value::as_f64)
            .map(|height| ProtocolEvent::Resize { height }),
        "click-iframe" => data.and_then(|d| {
            Some(ProtocolEvent::Click {
                id: string(d, "id")?,
                content: string(d, "content")?,
                message_id: string(d, "messageId")?,
                url: string(d, "url")?,
            })
        }),
        "view-iframe" => data.and_then(|d| {
            Some(ProtocolEvent::View {
                id: string(d, "id")?,
                content: string(d, "content")?,
                message_id: string(d, "messageId")?,
            })
        }),
        "ad-done-iframe" => data.and_then(|d| {
            Some(ProtocolEvent::AdDone {
                id: string(d, "id")?,
                content: string(d, "content")?,
                message_id: string(d, "messageId")?,
            })
        }),
        "error-iframe" => Some(ProtocolEvent::Error {
            message: string(&root, "message").unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
        }),
        "open-component-iframe" => data.and_then(|d| {
            Some(ProtocolEvent::OpenModal {
                code: string(d, "code")?,
                component: string(d, "component")?,
                timeout_ms: d
                    .get("timeout")
                    .and_then(Value::as_f64)
                    .map(|t| t.max(0.0) as u64),
            })
        }),
        "init-component-iframe" => data.and_then(component_ref).map(ProtocolEvent::ModalInit),
        "error-component-iframe" => data.and_then(component_ref).map(ProtocolEvent::ModalError),
        "close-component-iframe" => data.and_then(component_ref).map(ProtocolEvent::ModalClose),
        "event-iframe" => data.and_then(callback).map(ProtocolEvent::Callback),
        _ => None,
    };

    decoded.unwrap_or_else(|| unknown(event_type, raw))
}

fn unknown(event_type: &str, raw: &str) -> ProtocolEvent {
    ProtocolEvent::Unknown {
        event_type: event_type.to_string(),
        raw: raw.to_string(),
    }
}

fn string(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(String::from)
}

/// Lenient payload field: missing or non-string values read as "".
fn field(object: &Map<String, Value>, key: &str) -> String {
    string(object, key).unwrap_or_default()
}

fn component_ref(data: &Map<String, Value>) -> Option<ComponentRef> {
    Some(ComponentRef {
        code: string(data, "code")?,
        component: string(data, "component")?,
    })
}

fn callback(data: &Map<String, Value>) -> Option<CallbackEvent> {
    let name = string(data, "name")?;
    let code = string(data, "code")?;
    let payload = data.get("payload").and_then(Value::as_object)?;

    let event = match name.as_str() {
        "ad.viewed" => CallbackEvent::Viewed {
            code,
            bid_id: field(payload, "id"),
            content: field(payload, "content"),
            message_id: field(payload, "messageId"),
            format: field(payload, "format"),
        },
        "ad.clicked" => CallbackEvent::Clicked {
            code,
            bid_id: field(payload, "id"),
            content: field(payload, "content"),
            message_id: field(payload, "messageId"),
            url: field(payload, "url"),
            format: field(payload, "format"),
            area: field(payload, "area"),
        },
        "ad.render-started" => CallbackEvent::RenderStarted {
            code,
            bid_id: field(payload, "id"),
        },
        "ad.render-completed" => CallbackEvent::RenderCompleted {
            code,
            bid_id: field(payload, "id"),
        },
        "ad.error" => CallbackEvent::Error {
            code,
            message: field(payload, "message"),
            err_code: field(payload, "errCode"),
        },
        "reward.granted" => CallbackEvent::RewardGranted {
            code,
            bid_id: field(payload, "id"),
        },
        "video.started" => CallbackEvent::VideoStarted {
            code,
            bid_id: field(payload, "id"),
        },
        "video.completed" => CallbackEvent::VideoCompleted {
            code,
            bid_id: field(payload, "id"),
        },
        _ => CallbackEvent::Generic {
            name,
            code,
            payload: payload.clone(),
        },
    };
    Some(event)
}

// ============================================================================
// Outbound
// ============================================================================

/// Host-to-surface message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "update-iframe")]
    UpdateIframe { code: String, data: UpdateIframeData },
    #[serde(rename = "update-dimensions-iframe")]
    UpdateDimensions { data: Dimensions },
}

/// Ad context pushed to a surface after it initialises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIframeData {
    pub messages: Vec<Message>,
    pub message_id: String,
    pub sdk: String,
    pub other_params: BTreeMap<String, String>,
}

/// Geometry of the host window and the ad container, in device-independent pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    pub window_width: f64,
    pub window_height: f64,
    pub container_width: f64,
    pub container_height: f64,
    pub container_x: f64,
    pub container_y: f64,
    pub keyboard_height: f64,
}

impl OutboundMessage {
    pub fn update_iframe(placement: &AdPlacement) -> Self {
        OutboundMessage::UpdateIframe {
            code: placement.bid.code.clone(),
            data: UpdateIframeData {
                messages: placement.messages.clone(),
                message_id: placement.message_id.clone(),
                sdk: placement.sdk.clone(),
                other_params: placement.other_params.clone(),
            },
        }
    }

    pub fn update_dimensions(dimensions: Dimensions) -> Self {
        OutboundMessage::UpdateDimensions { data: dimensions }
    }
}

/// Serialize an outbound message as single-line JSON.
pub fn encode(message: &OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_resize_decodes_fractional_height() {
        assert_eq!(
            decode(r#"{"type":"resize-iframe","data":{"height":123.5}}"#),
            ProtocolEvent::Resize { height: 123.5 }
        );
    }

    #[test]
    fn test_unrecognized_type_is_unknown() {
        let raw = r#"{"type":"bogus"}"#;
        assert_eq!(
            decode(raw),
            ProtocolEvent::Unknown {
                event_type: "bogus".into(),
                raw: raw.into()
            }
        );
    }

    #[test]
    fn test_garbage_is_parse_error() {
        for raw in ["not json", "[1,2]", "\"str\"", ""] {
            match decode(raw) {
                ProtocolEvent::Unknown { event_type, raw: kept } => {
                    assert_eq!(event_type, PARSE_ERROR_TYPE);
                    assert_eq!(kept, raw);
                }
                other => panic!("expected parse error for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_required_fields_downgrade_to_unknown() {
        let cases = [
            r#"{"type":"resize-iframe","data":{}}"#,
            r#"{"type":"resize-iframe","data":{"height":"tall"}}"#,
            r#"{"type":"click-iframe","data":{"id":"1","content":"c","messageId":"m"}}"#,
            r#"{"type":"view-iframe"}"#,
            r#"{"type":"init-component-iframe","data":{"code":"inlineAd"}}"#,
            r#"{"type":"event-iframe","data":{"name":"ad.viewed","code":"x","payload":"nope"}}"#,
        ];
        for raw in cases {
            assert!(
                matches!(decode(raw), ProtocolEvent::Unknown { .. }),
                "{raw} should be unknown"
            );
        }
    }

    #[test]
    fn test_click_and_simple_events() {
        assert_eq!(decode(r#"{"type":"init-iframe","data":null}"#), ProtocolEvent::Init);
        assert_eq!(decode(r#"{"type":"show-iframe"}"#), ProtocolEvent::Show);
        assert_eq!(decode(r#"{"type":"hide-iframe"}"#), ProtocolEvent::Hide);
        assert_eq!(
            decode(
                r#"{"type":"click-iframe","data":{"id":"b1","content":"c","messageId":"m1","url":"/click/1"}}"#
            ),
            ProtocolEvent::Click {
                id: "b1".into(),
                content: "c".into(),
                message_id: "m1".into(),
                url: "/click/1".into(),
            }
        );
    }

    #[test]
    fn test_error_message_defaults() {
        assert_eq!(
            decode(r#"{"type":"error-iframe","message":"boom"}"#),
            ProtocolEvent::Error {
                message: "boom".into()
            }
        );
        assert_eq!(
            decode(r#"{"type":"error-iframe"}"#),
            ProtocolEvent::Error {
                message: "Unknown error".into()
            }
        );
    }

    #[test]
    fn test_open_modal_timeout_accepts_any_json_number() {
        let timeout = |raw: &str| match decode(&format!(
            r#"{{"type":"open-component-iframe","data":{{"code":"inlineAd","component":"modal","timeout":{raw}}}}}"#
        )) {
            ProtocolEvent::OpenModal { timeout_ms, .. } => timeout_ms,
            other => panic!("expected open-component-iframe, got {other:?}"),
        };

        assert_eq!(timeout("100.0"), Some(100));
        assert_eq!(timeout("250.7"), Some(250));
        assert_eq!(timeout("-5"), Some(0));
        assert_eq!(timeout("\"soon\""), None);
    }

    #[test]
    fn test_open_modal_timeout_default() {
        use std::time::Duration;
        let fallback = Duration::from_millis(5_000);

        let without = decode(r#"{"type":"open-component-iframe","data":{"code":"inlineAd","component":"modal"}}"#);
        assert_eq!(
            without,
            ProtocolEvent::OpenModal {
                code: "inlineAd".into(),
                component: "modal".into(),
                timeout_ms: None,
            }
        );
        assert_eq!(without.modal_timeout(fallback), Some(fallback));

        let with = decode(
            r#"{"type":"open-component-iframe","data":{"code":"inlineAd","component":"modal","timeout":100}}"#,
        );
        assert_eq!(with.modal_timeout(fallback), Some(Duration::from_millis(100)));
        assert_eq!(ProtocolEvent::Show.modal_timeout(fallback), None);
    }

    #[test]
    fn test_callback_dispatch() {
        let clicked = decode(
            r#"{"type":"event-iframe","data":{"name":"ad.clicked","code":"inlineAd","payload":{"id":"b1","url":"https://x"}}}"#,
        );
        assert_eq!(
            clicked,
            ProtocolEvent::Callback(CallbackEvent::Clicked {
                code: "inlineAd".into(),
                bid_id: "b1".into(),
                content: String::new(),
                message_id: String::new(),
                url: "https://x".into(),
                format: String::new(),
                area: String::new(),
            })
        );

        let generic = decode(
            r#"{"type":"event-iframe","data":{"name":"custom.thing","code":"inlineAd","payload":{"n":1}}}"#,
        );
        match generic {
            ProtocolEvent::Callback(CallbackEvent::Generic { name, payload, .. }) => {
                assert_eq!(name, "custom.thing");
                assert_eq!(payload.get("n"), Some(&Value::from(1)));
            }
            other => panic!("expected generic callback, got {other:?}"),
        }

        let reward = decode(
            r#"{"type":"event-iframe","data":{"name":"reward.granted","code":"c","payload":{"id":"b9"}}}"#,
        );
        assert_eq!(
            reward,
            ProtocolEvent::Callback(CallbackEvent::RewardGranted {
                code: "c".into(),
                bid_id: "b9".into()
            })
        );
    }

    #[test]
    fn test_update_iframe_wire_shape() {
        let message = OutboundMessage::UpdateIframe {
            code: "inlineAd".into(),
            data: UpdateIframeData {
                messages: vec![Message::new("m1", Role::User, "hi", "2024-01-01T00:00:00Z")],
                message_id: "m1".into(),
                sdk: "sdk-rust".into(),
                other_params: BTreeMap::from([("theme".to_string(), "dark".to_string())]),
            },
        };

        let json: Value = serde_json::from_str(&encode(&message).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "update-iframe",
                "code": "inlineAd",
                "data": {
                    "messages": [{"id": "m1", "role": "user", "content": "hi", "createdAt": "2024-01-01T00:00:00Z"}],
                    "messageId": "m1",
                    "sdk": "sdk-rust",
                    "otherParams": {"theme": "dark"}
                }
            })
        );
    }

    #[test]
    fn test_update_dimensions_wire_shape() {
        let encoded = encode(&OutboundMessage::update_dimensions(Dimensions {
            window_width: 400.0,
            keyboard_height: 12.5,
            ..Dimensions::default()
        }))
        .unwrap();

        assert!(!encoded.contains('\n'));
        let json: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(json["type"], "update-dimensions-iframe");
        assert_eq!(json["data"]["windowWidth"], 400.0);
        assert_eq!(json["data"]["keyboardHeight"], 12.5);
        assert_eq!(json["data"]["containerX"], 0.0);
    }

    proptest! {
        #[test]
        fn decode_is_total_on_arbitrary_text(raw in ".{0,200}") {
            let _ = decode(&raw);
        }

        #[test]
        fn decode_is_total_on_envelopes(
            event_type in "[a-z.-]{0,24}",
            key in "[a-zA-Z]{0,10}",
            value in prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::from),
                any::<i64>().prop_map(Value::from),
                ".{0,16}".prop_map(Value::from),
            ],
        ) {
            let raw = serde_json::json!({"type": event_type, "data": {key: value}}).to_string();
            let event = decode(&raw);
            if let ProtocolEvent::Unknown { raw: kept, .. } = event {
                prop_assert_eq!(kept, raw);
            }
        }
    }
}
