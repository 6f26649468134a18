//! Request context sent alongside the conversation: device, app, sdk,
//! character persona and regulatory signals.
//!
//! Collecting these values is the host's job; the engine only forwards them.

use serde::{Deserialize, Serialize};

/// Name reported to the ad server and to rendered ad content.
pub const SDK_NAME: &str = "sdk-rust";

/// SDK identification block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SdkInfo {
    pub name: String,
    pub version: String,
    pub platform: String,
}

impl Default for SdkInfo {
    fn default() -> Self {
        Self {
            name: SDK_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
        }
    }
}

/// Host application block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub bundle_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_url: Option<String>,
    pub first_install_time: i64,
    pub last_update_time: i64,
    pub start_time: i64,
}

/// Device and environment snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub os: String,
    pub system_version: String,
    pub model: String,
    pub brand: String,
    pub device_type: String,
    pub locale: String,
    pub timezone: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub dpr: f32,
    pub dark_mode: bool,
    pub sound_on: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
    #[serde(skip)]
    pub app: AppInfo,
    #[serde(skip)]
    pub sdk: SdkInfo,
}

/// Persona the assistant is playing, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_nsfw: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Privacy regulation signals (IAB conventions: `0` = no, `1` = yes, absent = unknown).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Regulatory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gdpr: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gdpr_consent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coppa: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpp_sid: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub us_privacy: Option<String>,
}
