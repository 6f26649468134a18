//! Repository seam between the scheduler and the ad server
//!
//! The scheduler only sees [`AdsRepository`]; production wiring uses
//! [`HttpAdsRepository`](super::HttpAdsRepository), tests use in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AdsConfig;
use crate::domain::{AppInfo, Character, DeviceInfo, Message, PreloadOutcome, Regulatory, SdkInfo};
use crate::error::ApiError;

/// Ad server access used by the preload scheduler.
#[async_trait]
pub trait AdsRepository: Send + Sync {
    /// Exchange conversation context for bids. `timeout` is a hint for the
    /// transport; the scheduler enforces it independently.
    async fn preload(
        &self,
        request: &PreloadRequest,
        timeout: Duration,
    ) -> Result<PreloadOutcome, ApiError>;

    /// Best-effort failure report. Callers ignore the result.
    async fn report_error(&self, report: &ErrorReport) -> Result<(), ApiError>;
}

/// Source of the device snapshot attached to each preload.
#[async_trait]
pub trait DeviceInfoProvider: Send + Sync {
    async fn device_info(&self) -> DeviceInfo;
}

/// Provider returning a fixed snapshot, for hosts that collect it up front.
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceInfo(pub DeviceInfo);

#[async_trait]
impl DeviceInfoProvider for StaticDeviceInfo {
    async fn device_info(&self) -> DeviceInfo {
        self.0.clone()
    }
}

/// Body of `POST /preload`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreloadRequest {
    pub publisher_token: String,
    pub conversation_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enabled_placement_codes: Vec<String>,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertising_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<Character>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regulatory: Option<Regulatory>,
    pub sdk: SdkInfo,
    pub app: AppInfo,
    pub device: DeviceInfo,
}

impl PreloadRequest {
    pub fn build(
        config: &AdsConfig,
        session_id: Option<String>,
        messages: Vec<Message>,
        device: DeviceInfo,
    ) -> Self {
        Self {
            publisher_token: config.publisher_token.clone(),
            conversation_id: config.conversation_id.clone(),
            user_id: config.user_id.clone(),
            enabled_placement_codes: config.enabled_placement_codes.clone(),
            messages,
            session_id,
            advertising_id: config.advertising_id.clone(),
            vendor_id: config.vendor_id.clone(),
            variant_id: config.variant_id.clone(),
            character: config.character.clone(),
            regulatory: config.regulatory.clone(),
            sdk: device.sdk.clone(),
            app: device.app.clone(),
            device,
        }
    }
}

/// Body of `POST /error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<ErrorContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorContext {
    pub stacktrace: Option<String>,
}

impl ErrorReport {
    pub fn preload_failed(error: &ApiError) -> Self {
        Self {
            error: "Preload failed".to_string(),
            additional_data: Some(ErrorContext {
                stacktrace: Some(format!("{error:?}")),
            }),
        }
    }
}
