//! Engine configuration
//!
//! Two layers:
//!
//! - [`AdsConfig`]: who is asking for ads (publisher, user, conversation) and
//!   what they accept (placement codes, theme, regulatory signals). Built with
//!   [`AdsConfig::builder`] or loaded from `ADS_*` environment variables.
//! - [`EngineSettings`]: tunables with sensible defaults (window size, timeouts,
//!   pool capacity, trigger policy).

use std::time::Duration;

use url::Url;

use crate::conversation::DEFAULT_MESSAGE_WINDOW;
use crate::domain::{Character, Regulatory};
use crate::error::ConfigError;
use crate::preload::TriggerPolicy;

pub const DEFAULT_AD_SERVER_URL: &str = "https://server.megabrain.co";
pub const DEFAULT_PRELOAD_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MODAL_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_SURFACE_POOL_SIZE: usize = 10;
pub const DEFAULT_DIMENSION_INTERVAL: Duration = Duration::from_millis(200);

/// Publisher-facing configuration of one ad session.
#[derive(Debug, Clone, PartialEq)]
pub struct AdsConfig {
    pub publisher_token: String,
    pub user_id: String,
    pub conversation_id: String,
    /// Base URL without trailing slash
    pub ad_server_url: String,
    pub enabled_placement_codes: Vec<String>,
    pub character: Option<Character>,
    pub variant_id: Option<String>,
    pub advertising_id: Option<String>,
    pub vendor_id: Option<String>,
    pub regulatory: Option<Regulatory>,
    /// Start with serving disabled
    pub disabled: bool,
    pub theme: Option<String>,
}

impl AdsConfig {
    pub fn builder(
        publisher_token: impl Into<String>,
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> AdsConfigBuilder {
        AdsConfigBuilder {
            publisher_token: publisher_token.into(),
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            enabled_placement_codes: Vec::new(),
            character: None,
            variant_id: None,
            advertising_id: None,
            vendor_id: None,
            regulatory: None,
            disabled: false,
            ad_server_url: DEFAULT_AD_SERVER_URL.to_string(),
            theme: None,
        }
    }

    /// Load from `ADS_*` environment variables.
    ///
    /// Required: `ADS_PUBLISHER_TOKEN`, `ADS_USER_ID`, `ADS_CONVERSATION_ID`.
    /// Optional: `ADS_SERVER_URL`, `ADS_PLACEMENT_CODES` (comma separated),
    /// `ADS_THEME`, `ADS_VARIANT_ID`, `ADS_DISABLED`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name).ok_or_else(|| ConfigError::MissingVar {
                name: name.to_string(),
            })
        };

        let mut builder = AdsConfig::builder(
            required("ADS_PUBLISHER_TOKEN")?,
            required("ADS_USER_ID")?,
            required("ADS_CONVERSATION_ID")?,
        );

        if let Some(url) = lookup("ADS_SERVER_URL") {
            builder = builder.ad_server_url(url);
        }
        if let Some(codes) = lookup("ADS_PLACEMENT_CODES") {
            builder = builder.enabled_placement_codes(
                codes
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(String::from)
                    .collect(),
            );
        }
        if let Some(theme) = lookup("ADS_THEME") {
            builder = builder.theme(theme);
        }
        if let Some(variant) = lookup("ADS_VARIANT_ID") {
            builder = builder.variant_id(variant);
        }
        if let Some(disabled) = lookup("ADS_DISABLED") {
            builder = builder.disabled(disabled != "false" && disabled != "0");
        }

        builder.build()
    }

    /// Same configuration pointed at another ad server.
    pub fn with_ad_server_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.ad_server_url = normalize_server_url(url)?;
        Ok(self)
    }

    /// Pass-through parameters forwarded to ad content.
    pub fn other_params(&self) -> std::collections::BTreeMap<String, String> {
        let mut params = std::collections::BTreeMap::new();
        if let Some(theme) = &self.theme {
            params.insert("theme".to_string(), theme.clone());
        }
        params
    }
}

/// Builder for [`AdsConfig`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct AdsConfigBuilder {
    publisher_token: String,
    user_id: String,
    conversation_id: String,
    enabled_placement_codes: Vec<String>,
    character: Option<Character>,
    variant_id: Option<String>,
    advertising_id: Option<String>,
    vendor_id: Option<String>,
    regulatory: Option<Regulatory>,
    disabled: bool,
    ad_server_url: String,
    theme: Option<String>,
}

impl AdsConfigBuilder {
    pub fn enabled_placement_codes(mut self, codes: Vec<String>) -> Self {
        self.enabled_placement_codes = codes;
        self
    }

    pub fn character(mut self, character: Character) -> Self {
        self.character = Some(character);
        self
    }

    pub fn variant_id(mut self, id: impl Into<String>) -> Self {
        self.variant_id = Some(id.into());
        self
    }

    pub fn advertising_id(mut self, id: impl Into<String>) -> Self {
        self.advertising_id = Some(id.into());
        self
    }

    pub fn vendor_id(mut self, id: impl Into<String>) -> Self {
        self.vendor_id = Some(id.into());
        self
    }

    pub fn regulatory(mut self, regulatory: Regulatory) -> Self {
        self.regulatory = Some(regulatory);
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn ad_server_url(mut self, url: impl Into<String>) -> Self {
        self.ad_server_url = url.into();
        self
    }

    pub fn theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    pub fn build(self) -> Result<AdsConfig, ConfigError> {
        if self.publisher_token.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "publisher_token".into(),
                reason: "must not be empty".into(),
            });
        }

        let ad_server_url = normalize_server_url(&self.ad_server_url)?;

        Ok(AdsConfig {
            publisher_token: self.publisher_token,
            user_id: self.user_id,
            conversation_id: self.conversation_id,
            ad_server_url,
            enabled_placement_codes: self.enabled_placement_codes,
            character: self.character,
            variant_id: self.variant_id,
            advertising_id: self.advertising_id,
            vendor_id: self.vendor_id,
            regulatory: self.regulatory,
            disabled: self.disabled,
            theme: self.theme,
        })
    }
}

fn normalize_server_url(raw: &str) -> Result<String, ConfigError> {
    let parsed = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    Ok(raw.trim_end_matches('/').to_string())
}

/// Engine tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Messages kept in the window and sent to the server
    pub message_window: usize,
    pub trigger_policy: TriggerPolicy,
    /// Quiet period before a triggered preload is issued; zero disables debouncing
    pub debounce: Duration,
    /// Initial preload timeout; the server may override it
    pub preload_timeout: Duration,
    /// Fallback when `open-component-iframe` carries no timeout
    pub modal_timeout: Duration,
    pub surface_pool_capacity: usize,
    pub dimension_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            message_window: DEFAULT_MESSAGE_WINDOW,
            trigger_policy: TriggerPolicy::NewUserMessage,
            debounce: Duration::ZERO,
            preload_timeout: DEFAULT_PRELOAD_TIMEOUT,
            modal_timeout: DEFAULT_MODAL_TIMEOUT,
            surface_pool_capacity: DEFAULT_SURFACE_POOL_SIZE,
            dimension_interval: DEFAULT_DIMENSION_INTERVAL,
        }
    }
}

impl EngineSettings {
    /// Load from environment variables, falling back to defaults for anything
    /// missing or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |name: &str, fallback: Duration| {
            lookup(name)
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };

        Self {
            message_window: lookup("ADS_MESSAGE_WINDOW")
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.message_window),
            trigger_policy: lookup("ADS_TRIGGER_POLICY")
                .and_then(|s| TriggerPolicy::parse(&s))
                .unwrap_or(defaults.trigger_policy),
            debounce: millis("ADS_DEBOUNCE_MS", defaults.debounce),
            preload_timeout: millis("ADS_PRELOAD_TIMEOUT_MS", defaults.preload_timeout),
            modal_timeout: millis("ADS_MODAL_TIMEOUT_MS", defaults.modal_timeout),
            surface_pool_capacity: lookup("ADS_SURFACE_POOL_SIZE")
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.surface_pool_capacity),
            dimension_interval: millis("ADS_DIMENSION_INTERVAL_MS", defaults.dimension_interval),
        }
    }
}
