//! Error types for the ad engine
//!
//! Three families, each kept at its own boundary:
//!
//! - [`ApiError`]: what the ad server or the transport reported for a preload
//!   or error-report call. Classified into transient vs permanent.
//! - [`AdsError`]: the public, cloneable error carried by
//!   [`AdResult::Error`](crate::domain::AdResult). Never thrown across the facade.
//! - [`ConfigError`]: invalid builder input or environment.
//!
//! Surface protocol decoding has no error type: malformed payloads decode to
//! `ProtocolEvent::Unknown`.

use thiserror::Error;

/// Failure of a call to the ad server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {reason}")]
    Connection { reason: String },

    #[error("Malformed response body: {reason}")]
    Serialization { reason: String },

    #[error("Unexpected HTTP status {status}")]
    Http { status: u16 },

    #[error("Server reported temporary error '{code}'")]
    Temporary { code: String },

    #[error("Server reported permanent error '{code}'")]
    Permanent { code: String },

    #[error("Unexpected error: {reason}")]
    Unexpected { reason: String },
}

impl ApiError {
    /// Permanent errors disable the engine for the rest of its lifetime.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ApiError::Permanent { .. })
    }

    /// Whether the failure happened below the application protocol, i.e. the
    /// server never produced a well-formed answer. These are reported on the
    /// error side channel.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout
                | ApiError::Connection { .. }
                | ApiError::Serialization { .. }
                | ApiError::Http { .. }
                | ApiError::Unexpected { .. }
        )
    }
}

/// Public error surfaced in the ad result stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdsError {
    /// An ad was requested, but none is available to be served.
    #[error("No ad was available")]
    AdUnavailable,

    /// The last preload failed to reach the ad server or got an error back.
    #[error("A network error occurred: {reason}")]
    Network { reason: String },
}

impl From<ApiError> for AdsError {
    fn from(error: ApiError) -> Self {
        AdsError::Network {
            reason: error.to_string(),
        }
    }
}

/// Configuration errors from the builder or environment loading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Required environment variable {name} is not set")]
    MissingVar { name: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid ad server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}
