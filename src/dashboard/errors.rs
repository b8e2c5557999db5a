//! Error taxonomy for dashboard state and time-range derivation.
//!
//! Lookup failures (unknown grain, range name, interval, timezone, context
//! column) are fatal to the call: they mean the client tables and the
//! configuration disagree. Everything else in the store is repaired silently
//! or treated as a no-op and never reaches this type.
//!
//! Errors carry two renderings:
//! - [`DashboardError::user_message`] is the generic notice shown in the UI
//! - [`DashboardError::log_message`] keeps the internal detail for logs

use thiserror::Error;

/// Errors raised by time-range derivation and dashboard reducers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DashboardError {
    #[error("unknown time grain: {0}")]
    UnknownTimeGrain(String),

    #[error("unknown time range: {0}")]
    UnknownTimeRange(String),

    #[error("unknown interval: {0}")]
    UnknownInterval(String),

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("invalid context column type: {0}")]
    UnknownContextColumn(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid ISO-8601 duration: {0}")]
    InvalidDuration(String),

    #[error("no time grains generated for time range {0}")]
    NoTimeGrains(String),

    #[error("observed range ends before it starts")]
    InvalidObservedRange,
}

impl DashboardError {
    /// Message suitable for display. Internal detail is never exposed.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidTimestamp(_) | Self::InvalidObservedRange => {
                "The selected time range could not be read."
            }
            _ => "The dashboard is in an unexpected state. Try reloading it.",
        }
    }

    /// Message suitable for logs, including the offending value.
    pub fn log_message(&self) -> String {
        match self {
            Self::UnknownTimeGrain(v) => format!("Lookup failed: time grain {v:?}"),
            Self::UnknownTimeRange(v) => format!("Lookup failed: time range {v:?}"),
            Self::UnknownInterval(v) => format!("Lookup failed: interval {v:?}"),
            Self::UnknownTimezone(v) => format!("Lookup failed: timezone {v:?}"),
            Self::UnknownContextColumn(v) => format!("Lookup failed: context column {v:?}"),
            Self::InvalidTimestamp(v) => format!("Unparseable timestamp {v:?}"),
            Self::InvalidDuration(v) => format!("Unparseable duration {v:?}"),
            Self::NoTimeGrains(v) => format!("Grain table produced nothing for {v}"),
            Self::InvalidObservedRange => "Observed range end precedes start".to_string(),
        }
    }

    /// Whether this error signals a client/configuration version mismatch.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            Self::UnknownTimeGrain(_)
                | Self::UnknownTimeRange(_)
                | Self::UnknownInterval(_)
                | Self::UnknownTimezone(_)
                | Self::UnknownContextColumn(_)
        )
    }
}

/// Convenience alias.
pub type DashboardResult<T> = std::result::Result<T, DashboardError>;

/// Errors raised while encoding or decoding the URL state token.
#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("state token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("state token body could not be decoded: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("state could not be encoded: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("state token version {0} is not supported")]
    UnsupportedVersion(u8),
}
