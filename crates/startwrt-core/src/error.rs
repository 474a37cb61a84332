// ── Core error types ──
//
// Errors surfaced by the overlay and the router facade. Transport-level
// failures from `startwrt-api` are folded into a handful of variants so
// consumers can tell "the router is unreachable" from "the router said no"
// without matching on HTTP details.

use startwrt_api::UbusStatus;
use thiserror::Error;

use crate::model::InvalidRecord;

#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to router at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Access denied: {message}")]
    AccessDenied { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Router request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Overlay errors ───────────────────────────────────────────────
    #[error("Configuration not loaded: {config}")]
    ConfigNotLoaded { config: String },

    #[error("Section not found: {config}.{section}")]
    SectionNotFound { config: String, section: String },

    #[error("Invalid change: {message}")]
    InvalidChange { message: String },

    // ── Remote rejections ────────────────────────────────────────────
    #[error("{operation} rejected by router: {status}")]
    Rejected {
        operation: String,
        status: UbusStatus,
    },

    #[error("Saving '{config}' failed for {failed} of {total} calls: {status}")]
    SaveFailed {
        config: String,
        failed: usize,
        total: usize,
        status: UbusStatus,
    },

    #[error("Apply was not confirmed within {timeout_secs}s; the router rolls it back")]
    ConfirmTimeout { timeout_secs: u64 },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// JSON-RPC error code, when the envelope carried one.
        code: Option<i64>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The ubus status behind a rejection, if any.
    pub fn status(&self) -> Option<UbusStatus> {
        match self {
            Self::Rejected { status, .. } | Self::SaveFailed { status, .. } => Some(*status),
            Self::AccessDenied { .. } => Some(UbusStatus::PermissionDenied),
            _ => None,
        }
    }

    /// True when the router could not be reached at all.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::ConnectionFailed { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<startwrt_api::Error> for CoreError {
    fn from(err: startwrt_api::Error) -> Self {
        match err {
            startwrt_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            startwrt_api::Error::AccessDenied { message } => CoreError::AccessDenied { message },
            startwrt_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Network {
                        message: e.to_string(),
                    }
                }
            }
            startwrt_api::Error::Http { status, body } => CoreError::Network {
                message: format!("HTTP {status}: {body}"),
            },
            startwrt_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            startwrt_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            startwrt_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            startwrt_api::Error::JsonRpc { code, message } => CoreError::Api {
                message,
                code: Some(code),
            },
            startwrt_api::Error::Ubus {
                object,
                method,
                status,
            } => CoreError::Rejected {
                operation: format!("{object}.{method}"),
                status,
            },
            startwrt_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

impl From<InvalidRecord> for CoreError {
    fn from(err: InvalidRecord) -> Self {
        CoreError::InvalidChange {
            message: err.to_string(),
        }
    }
}
