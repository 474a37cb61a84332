use thiserror::Error;

use crate::status::UbusStatus;

/// JSON-RPC error code rpcd returns when the session lacks access to the
/// requested object/method, or when the session itself has expired.
pub const ACCESS_DENIED_CODE: i64 = -32002;

/// Top-level error type for the `startwrt-api` crate.
///
/// Covers every failure mode of the ubus JSON-RPC surface: HTTP transport,
/// session handling, JSON-RPC envelope errors, and non-zero ubus status
/// codes. `startwrt-core` maps these into overlay-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login failed (wrong credentials, unknown user, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// rpcd rejected the call for the current session (code -32002).
    #[error("Access denied: {message}")]
    AccessDenied { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status from the ubus endpoint.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── JSON-RPC ────────────────────────────────────────────────────
    /// Error object from the JSON-RPC envelope.
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc { code: i64, message: String },

    /// The ubus call completed with a non-zero status code.
    #[error("ubus call {object}.{method} failed: {status}")]
    Ubus {
        object: String,
        method: String,
        status: UbusStatus,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates the session is no longer
    /// valid and logging in again might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::AccessDenied { .. }
        )
    }

    /// Returns `true` if the error came from the network rather than the
    /// remote store rejecting the request.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Http { .. } | Self::Timeout { .. } | Self::Tls(_)
        )
    }

    /// The ubus status code, if the remote call got far enough to return one.
    pub fn status(&self) -> Option<UbusStatus> {
        match self {
            Self::Ubus { status, .. } => Some(*status),
            Self::AccessDenied { .. } => Some(UbusStatus::PermissionDenied),
            _ => None,
        }
    }
}
