// ── Runtime connection configuration ──
//
// These types describe *how* to reach a router's ubus endpoint. They carry
// credentials and connection tuning, but never touch disk. The CLI builds a
// `RouterConfig` from its profile and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use startwrt_api::{TlsMode, TransportConfig};
use url::Url;

/// Login credentials for rpcd's `session` object.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification. OpenWrt ships a self-signed certificate.
    #[default]
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

/// Configuration for talking to a single router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Router base URL (e.g., `https://192.168.1.1`).
    pub url: Url,
    /// Path of the ubus JSON-RPC endpoint below `url`.
    pub ubus_path: String,
    pub credentials: Credentials,
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Rollback window for `apply`, in seconds.
    pub apply_timeout: u64,
}

impl RouterConfig {
    pub fn new(url: Url, credentials: Credentials) -> Self {
        Self {
            url,
            ubus_path: "/ubus".into(),
            credentials,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            apply_timeout: 10,
        }
    }

    /// Full URL of the ubus endpoint.
    pub fn endpoint(&self) -> Result<Url, url::ParseError> {
        self.url.join(&self.ubus_path)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from(&self.tls),
            timeout: self.timeout,
        }
    }
}
