//! Shared configuration for the startwrt CLI.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! the rpcd session cache, and translation to
//! `startwrt_core::RouterConfig`. The CLI layers its flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use startwrt_core::{Credentials, DEFAULT_APPLY_TIMEOUT, RouterConfig, TlsVerification};

const KEYRING_SERVICE: &str = "startwrt";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named router profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Rollback window for `apply`, in seconds.
    #[serde(default = "default_apply_timeout")]
    pub apply_timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
            apply_timeout: default_apply_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_apply_timeout() -> u64 {
    DEFAULT_APPLY_TIMEOUT
}

/// A named router profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Router base URL (e.g., "https://192.168.1.1").
    pub router: String,

    /// Path of the ubus endpoint below the router URL.
    #[serde(default = "default_ubus_path")]
    pub ubus_path: String,

    /// rpcd login user.
    #[serde(default = "default_username")]
    pub username: String,

    /// Password (plaintext, prefer keyring).
    pub password: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Override apply rollback window.
    pub apply_timeout: Option<u64>,
}

impl Profile {
    pub fn new(router: impl Into<String>) -> Self {
        Self {
            router: router.into(),
            ubus_path: default_ubus_path(),
            username: default_username(),
            password: None,
            ca_cert: None,
            insecure: None,
            timeout: None,
            apply_timeout: None,
        }
    }
}

fn default_ubus_path() -> String {
    "/ubus".into()
}
fn default_username() -> String {
    "root".into()
}

// ── Config file path ────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "startwrt", "startwrt")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("startwrt");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the default file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, then `STARTWRT_` environment variables
/// (`STARTWRT_DEFAULTS__TIMEOUT=60` sets `defaults.timeout`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("STARTWRT_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn password_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
}

/// Resolve the login password: `STARTWRT_PASSWORD`, then the system
/// keyring, then plaintext in the profile.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Env var
    if let Ok(pw) = std::env::var("STARTWRT_PASSWORD") {
        return Ok(SecretString::from(pw));
    }

    // 2. Keyring
    if let Ok(entry) = password_entry(profile_name) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    password_entry(profile_name)?.set_password(password)?;
    Ok(())
}

/// Resolve a profile's credentials, without CLI flags.
pub fn resolve_credentials(profile: &Profile, profile_name: &str) -> Result<Credentials, ConfigError> {
    Ok(Credentials {
        username: profile.username.clone(),
        password: resolve_password(profile, profile_name)?,
    })
}

/// Translate a profile into a `RouterConfig` with the given credentials.
pub fn router_config(
    profile: &Profile,
    defaults: &Defaults,
    credentials: Credentials,
) -> Result<RouterConfig, ConfigError> {
    let url: url::Url = profile.router.parse().map_err(|_| ConfigError::Validation {
        field: "router".into(),
        reason: format!("invalid URL: {}", profile.router),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: "router".into(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::DangerAcceptInvalid // OpenWrt ships a self-signed certificate
    };

    let mut config = RouterConfig::new(url, credentials);
    config.ubus_path.clone_from(&profile.ubus_path);
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.apply_timeout = profile.apply_timeout.unwrap_or(defaults.apply_timeout);
    Ok(config)
}

// ── Session cache ───────────────────────────────────────────────────

/// rpcd session ids kept between CLI invocations, one file per profile.
///
/// Staged (saved but unapplied) changes live in the router's session, so a
/// later `apply` must run under the same session id.
#[derive(Debug, Clone)]
pub struct SessionCache {
    dir: PathBuf,
}

impl SessionCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The platform cache directory, `None` when it cannot be determined.
    pub fn default_location() -> Option<Self> {
        project_dirs().map(|dirs| Self::new(dirs.cache_dir().join("sessions")))
    }

    fn path(&self, profile_name: &str) -> PathBuf {
        self.dir.join(profile_name)
    }

    pub fn load(&self, profile_name: &str) -> Option<String> {
        let raw = std::fs::read_to_string(self.path(profile_name)).ok()?;
        let session = raw.trim();
        let valid = session.len() == 32 && session.bytes().all(|b| b.is_ascii_hexdigit());
        if !valid {
            debug!(profile = profile_name, "ignoring malformed cached session");
            return None;
        }
        Some(session.to_owned())
    }

    pub fn store(&self, profile_name: &str, session: &str) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(profile_name), session)?;
        Ok(())
    }

    pub fn clear(&self, profile_name: &str) -> Result<(), ConfigError> {
        match std::fs::remove_file(self.path(profile_name)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
