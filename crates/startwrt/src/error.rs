//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use startwrt_config::ConfigError;
use startwrt_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to router at {url}")]
    #[diagnostic(
        code(startwrt::connection_failed),
        help(
            "Check that the router is reachable and uhttpd serves ubus.\n\
             URL: {url}\n\
             Try: startwrt show --insecure"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed")]
    #[diagnostic(
        code(startwrt::auth_failed),
        help(
            "Verify the username and password for this router.\n\
             Run: startwrt config set-password --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(startwrt::no_credentials),
        help(
            "Configure credentials with: startwrt config init\n\
             Or set the STARTWRT_PASSWORD environment variable."
        )
    )]
    NoCredentials { profile: String },

    #[error("Access denied: {message}")]
    #[diagnostic(
        code(startwrt::permission_denied),
        help("The rpcd user lacks an ACL grant for this operation (see /usr/share/rpcd/acl.d).")
    )]
    PermissionDenied { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(startwrt::not_found),
        help("Run: startwrt {list_command} to see what exists")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(code(startwrt::conflict))]
    Conflict {
        resource_type: String,
        identifier: String,
    },

    // ── Router ───────────────────────────────────────────────────────
    #[error("Router error ({code}): {message}")]
    #[diagnostic(code(startwrt::router_error))]
    RouterError { code: String, message: String },

    #[error("{message}")]
    #[diagnostic(
        code(startwrt::not_confirmed),
        help("The router restores the previous configuration. Check connectivity and retry.")
    )]
    NotConfirmed { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(startwrt::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(startwrt::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: startwrt config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(startwrt::no_config),
        help(
            "Create one with: startwrt config init\n\
             Or pass --router. Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(startwrt::config))]
    Config(ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(startwrt::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(startwrt::timeout),
        help("Increase timeout with --timeout or check router responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::PermissionDenied { .. } => exit_code::PERMISSION,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::NOT_FOUND
            }
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } | Self::NotConfirmed { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },

            CoreError::Network { message } => CliError::ConnectionFailed {
                url: "(router)".into(),
                source: message.into(),
            },

            CoreError::AuthenticationFailed { message: _ } => CliError::AuthFailed {
                profile: "current".into(),
            },

            CoreError::AccessDenied { message } => CliError::PermissionDenied { message },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::ConfirmTimeout { .. } => CliError::NotConfirmed {
                message: err.to_string(),
            },

            CoreError::ConfigNotLoaded { config } => CliError::NotFound {
                resource_type: "configuration".into(),
                identifier: config,
                list_command: "show".into(),
            },

            CoreError::SectionNotFound { config, section } => CliError::NotFound {
                resource_type: "section".into(),
                identifier: format!("{config}.{section}"),
                list_command: format!("show {config}"),
            },

            CoreError::InvalidChange { message } => CliError::Validation {
                field: "change".into(),
                reason: message,
            },

            CoreError::Rejected { .. } | CoreError::SaveFailed { .. } => {
                let code = err
                    .status()
                    .map_or_else(|| "rejected".into(), |s| s.code().to_string());
                CliError::RouterError {
                    code,
                    message: err.to_string(),
                }
            }

            CoreError::Api { message, code } => CliError::RouterError {
                code: code.map(|c| c.to_string()).unwrap_or_default(),
                message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "router".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::RouterError {
                code: "internal".into(),
                message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}
