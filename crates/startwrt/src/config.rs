//! CLI configuration: thin wrapper around `startwrt_config` shared types.
//!
//! Re-exports the shared types and adds resolution that respects
//! `GlobalOpts` flag overrides (--router, --username, --insecure, ...).

use startwrt_core::RouterConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use startwrt_config::{
    Config, Defaults, Profile, SessionCache, config_path, load_config_or_default, save_config,
    store_password,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Names of all profiles, for error help text.
pub fn available_profiles(config: &Config) -> String {
    let mut names: Vec<_> = config.profiles.keys().cloned().collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort();
    names.join(", ")
}

/// Build a `RouterConfig` from the config file, active profile, and flags.
///
/// Without a matching profile, `--router` alone is enough; the password then
/// has to come from `STARTWRT_PASSWORD` or the keyring.
pub fn resolve_router_config(global: &GlobalOpts) -> Result<(String, RouterConfig), CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match (cfg.profiles.get(&profile_name), &global.router) {
        (Some(profile), _) => profile.clone(),
        (None, Some(router)) => Profile::new(router.clone()),
        (None, None) if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(&cfg),
            });
        }
        (None, None) => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    // Flag > env > profile
    if let Some(ref router) = global.router {
        profile.router.clone_from(router);
    }
    if let Some(ref username) = global.username {
        profile.username.clone_from(username);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    let credentials = startwrt_config::resolve_credentials(&profile, &profile_name)?;
    let config = startwrt_config::router_config(&profile, &cfg.defaults, credentials)?;
    Ok((profile_name, config))
}
