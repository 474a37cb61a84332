//! Clap derive structures for the `startwrt` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// startwrt -- uci-style CLI for OpenWrt routers over ubus
#[derive(Debug, Parser)]
#[command(
    name = "startwrt",
    version,
    about = "Stage, review, and apply OpenWrt UCI changes from the command line",
    long_about = "Edits OpenWrt UCI configuration remotely through rpcd's ubus JSON-RPC API.\n\n\
        Changes are staged on the router under your rpcd session and only take\n\
        effect after `startwrt apply`, which rolls back unless confirmed.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Router profile to use
    #[arg(long, short = 'p', env = "STARTWRT_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Router URL (overrides profile)
    #[arg(long, short = 'r', env = "STARTWRT_ROUTER", global = true)]
    pub router: Option<String>,

    /// rpcd login user (overrides profile)
    #[arg(long, short = 'u', env = "STARTWRT_USERNAME", global = true)]
    pub username: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "STARTWRT_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "STARTWRT_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "STARTWRT_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain `uci show` style lines (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List configurations, or show a configuration or section
    Show {
        /// `config` or `config.section`; omit to list configurations
        path: Option<String>,
    },

    /// Print a section type or option value
    Get {
        /// `config.section` or `config.section.option`
        path: String,
    },

    /// Stage option values (`config.section.option=value`) or create a
    /// named section (`config.section=type`)
    Set {
        /// One or more assignments, staged together
        #[arg(required = true)]
        assignments: Vec<String>,
    },

    /// Stage a new section and print its assigned name
    Add {
        /// Configuration name
        config: String,

        /// Section type
        section_type: String,

        /// Name for the section (anonymous when omitted)
        #[arg(long, short = 'n')]
        name: Option<String>,

        /// Initial option values (`option=value`, repeatable)
        #[arg(long = "set", short = 's', value_name = "OPTION=VALUE")]
        values: Vec<String>,
    },

    /// Append a value to a list option
    AddList {
        /// `config.section.option=value`
        assignment: String,
    },

    /// Remove a value from a list option
    DelList {
        /// `config.section.option=value`
        assignment: String,
    },

    /// Stage removal of a section or option
    #[command(alias = "del")]
    Delete {
        /// `config.section` or `config.section.option`
        path: String,
    },

    /// Rename a section or option (`config.section[.option]=name`)
    Rename {
        assignment: String,
    },

    /// Move a section before or after another one, or to the end
    Move {
        /// `config.section`
        path: String,

        /// Place before this section
        #[arg(long, conflicts_with = "after")]
        before: Option<String>,

        /// Place after this section
        #[arg(long)]
        after: Option<String>,
    },

    /// Show changes staged on the router
    Changes {
        /// Limit to one configuration
        config: Option<String>,
    },

    /// Discard staged changes of a configuration
    Revert {
        config: String,
    },

    /// Commit staged changes, rolling back unless confirmed
    Apply(ApplyArgs),

    /// Keep a pending apply
    Confirm,

    /// Undo a pending apply right away
    Rollback,

    /// Log in and cache the rpcd session
    Login,

    /// Destroy the cached rpcd session and everything staged in it
    Logout,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  APPLY
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Rollback window in seconds (profile default when omitted)
    #[arg(long, short = 't')]
    pub timeout: Option<u64>,

    /// Apply without confirming; run `startwrt confirm` before the window
    /// closes or the router rolls back
    #[arg(long)]
    pub no_confirm: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,

    /// Set a value on the active profile
    Set {
        /// Profile key (router, ubus_path, username, insecure, timeout,
        /// apply_timeout, ca_cert)
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a password in the system keyring
    SetPassword {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
