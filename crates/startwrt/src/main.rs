mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use startwrt_core::{Router, RouterConfig};

use crate::cli::{Cli, Command};
use crate::config::SessionCache;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a router connection
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "startwrt", &mut std::io::stdout());
            Ok(())
        }

        Command::Logout => {
            let (profile_name, router_config) = config::resolve_router_config(&cli.global)?;
            let cache = SessionCache::default_location();
            let Some(session) = cache.as_ref().and_then(|c| c.load(&profile_name)) else {
                output::print_status("No cached session", cli.global.quiet);
                return Ok(());
            };
            // An expired session has nothing left to destroy
            Router::resume(router_config, &session).await?.disconnect().await;
            if let Some(cache) = cache {
                cache.clear(&profile_name)?;
            }
            output::print_status("Logged out", cli.global.quiet);
            Ok(())
        }

        // All other commands require a router session
        cmd => {
            let (profile_name, router_config) = config::resolve_router_config(&cli.global)?;
            let cache = SessionCache::default_location();
            let router = open_session(router_config, cache.as_ref(), &profile_name).await?;

            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &router, &cli.global).await;

            // Staged changes live in the session, so keep it for the next run
            let session = router.detach();
            if let Some(cache) = cache {
                if let Err(e) = cache.store(&profile_name, &session) {
                    tracing::warn!(error = %e, "failed to cache session");
                }
            }
            result
        }
    }
}

/// Resume the cached session for `profile_name`, or log in fresh.
async fn open_session(
    router_config: RouterConfig,
    cache: Option<&SessionCache>,
    profile_name: &str,
) -> Result<Router, CliError> {
    let cached = cache.and_then(|c| c.load(profile_name));
    let router = match cached {
        Some(session) => Router::resume(router_config, &session).await,
        None => Router::connect(router_config).await,
    };
    router.map_err(|e| with_profile(e.into(), profile_name))
}

/// Fill in the profile name for auth failures, which core cannot know.
fn with_profile(err: CliError, profile_name: &str) -> CliError {
    match err {
        CliError::AuthFailed { .. } => CliError::AuthFailed {
            profile: profile_name.into(),
        },
        other => other,
    }
}
