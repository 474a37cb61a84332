//! Command dispatch: bridges CLI args to the UCI overlay and output formatting.

pub mod changes;
pub mod config_cmd;
pub mod edit;
pub mod show;
pub mod util;

use startwrt_core::{Router, Section, Uci, UciBackend};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Dispatch a router-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, router: &Router, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Show { path } => show::show(router, path, global).await,
        Command::Get { path } => show::get(router, &path, global).await,
        Command::Set { assignments } => edit::set(router, &assignments, global).await,
        Command::Add {
            config,
            section_type,
            name,
            values,
        } => edit::add(router, &config, &section_type, name.as_deref(), &values, global).await,
        Command::AddList { assignment } => edit::list(router, &assignment, true, global).await,
        Command::DelList { assignment } => edit::list(router, &assignment, false, global).await,
        Command::Delete { path } => edit::delete(router, &path, global).await,
        Command::Rename { assignment } => edit::rename(router, &assignment, global).await,
        Command::Move {
            path,
            before,
            after,
        } => edit::move_section(router, &path, before.as_deref(), after.as_deref(), global).await,
        Command::Changes { config } => changes::list(router, config.as_deref(), global).await,
        Command::Revert { config } => changes::revert(router, &config, global).await,
        Command::Apply(args) => changes::apply(router, &args, global).await,
        Command::Confirm => changes::confirm(router, global).await,
        Command::Rollback => changes::rollback(router, global).await,
        Command::Login => {
            output::print_status(
                &format!(
                    "Logged in as {} at {}",
                    router.config().credentials.username,
                    router.config().url
                ),
                global.quiet,
            );
            Ok(())
        }
        // Config, Completions and Logout are handled before dispatch
        Command::Config(_) | Command::Completions(_) | Command::Logout => Ok(()),
    }
}

/// Load `config`, failing when the router does not have it.
pub async fn load<B: UciBackend>(uci: &Uci<B>, config: &str) -> Result<(), CliError> {
    if uci.load(&[config]).await.is_empty() {
        return Err(CliError::NotFound {
            resource_type: "configuration".into(),
            identifier: config.into(),
            list_command: "show".into(),
        });
    }
    Ok(())
}

/// Look up a section of a loaded configuration.
pub fn section<B: UciBackend>(uci: &Uci<B>, config: &str, sid: &str) -> Result<Section, CliError> {
    uci.get(config, sid).ok_or_else(|| CliError::NotFound {
        resource_type: "section".into(),
        identifier: format!("{config}.{sid}"),
        list_command: format!("show {config}"),
    })
}
