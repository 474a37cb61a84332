//! Session handlers: `changes`, `revert`, `apply`, `confirm`, `rollback`.

use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tabled::Tabled;

use startwrt_core::{ChangeOp, ChangeRecord, Router};

use crate::cli::{ApplyArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::show::quote;
use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Config")]
    config: String,
    #[tabled(rename = "Op")]
    op: String,
    #[tabled(rename = "Section")]
    section: String,
    #[tabled(rename = "Option")]
    option: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn change_rows(changes: &BTreeMap<String, Vec<ChangeRecord>>, color: bool) -> Vec<ChangeRow> {
    changes
        .iter()
        .flat_map(|(config, records)| {
            records.iter().map(move |record| ChangeRow {
                config: config.clone(),
                op: output::paint_op(record.op.as_ref(), color),
                section: record.sid.clone(),
                option: record.key.clone().unwrap_or_default(),
                value: record
                    .value
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// One change in `uci changes` notation.
pub fn change_line(config: &str, record: &ChangeRecord) -> String {
    let target = format!("{config}.{}", record.sid);
    let key = record.key.as_deref().unwrap_or_default();
    let value = record.value.as_ref().map(quote).unwrap_or_default();
    match (record.op, record.key.is_some()) {
        (ChangeOp::Add, _) => format!("{target}={key}"),
        (ChangeOp::Set, _) => format!("{target}.{key}={value}"),
        (ChangeOp::Remove, false) => format!("-{target}"),
        (ChangeOp::Remove, true) => format!("-{target}.{key}"),
        (ChangeOp::ListAdd, _) => format!("{target}.{key}+={value}"),
        (ChangeOp::ListDel, _) => format!("{target}.{key}-={value}"),
        (ChangeOp::Rename, _) => match record.value {
            Some(ref name) => format!("@{target}.{key}={name}"),
            None => format!("@{target}={key}"),
        },
        (ChangeOp::Order, _) => format!("{target}=^{key}"),
    }
}

fn change_lines(changes: &BTreeMap<String, Vec<ChangeRecord>>) -> Vec<String> {
    changes
        .iter()
        .flat_map(|(config, records)| {
            records
                .iter()
                .map(move |record| change_line(config, record))
        })
        .collect()
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(
    router: &Router,
    config: Option<&str>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut changes = router.uci().remote_changes().await?;
    if let Some(config) = config {
        changes.retain(|name, _| name == config);
    }
    if changes.is_empty() {
        output::print_status("No staged changes", global.quiet);
        return Ok(());
    }

    let color = output::should_color(&global.color);
    let out = output::render(
        &global.output,
        &Staged(&changes),
        |staged| change_rows(staged.0, color),
        |staged| change_lines(staged.0),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Serializes as `{config: [[op, sid, key?, value?], ...]}`, the shape rpcd
/// returns.
#[derive(Serialize)]
#[serde(transparent)]
struct Staged<'a>(&'a BTreeMap<String, Vec<ChangeRecord>>);

pub async fn revert(router: &Router, config: &str, global: &GlobalOpts) -> Result<(), CliError> {
    if !util::confirm(&format!("Discard staged changes of {config}?"), global.yes)? {
        return Ok(());
    }
    router.uci().revert(config).await?;
    output::print_status(&format!("Reverted {config}"), global.quiet);
    Ok(())
}

pub async fn apply(router: &Router, args: &ApplyArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let uci = router.uci();
    let staged = uci.remote_changes().await?;
    if staged.is_empty() {
        output::print_status("No staged changes", global.quiet);
        return Ok(());
    }
    let configs: Vec<_> = staged.keys().cloned().collect();
    if !util::confirm(&format!("Apply changes to {}?", configs.join(", ")), global.yes)? {
        return Ok(());
    }

    let timeout = args.timeout.unwrap_or(router.config().apply_timeout);
    if args.no_confirm {
        uci.apply(timeout).await?;
        output::print_status(
            &format!("Applied. Run: startwrt confirm within {timeout}s or the router rolls back"),
            global.quiet,
        );
        return Ok(());
    }

    let spinner = spinner(global.quiet);
    spinner.set_message(format!("Applying, confirming within {timeout}s"));
    let result = uci.apply_and_confirm(timeout).await;
    spinner.finish_and_clear();
    result?;

    output::print_status(
        &format!("Applied and confirmed {}", configs.join(", ")),
        global.quiet,
    );
    Ok(())
}

pub async fn confirm(router: &Router, global: &GlobalOpts) -> Result<(), CliError> {
    router.uci().confirm().await?;
    output::print_status("Confirmed", global.quiet);
    Ok(())
}

pub async fn rollback(router: &Router, global: &GlobalOpts) -> Result<(), CliError> {
    if !util::confirm("Roll back the pending apply?", global.yes)? {
        return Ok(());
    }
    router.uci().rollback().await?;
    output::print_status("Rolled back", global.quiet);
    Ok(())
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use startwrt_core::OptionValue;

    fn record(op: ChangeOp, sid: &str, key: Option<&str>, value: Option<OptionValue>) -> ChangeRecord {
        ChangeRecord {
            op,
            sid: sid.into(),
            key: key.map(str::to_owned),
            value,
        }
    }

    #[test]
    fn renders_uci_changes_notation() {
        let lines = [
            record(ChangeOp::Add, "guest", Some("zone"), None),
            record(ChangeOp::Set, "guest", Some("input"), Some("REJECT".into())),
            record(ChangeOp::ListAdd, "guest", Some("network"), Some("guest".into())),
            record(ChangeOp::Remove, "cfg02dc81", None, None),
            record(ChangeOp::Remove, "guest", Some("forward"), None),
            record(ChangeOp::Order, "guest", Some("0"), None),
            record(ChangeOp::Rename, "cfg03dc81", Some("wan_rule"), None),
        ]
        .iter()
        .map(|r| change_line("firewall", r))
        .collect::<Vec<_>>();

        assert_eq!(
            lines,
            [
                "firewall.guest=zone",
                "firewall.guest.input='REJECT'",
                "firewall.guest.network+='guest'",
                "-firewall.cfg02dc81",
                "-firewall.guest.forward",
                "firewall.guest=^0",
                "@firewall.cfg03dc81=wan_rule",
            ]
        );
    }

    #[test]
    fn option_rename_shows_both_names() {
        let line = change_line(
            "network",
            &record(ChangeOp::Rename, "lan", Some("ifname"), Some("device".into())),
        );
        assert_eq!(line, "@network.lan.ifname=device");
    }
}
