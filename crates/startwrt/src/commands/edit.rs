//! Staging handlers: `set`, `add`, `add-list`, `del-list`, `delete`,
//! `rename`, and `move`.
//!
//! Each handler loads the configurations it touches, stages edits in the
//! local overlay, then saves them into the router's session.

use startwrt_core::{OptionValue, Router, Uci, UciBackend, is_valid_name};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util::{self, UciPath};

/// Save staged edits and point at `apply`.
async fn save<B: UciBackend>(uci: &Uci<B>, global: &GlobalOpts) -> Result<(), CliError> {
    let saved = uci.save().await?;
    if !saved.is_empty() {
        output::print_status(
            &format!(
                "Staged changes to {}. Run: startwrt apply",
                saved.join(", ")
            ),
            global.quiet,
        );
    }
    Ok(())
}

fn rejected(what: &str, path: &UciPath) -> CliError {
    CliError::Validation {
        field: what.into(),
        reason: format!("'{path}' could not be staged"),
    }
}

// ── set ─────────────────────────────────────────────────────────────

pub async fn set(router: &Router, assignments: &[String], global: &GlobalOpts) -> Result<(), CliError> {
    let parsed = assignments
        .iter()
        .map(|raw| util::parse_assignment(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let uci = router.uci();
    for (path, _) in &parsed {
        if !uci.is_loaded(&path.config) {
            super::load(&uci, &path.config).await?;
        }
    }

    for (path, value) in &parsed {
        let sid = path.section()?;
        match path.option {
            // `config.name=type` declares a named section
            None => match uci.get(&path.config, sid) {
                Some(existing) if existing.section_type == *value => {}
                Some(existing) => {
                    return Err(CliError::Conflict {
                        resource_type: format!("{} section", existing.section_type),
                        identifier: path.to_string(),
                    });
                }
                None => {
                    uci.add(&path.config, value, Some(sid))
                        .ok_or_else(|| rejected("section", path))?;
                }
            },
            Some(ref option) => {
                super::section(&uci, &path.config, sid)?;
                let value = Some(OptionValue::Scalar(value.clone()));
                if !uci.set(&path.config, sid, option, value) {
                    return Err(rejected("option", path));
                }
            }
        }
    }

    save(&uci, global).await
}

// ── add ─────────────────────────────────────────────────────────────

pub async fn add(
    router: &Router,
    config: &str,
    section_type: &str,
    name: Option<&str>,
    values: &[String],
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let values = values
        .iter()
        .map(|raw| util::parse_option_value(raw))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some((option, _)) = values.iter().find(|(option, _)| !is_valid_name(option)) {
        return Err(CliError::Validation {
            field: "option".into(),
            reason: format!("'{option}' is not a valid option name"),
        });
    }

    let uci = router.uci();
    super::load(&uci, config).await?;

    if let Some(name) = name {
        if uci.get(config, name).is_some() {
            return Err(CliError::Conflict {
                resource_type: "section".into(),
                identifier: format!("{config}.{name}"),
            });
        }
    }
    let sid = uci
        .add(config, section_type, name)
        .ok_or_else(|| CliError::Validation {
            field: "section".into(),
            reason: format!("invalid section type or name for '{config}'"),
        })?;
    // Placeholder ids stay valid through the save for resolve_sid
    let sid = sid.to_string();
    for (option, value) in values {
        if !uci.set(config, &sid, &option, Some(OptionValue::Scalar(value))) {
            uci.remove(config, &sid);
            return Err(CliError::Validation {
                field: "option".into(),
                reason: format!("'{option}' could not be staged on {config}.{sid}"),
            });
        }
    }

    save(&uci, global).await?;

    let assigned = uci
        .resolve_sid(config, &sid)
        .map_or(sid, |resolved| resolved.to_string());
    output::print_output(&assigned, global.quiet);
    Ok(())
}

// ── add-list / del-list ─────────────────────────────────────────────

pub async fn list(
    router: &Router,
    assignment: &str,
    append: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (path, item) = util::parse_assignment(assignment)?;
    let option = path.option()?;
    let uci = router.uci();
    super::load(&uci, &path.config).await?;
    let section = super::section(&uci, &path.config, path.section()?)?;
    let sid = section.id.to_string();

    let staged = if append {
        uci.list_add(&path.config, &sid, option, &item)
    } else {
        if section.option(option).is_none() {
            return Err(CliError::NotFound {
                resource_type: "option".into(),
                identifier: path.to_string(),
                list_command: format!("show {}.{sid}", path.config),
            });
        }
        uci.list_del(&path.config, &sid, option, &item)
    };
    if !staged {
        return Err(rejected("option", &path));
    }

    save(&uci, global).await
}

// ── delete ──────────────────────────────────────────────────────────

pub async fn delete(router: &Router, path: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let path = UciPath::parse(path)?;
    let uci = router.uci();
    super::load(&uci, &path.config).await?;
    let section = super::section(&uci, &path.config, path.section()?)?;
    let sid = section.id.to_string();

    match path.option {
        None => {
            if !util::confirm(&format!("Delete section {path}?"), global.yes)? {
                return Ok(());
            }
            if !uci.remove(&path.config, &sid) {
                return Err(rejected("section", &path));
            }
        }
        Some(ref option) => {
            if section.option(option).is_none() {
                return Err(CliError::NotFound {
                    resource_type: "option".into(),
                    identifier: path.to_string(),
                    list_command: format!("show {}.{sid}", path.config),
                });
            }
            uci.unset(&path.config, &sid, option);
        }
    }

    save(&uci, global).await
}

// ── rename ──────────────────────────────────────────────────────────

pub async fn rename(router: &Router, assignment: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let (path, name) = util::parse_assignment(assignment)?;
    let uci = router.uci();
    super::load(&uci, &path.config).await?;
    let section = super::section(&uci, &path.config, path.section()?)?;
    let sid = section.id.to_string();

    let staged = match path.option {
        None => {
            if uci
                .get(&path.config, &name)
                .is_some_and(|other| other.id != section.id)
            {
                return Err(CliError::Conflict {
                    resource_type: "section".into(),
                    identifier: format!("{}.{name}", path.config),
                });
            }
            uci.rename(&path.config, &sid, &name)
        }
        Some(ref option) => {
            if section.option(option).is_none() {
                return Err(CliError::NotFound {
                    resource_type: "option".into(),
                    identifier: path.to_string(),
                    list_command: format!("show {}.{sid}", path.config),
                });
            }
            uci.rename_option(&path.config, &sid, option, &name)
        }
    };
    if !staged {
        return Err(rejected("name", &path));
    }

    save(&uci, global).await
}

// ── move ────────────────────────────────────────────────────────────

pub async fn move_section(
    router: &Router,
    path: &str,
    before: Option<&str>,
    after: Option<&str>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let path = UciPath::parse(path)?;
    let uci = router.uci();
    super::load(&uci, &path.config).await?;
    let section = super::section(&uci, &path.config, path.section()?)?;

    let (anchor, after_anchor) = match (before, after) {
        (Some(anchor), _) => (Some(anchor), false),
        (None, Some(anchor)) => (Some(anchor), true),
        (None, None) => (None, false),
    };
    if let Some(anchor) = anchor {
        super::section(&uci, &path.config, anchor)?;
    }

    let sid = section.id.to_string();
    if !uci.move_section(&path.config, &sid, anchor, after_anchor) {
        return Err(rejected("position", &path));
    }

    save(&uci, global).await
}
