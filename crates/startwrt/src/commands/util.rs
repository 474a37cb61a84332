//! Shared helpers for command handlers: `config.section.option` paths,
//! `path=value` assignments, and confirmation prompts.

use crate::error::CliError;

/// A dotted UCI address. The section part may be an `@type[n]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UciPath {
    pub config: String,
    pub section: Option<String>,
    pub option: Option<String>,
}

impl UciPath {
    pub fn parse(raw: &str) -> Result<Self, CliError> {
        let invalid = |reason: &str| CliError::Validation {
            field: "path".into(),
            reason: format!("'{raw}': {reason}"),
        };

        let mut parts = raw.splitn(3, '.');
        let config = parts.next().unwrap_or_default();
        if config.is_empty() {
            return Err(invalid("missing configuration name"));
        }
        let section = parts.next();
        let option = parts.next();
        if section == Some("") || option == Some("") {
            return Err(invalid("empty path component"));
        }
        if option.is_some_and(|o| o.contains('.')) {
            return Err(invalid("too many components"));
        }

        Ok(Self {
            config: config.to_owned(),
            section: section.map(str::to_owned),
            option: option.map(str::to_owned),
        })
    }

    /// The section part, required by the caller.
    pub fn section(&self) -> Result<&str, CliError> {
        self.section.as_deref().ok_or_else(|| CliError::Validation {
            field: "path".into(),
            reason: format!("'{}' does not name a section", self.config),
        })
    }

    /// The option part, required by the caller.
    pub fn option(&self) -> Result<&str, CliError> {
        self.option.as_deref().ok_or_else(|| CliError::Validation {
            field: "path".into(),
            reason: format!("'{self}' does not name an option"),
        })
    }
}

impl std::fmt::Display for UciPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.config)?;
        if let Some(ref section) = self.section {
            write!(f, ".{section}")?;
        }
        if let Some(ref option) = self.option {
            write!(f, ".{option}")?;
        }
        Ok(())
    }
}

/// Split `path=value` into its parsed path and the raw value.
pub fn parse_assignment(raw: &str) -> Result<(UciPath, String), CliError> {
    let (path, value) = raw.split_once('=').ok_or_else(|| CliError::Validation {
        field: "assignment".into(),
        reason: format!("'{raw}': expected PATH=VALUE"),
    })?;
    Ok((UciPath::parse(path)?, unquote(value).to_owned()))
}

/// Split `option=value` for `add --set`.
pub fn parse_option_value(raw: &str) -> Result<(String, String), CliError> {
    match raw.split_once('=') {
        Some((option, value)) if !option.is_empty() => {
            Ok((option.to_owned(), unquote(value).to_owned()))
        }
        _ => Err(CliError::Validation {
            field: "set".into(),
            reason: format!("'{raw}': expected OPTION=VALUE"),
        }),
    }
}

/// Strip one pair of matching single or double quotes, as `uci` accepts.
fn unquote(value: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}
