//! Read-only handlers: `show` and `get`.

use tabled::Tabled;

use startwrt_core::{CoreError, OptionValue, Router, Section};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util::UciPath;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct OptionRow {
    #[tabled(rename = "Section")]
    section: String,
    #[tabled(rename = "Type")]
    section_type: String,
    #[tabled(rename = "Option")]
    option: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct ConfigRow {
    #[tabled(rename = "Configuration")]
    name: String,
}

fn option_rows(sections: &[Section]) -> Vec<OptionRow> {
    let mut rows = Vec::new();
    for section in sections {
        let label = section_label(section);
        if section.options.is_empty() {
            rows.push(OptionRow {
                section: label.clone(),
                section_type: section.section_type.clone(),
                option: String::new(),
                value: String::new(),
            });
        }
        for (option, value) in &section.options {
            rows.push(OptionRow {
                section: label.clone(),
                section_type: section.section_type.clone(),
                option: option.clone(),
                value: value.to_string(),
            });
        }
    }
    rows
}

fn section_label(section: &Section) -> String {
    if section.anonymous {
        format!("{} (anon)", section.id)
    } else {
        section.id.to_string()
    }
}

/// `uci show` style lines.
pub fn show_lines(config: &str, sections: &[Section]) -> Vec<String> {
    let mut lines = Vec::new();
    for section in sections {
        lines.push(format!("{config}.{}={}", section.id, section.section_type));
        for (option, value) in &section.options {
            lines.push(format!("{config}.{}.{option}={}", section.id, quote(value)));
        }
    }
    lines
}

/// Quote a value the way `uci show` does, one quoted word per list item.
pub fn quote(value: &OptionValue) -> String {
    fn one(item: &str) -> String {
        format!("'{}'", item.replace('\'', "'\\''"))
    }
    match value {
        OptionValue::Scalar(v) => one(v),
        OptionValue::List(items) => items.iter().map(|i| one(i)).collect::<Vec<_>>().join(" "),
    }
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn show(
    router: &Router,
    path: Option<String>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let Some(path) = path else {
        let mut names = router
            .client()
            .uci_configs()
            .await
            .map_err(CoreError::from)?;
        names.sort();
        let out = output::render(
            &global.output,
            &names,
            |names| {
                names
                    .iter()
                    .map(|name| ConfigRow { name: name.clone() })
                    .collect()
            },
            Clone::clone,
        );
        output::print_output(&out, global.quiet);
        return Ok(());
    };

    let uci = router.uci();
    let path = UciPath::parse(&path)?;
    super::load(&uci, &path.config).await?;

    let sections = match path.section {
        None => uci.sections(&path.config, None),
        Some(ref sid) => vec![super::section(&uci, &path.config, sid)?],
    };
    let out = output::render(&global.output, &sections, |s| option_rows(s), |s| {
        show_lines(&path.config, s)
    });
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn get(router: &Router, path: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let uci = router.uci();
    let path = UciPath::parse(path)?;
    super::load(&uci, &path.config).await?;
    let section = super::section(&uci, &path.config, path.section()?)?;

    let value = match path.option {
        None => OptionValue::Scalar(section.section_type.clone()),
        Some(ref option) => section.value(option).ok_or_else(|| CliError::NotFound {
            resource_type: "option".into(),
            identifier: path.to_string(),
            list_command: format!("show {}.{}", path.config, section.id),
        })?,
    };
    let out = output::render_single(&global.output, &value, ToString::to_string);
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn quotes_like_uci_show() {
        assert_eq!(quote(&"ACCEPT".into()), "'ACCEPT'");
        assert_eq!(quote(&vec!["lan", "wan6"].into()), "'lan' 'wan6'");
        assert_eq!(quote(&"it's".into()), "'it'\\''s'");
    }
}
