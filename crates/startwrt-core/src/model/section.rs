// ── Sections ──
//
// A section is a typed, optionally named record of options inside one
// configuration. Option order is preserved as rpcd reports it.

use indexmap::IndexMap;
use serde::Serialize;
use startwrt_api::UciSectionData;

use super::section_id::SectionId;
use super::value::OptionValue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub id: SectionId,
    #[serde(rename = "type")]
    pub section_type: String,
    pub anonymous: bool,
    /// Position among all sections of the configuration.
    pub index: usize,
    pub options: IndexMap<String, OptionValue>,

    /// Name the router knows this section by, or `None` when it was created
    /// locally and not yet saved.
    #[serde(skip)]
    pub(crate) origin: Option<String>,
}

impl Section {
    pub(crate) fn created(id: SectionId, section_type: String, anonymous: bool) -> Self {
        Self {
            id,
            section_type,
            anonymous,
            index: 0,
            options: IndexMap::new(),
            origin: None,
        }
    }

    /// Convert a section as rpcd returned it. Option keys starting with `.`
    /// are metadata and are dropped, as are values that are not strings or
    /// string lists.
    pub fn from_remote(data: UciSectionData) -> Self {
        let options = data
            .options
            .iter()
            .filter(|(key, _)| !key.starts_with('.'))
            .filter_map(|(key, value)| OptionValue::from_json(value).map(|v| (key.clone(), v)))
            .collect();

        Self {
            id: SectionId::from(data.name.clone()),
            section_type: data.section_type,
            anonymous: data.anonymous,
            index: 0,
            options,
            origin: Some(data.name),
        }
    }

    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.options.get(name)
    }

    /// Option lookup that also answers the `.name`, `.type`, `.anonymous`
    /// and `.index` metadata keys.
    pub fn value(&self, key: &str) -> Option<OptionValue> {
        match key {
            ".name" => Some(OptionValue::Scalar(self.id.to_string())),
            ".type" => Some(OptionValue::Scalar(self.section_type.clone())),
            ".anonymous" => Some(OptionValue::Scalar(
                if self.anonymous { "1" } else { "0" }.to_owned(),
            )),
            ".index" => Some(OptionValue::Scalar(self.index.to_string())),
            _ => self.options.get(key).cloned(),
        }
    }

    /// True when the section only exists in the local overlay.
    pub fn is_unsaved(&self) -> bool {
        self.origin.is_none()
    }
}

// ── Section references ──────────────────────────────────────────────

/// A section id as a caller may spell it.
///
/// Besides plain ids, `@type[n]` addresses the n-th section of a type,
/// counting from the end when `n` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionRef<'a> {
    Id(&'a str),
    Positional { section_type: &'a str, index: i64 },
}

impl<'a> SectionRef<'a> {
    pub fn parse(raw: &'a str) -> Self {
        Self::parse_positional(raw).unwrap_or(Self::Id(raw))
    }

    fn parse_positional(raw: &'a str) -> Option<Self> {
        let rest = raw.strip_prefix('@')?;
        let (section_type, index) = rest.strip_suffix(']')?.split_once('[')?;
        if !is_valid_type(section_type) {
            return None;
        }
        let index = index.parse().ok()?;
        Some(Self::Positional {
            section_type,
            index,
        })
    }
}

// ── Name validation ─────────────────────────────────────────────────

/// Section and option names: non-empty, alphanumerics and `_` only.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Section types additionally allow `-`.
pub fn is_valid_type(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
