// ── Section identity ──
//
// Sections created locally have no remote name until they are saved, so
// they carry a session-unique placeholder (`new` + six hex digits) in the
// meantime. Committed ids are whatever name the router knows the section by.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const PLACEHOLDER_PREFIX: &str = "new";
const PLACEHOLDER_MASK: u32 = 0x00ff_ffff;

// ── PlaceholderId ───────────────────────────────────────────────────

/// Temporary id of a section that has not been saved yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaceholderId(u32);

impl PlaceholderId {
    /// A fresh random placeholder. Callers check it against the ids already
    /// in use before handing it out.
    pub fn random() -> Self {
        let bytes = Uuid::new_v4().into_bytes();
        Self(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }

    /// Build a placeholder from its numeric token. Only the low 24 bits are kept.
    pub const fn from_token(token: u32) -> Self {
        Self(token & PLACEHOLDER_MASK)
    }

    pub const fn token(self) -> u32 {
        self.0
    }

    /// Parse the `newXXXXXX` form, lowercase hex only so the parsed id
    /// displays as the same string. Anything else is not a placeholder.
    pub fn parse(raw: &str) -> Option<Self> {
        let hex = raw.strip_prefix(PLACEHOLDER_PREFIX)?;
        if hex.len() != 6 || !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return None;
        }
        u32::from_str_radix(hex, 16).ok().map(Self)
    }
}

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PLACEHOLDER_PREFIX}{:06x}", self.0)
    }
}

// ── SectionId ───────────────────────────────────────────────────────

/// Identifier of a section within one configuration.
///
/// Serialized as the bare string form, so a placeholder shows up as
/// `new1a2b3c` and a committed section as its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum SectionId {
    Placeholder(PlaceholderId),
    Committed(String),
}

impl SectionId {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    pub fn as_placeholder(&self) -> Option<PlaceholderId> {
        match self {
            Self::Placeholder(p) => Some(*p),
            Self::Committed(_) => None,
        }
    }

    pub fn as_committed(&self) -> Option<&str> {
        match self {
            Self::Committed(name) => Some(name),
            Self::Placeholder(_) => None,
        }
    }

    /// Compare against a raw id string without allocating.
    pub fn matches(&self, raw: &str) -> bool {
        match self {
            Self::Committed(name) => name == raw,
            Self::Placeholder(p) => PlaceholderId::parse(raw) == Some(*p),
        }
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placeholder(p) => write!(f, "{p}"),
            Self::Committed(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for SectionId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_owned()))
    }
}

impl From<PlaceholderId> for SectionId {
    fn from(p: PlaceholderId) -> Self {
        Self::Placeholder(p)
    }
}

impl From<String> for SectionId {
    fn from(s: String) -> Self {
        match PlaceholderId::parse(&s) {
            Some(p) => Self::Placeholder(p),
            None => Self::Committed(s),
        }
    }
}

impl From<&str> for SectionId {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<SectionId> for String {
    fn from(id: SectionId) -> Self {
        match id {
            SectionId::Committed(name) => name,
            SectionId::Placeholder(p) => p.to_string(),
        }
    }
}
