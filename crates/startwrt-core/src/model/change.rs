// ── Changes ──
//
// `Change` is one local edit as the overlay records it. `ChangeRecord` is
// the flat `[op, sid, key?, value?]` form rpcd uses in `uci changes`
// replies and the form the CLI prints.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

use super::section_id::SectionId;
use super::value::OptionValue;

/// Operation code of a change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ChangeOp {
    Add,
    Set,
    Remove,
    Order,
    ListAdd,
    ListDel,
    Rename,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Add {
        sid: SectionId,
        section_type: String,
        anonymous: bool,
    },
    Set {
        sid: SectionId,
        option: String,
        value: OptionValue,
    },
    Unset {
        sid: SectionId,
        option: String,
    },
    Remove {
        sid: SectionId,
    },
    /// Move the section to `index` among all sections of the configuration.
    Order {
        sid: SectionId,
        index: usize,
    },
    ListAdd {
        sid: SectionId,
        option: String,
        item: String,
    },
    ListDel {
        sid: SectionId,
        option: String,
        item: String,
    },
    Rename {
        sid: SectionId,
        name: String,
    },
    RenameOption {
        sid: SectionId,
        option: String,
        name: String,
    },
}

impl Change {
    pub fn op(&self) -> ChangeOp {
        match self {
            Self::Add { .. } => ChangeOp::Add,
            Self::Set { .. } => ChangeOp::Set,
            Self::Unset { .. } | Self::Remove { .. } => ChangeOp::Remove,
            Self::Order { .. } => ChangeOp::Order,
            Self::ListAdd { .. } => ChangeOp::ListAdd,
            Self::ListDel { .. } => ChangeOp::ListDel,
            Self::Rename { .. } | Self::RenameOption { .. } => ChangeOp::Rename,
        }
    }

    /// The section this change applies to.
    pub fn sid(&self) -> &SectionId {
        match self {
            Self::Add { sid, .. }
            | Self::Set { sid, .. }
            | Self::Unset { sid, .. }
            | Self::Remove { sid }
            | Self::Order { sid, .. }
            | Self::ListAdd { sid, .. }
            | Self::ListDel { sid, .. }
            | Self::Rename { sid, .. }
            | Self::RenameOption { sid, .. } => sid,
        }
    }

    pub(crate) fn sid_mut(&mut self) -> &mut SectionId {
        match self {
            Self::Add { sid, .. }
            | Self::Set { sid, .. }
            | Self::Unset { sid, .. }
            | Self::Remove { sid }
            | Self::Order { sid, .. }
            | Self::ListAdd { sid, .. }
            | Self::ListDel { sid, .. }
            | Self::Rename { sid, .. }
            | Self::RenameOption { sid, .. } => sid,
        }
    }

    /// True for edits that touch options rather than the section itself.
    pub fn is_option_edit(&self) -> bool {
        matches!(
            self,
            Self::Set { .. }
                | Self::Unset { .. }
                | Self::ListAdd { .. }
                | Self::ListDel { .. }
                | Self::RenameOption { .. }
        )
    }

    pub fn to_record(&self) -> ChangeRecord {
        let sid = self.sid().to_string();
        let (key, value) = match self {
            Self::Add { section_type, .. } => (Some(section_type.clone()), None),
            Self::Set { option, value, .. } => (Some(option.clone()), Some(value.clone())),
            Self::Unset { option, .. } => (Some(option.clone()), None),
            Self::Remove { .. } => (None, None),
            Self::Order { index, .. } => (Some(index.to_string()), None),
            Self::ListAdd { option, item, .. } | Self::ListDel { option, item, .. } => {
                (Some(option.clone()), Some(OptionValue::Scalar(item.clone())))
            }
            Self::Rename { name, .. } => (Some(name.clone()), None),
            Self::RenameOption { option, name, .. } => {
                (Some(option.clone()), Some(OptionValue::Scalar(name.clone())))
            }
        };
        ChangeRecord {
            op: self.op(),
            sid,
            key,
            value,
        }
    }

    /// Interpret a record reported by the router.
    ///
    /// Remote records only ever name committed sections. A `set` without a
    /// value creates a named section, `remove` and `rename` with a key act on
    /// an option.
    pub fn from_record(record: &ChangeRecord) -> Result<Self, InvalidRecord> {
        let sid = SectionId::Committed(record.sid.clone());
        let key = || {
            record
                .key
                .clone()
                .ok_or_else(|| InvalidRecord(format!("'{}' record without key", record.op)))
        };
        let scalar = || match &record.value {
            Some(OptionValue::Scalar(s)) => Ok(s.clone()),
            _ => Err(InvalidRecord(format!(
                "'{}' record without scalar value",
                record.op
            ))),
        };

        let change = match record.op {
            ChangeOp::Add => Self::Add {
                sid,
                section_type: key()?,
                anonymous: true,
            },
            ChangeOp::Set => match &record.value {
                Some(value) => Self::Set {
                    sid,
                    option: key()?,
                    value: value.clone(),
                },
                None => Self::Add {
                    sid,
                    section_type: key()?,
                    anonymous: false,
                },
            },
            ChangeOp::Remove => match &record.key {
                Some(option) => Self::Unset {
                    sid,
                    option: option.clone(),
                },
                None => Self::Remove { sid },
            },
            ChangeOp::Order => {
                let raw = key()?;
                let index = raw
                    .parse()
                    .map_err(|_| InvalidRecord(format!("invalid order index '{raw}'")))?;
                Self::Order { sid, index }
            }
            ChangeOp::ListAdd => Self::ListAdd {
                sid,
                option: key()?,
                item: scalar()?,
            },
            ChangeOp::ListDel => Self::ListDel {
                sid,
                option: key()?,
                item: scalar()?,
            },
            ChangeOp::Rename => match &record.value {
                Some(_) => Self::RenameOption {
                    sid,
                    option: key()?,
                    name: scalar()?,
                },
                None => Self::Rename { sid, name: key()? },
            },
        };
        Ok(change)
    }
}

// ── ChangeRecord ────────────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("invalid change record: {0}")]
pub struct InvalidRecord(String);

/// Wire form of a change: `[op, sid, key?, value?]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Value>", try_from = "Vec<Value>")]
pub struct ChangeRecord {
    pub op: ChangeOp,
    pub sid: String,
    pub key: Option<String>,
    pub value: Option<OptionValue>,
}

impl From<ChangeRecord> for Vec<Value> {
    fn from(record: ChangeRecord) -> Self {
        let mut fields = vec![
            Value::String(record.op.to_string()),
            Value::String(record.sid),
        ];
        if let Some(key) = record.key {
            fields.push(Value::String(key));
            if let Some(value) = record.value {
                fields.push(value.to_json());
            }
        }
        fields
    }
}

impl TryFrom<Vec<Value>> for ChangeRecord {
    type Error = InvalidRecord;

    fn try_from(fields: Vec<Value>) -> Result<Self, Self::Error> {
        let mut fields = fields.into_iter();

        let op = match fields.next() {
            Some(Value::String(op)) => op
                .parse::<ChangeOp>()
                .map_err(|_| InvalidRecord(format!("unknown operation '{op}'")))?,
            other => return Err(InvalidRecord(format!("expected operation, got {other:?}"))),
        };
        let sid = match fields.next() {
            Some(Value::String(sid)) => sid,
            other => return Err(InvalidRecord(format!("expected section id, got {other:?}"))),
        };
        let key = match fields.next() {
            None | Some(Value::Null) => None,
            Some(Value::String(key)) => Some(key),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(other) => return Err(InvalidRecord(format!("unexpected key {other}"))),
        };
        let value = match fields.next() {
            None | Some(Value::Null) => None,
            Some(raw) => Some(
                OptionValue::from_json(&raw)
                    .ok_or_else(|| InvalidRecord(format!("unexpected value {raw}")))?,
            ),
        };

        Ok(Self {
            op,
            sid,
            key,
            value,
        })
    }
}
