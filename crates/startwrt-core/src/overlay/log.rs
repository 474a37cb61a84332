// ── Change log ──
//
// Ordered record of the local edits made to one configuration since it was
// last loaded or saved. Entries are only ever appended, except when the
// overlay compacts edits of a section that is being removed and when a save
// drains the prefix it flushed.

use crate::model::{Change, ChangeRecord, PlaceholderId, SectionId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeLog {
    entries: Vec<Change>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change) {
        self.entries.push(change);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.entries.iter()
    }

    pub fn records(&self) -> Vec<ChangeRecord> {
        self.entries.iter().map(Change::to_record).collect()
    }

    pub fn has_reorder(&self) -> bool {
        self.entries
            .iter()
            .any(|c| matches!(c, Change::Order { .. }))
    }

    /// Positions of the entries that address the section now known as
    /// `sid`, oldest first.
    ///
    /// Renames are followed back to the section's own `add`, or to the start
    /// of the log for a remote section. Earlier sections that had the same
    /// name and were removed or renamed away are not part of the lineage.
    pub fn lineage(&self, sid: &SectionId) -> Vec<usize> {
        let mut current = sid.clone();
        let mut start = 0;
        for (index, change) in self.entries.iter().enumerate().rev() {
            match change {
                Change::Rename { sid: from, name }
                    if current.as_committed() == Some(name.as_str()) =>
                {
                    current = from.clone();
                }
                Change::Add { sid: created, .. } if *created == current => {
                    start = index;
                    break;
                }
                Change::Remove { sid: gone } | Change::Rename { sid: gone, .. }
                    if *gone == current =>
                {
                    start = index + 1;
                    break;
                }
                _ => {}
            }
        }

        let mut positions = Vec::new();
        for (index, change) in self.entries.iter().enumerate().skip(start) {
            if *change.sid() != current {
                continue;
            }
            positions.push(index);
            if let Change::Rename { name, .. } = change {
                current = SectionId::Committed(name.clone());
            }
        }
        positions
    }

    /// Keep the entries for which `keep` returns true, given each entry's
    /// position.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(usize, &Change) -> bool) {
        let mut index = 0;
        self.entries.retain(|change| {
            let kept = keep(index, change);
            index += 1;
            kept
        });
    }

    /// Remove and return the first `count` entries.
    pub(crate) fn drain_front(&mut self, count: usize) -> Vec<Change> {
        let count = count.min(self.entries.len());
        self.entries.drain(..count).collect()
    }

    /// Put previously drained entries back in front of the current ones.
    pub(crate) fn restore_front(&mut self, mut drained: Vec<Change>) {
        drained.append(&mut self.entries);
        self.entries = drained;
    }

    /// Point entries at committed names once placeholders were saved.
    pub(crate) fn rebase(&mut self, resolve: impl Fn(PlaceholderId) -> Option<String>) {
        for change in &mut self.entries {
            let sid = change.sid_mut();
            if let Some(name) = sid.as_placeholder().and_then(&resolve) {
                *sid = SectionId::Committed(name);
            }
        }
    }
}

impl<'a> IntoIterator for &'a ChangeLog {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn committed(name: &str) -> SectionId {
        SectionId::Committed(name.into())
    }

    #[test]
    fn lineage_follows_rename_chain() {
        let placeholder = SectionId::Placeholder(PlaceholderId::from_token(7));
        let mut log = ChangeLog::new();
        log.push(Change::Add {
            sid: placeholder.clone(),
            section_type: "host".into(),
            anonymous: true,
        });
        log.push(Change::Set {
            sid: committed("router"),
            option: "ip".into(),
            value: "192.168.1.1".into(),
        });
        log.push(Change::Rename {
            sid: placeholder,
            name: "printer".into(),
        });
        log.push(Change::Rename {
            sid: committed("printer"),
            name: "office_printer".into(),
        });

        assert_eq!(log.lineage(&committed("office_printer")), vec![0, 2, 3]);
    }

    #[test]
    fn lineage_stops_at_earlier_section_of_same_name() {
        let mut log = ChangeLog::new();
        log.push(Change::Set {
            sid: committed("lan"),
            option: "proto".into(),
            value: "static".into(),
        });
        log.push(Change::Remove {
            sid: committed("lan"),
        });
        log.push(Change::Add {
            sid: committed("lan"),
            section_type: "interface".into(),
            anonymous: false,
        });
        log.push(Change::Set {
            sid: committed("lan"),
            option: "proto".into(),
            value: "dhcp".into(),
        });

        assert_eq!(log.lineage(&committed("lan")), vec![2, 3]);

        let mut renamed = ChangeLog::new();
        renamed.push(Change::Rename {
            sid: committed("lan"),
            name: "lan_old".into(),
        });
        renamed.push(Change::Rename {
            sid: committed("wan"),
            name: "lan".into(),
        });
        assert_eq!(renamed.lineage(&committed("lan")), vec![1]);
    }

    #[test]
    fn drain_and_restore_preserve_order() {
        let mut log = ChangeLog::new();
        for index in 0..3 {
            log.push(Change::Order {
                sid: committed("lan"),
                index,
            });
        }
        let drained = log.drain_front(2);
        log.push(Change::Remove {
            sid: committed("wan"),
        });
        log.restore_front(drained);

        let ops: Vec<String> = log.records().into_iter().map(|r| r.op.to_string()).collect();
        assert_eq!(ops, vec!["order", "order", "order", "remove"]);
    }

    #[test]
    fn rebase_rewrites_placeholders() {
        let placeholder = SectionId::Placeholder(PlaceholderId::from_token(0x42));
        let mut log = ChangeLog::new();
        log.push(Change::Set {
            sid: placeholder,
            option: "name".into(),
            value: "guest".into(),
        });
        log.rebase(|p| (p.token() == 0x42).then(|| "cfg0c1d2e".to_owned()));
        assert_eq!(log.iter().next().map(Change::sid), Some(&committed("cfg0c1d2e")));
    }
}
