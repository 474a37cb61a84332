// ── Configuration snapshots and the change reducer ──
//
// A snapshot is the ordered section list of one configuration. `apply`
// folds a single change into a snapshot, `replay` folds a whole log. The
// overlay never edits its view any other way, so the view is always
// `replay(base, log)`.

use serde::Serialize;

use crate::model::{Change, OptionValue, Section, SectionId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConfigSnapshot {
    sections: Vec<Section>,
}

impl ConfigSnapshot {
    pub fn new(sections: Vec<Section>) -> Self {
        let mut snapshot = Self { sections };
        snapshot.renumber();
        snapshot
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn get(&self, sid: &SectionId) -> Option<&Section> {
        self.sections.iter().find(|s| &s.id == sid)
    }

    /// Look up a section by its raw id string.
    pub fn find(&self, raw: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id.matches(raw))
    }

    pub fn position(&self, sid: &SectionId) -> Option<usize> {
        self.sections.iter().position(|s| &s.id == sid)
    }

    pub fn contains(&self, sid: &SectionId) -> bool {
        self.position(sid).is_some()
    }

    /// Section ids in order.
    pub fn ids(&self) -> Vec<SectionId> {
        self.sections.iter().map(|s| s.id.clone()).collect()
    }

    /// Sections of one type, in order.
    pub fn of_type<'a>(&'a self, section_type: &'a str) -> impl Iterator<Item = &'a Section> + 'a {
        self.sections
            .iter()
            .filter(move |s| s.section_type == section_type)
    }

    /// The section whose remote name is `origin`.
    pub(crate) fn by_origin(&self, origin: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.origin.as_deref() == Some(origin))
    }

    fn get_mut(&mut self, sid: &SectionId) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| &s.id == sid)
    }

    fn renumber(&mut self) {
        for (index, section) in self.sections.iter_mut().enumerate() {
            section.index = index;
        }
    }

    fn apply_mut(&mut self, change: &Change) {
        match change {
            Change::Add {
                sid,
                section_type,
                anonymous,
            } => {
                if let Some(section) = self.get_mut(sid) {
                    section.section_type.clone_from(section_type);
                } else {
                    self.sections
                        .push(Section::created(sid.clone(), section_type.clone(), *anonymous));
                }
            }
            Change::Set { sid, option, value } => {
                if let Some(section) = self.get_mut(sid) {
                    section.options.insert(option.clone(), value.clone());
                }
            }
            Change::Unset { sid, option } => {
                if let Some(section) = self.get_mut(sid) {
                    section.options.shift_remove(option);
                }
            }
            Change::Remove { sid } => {
                self.sections.retain(|s| &s.id != sid);
            }
            Change::Order { sid, index } => {
                if let Some(from) = self.position(sid) {
                    let section = self.sections.remove(from);
                    let to = (*index).min(self.sections.len());
                    self.sections.insert(to, section);
                }
            }
            Change::ListAdd { sid, option, item } => {
                if let Some(section) = self.get_mut(sid) {
                    let items = match section.options.get(option) {
                        None => vec![item.clone()],
                        Some(OptionValue::Scalar(s)) => vec![s.clone(), item.clone()],
                        Some(OptionValue::List(items)) => {
                            let mut items = items.clone();
                            items.push(item.clone());
                            items
                        }
                    };
                    section
                        .options
                        .insert(option.clone(), OptionValue::List(items));
                }
            }
            Change::ListDel { sid, option, item } => {
                if let Some(section) = self.get_mut(sid) {
                    let remaining = match section.options.get(option) {
                        Some(OptionValue::List(items)) => {
                            items.iter().filter(|i| *i != item).cloned().collect()
                        }
                        Some(OptionValue::Scalar(s)) if s != item => vec![s.clone()],
                        _ => Vec::new(),
                    };
                    if remaining.is_empty() {
                        section.options.shift_remove(option);
                    } else {
                        section
                            .options
                            .insert(option.clone(), OptionValue::List(remaining));
                    }
                }
            }
            Change::Rename { sid, name } => {
                let target = SectionId::Committed(name.clone());
                if !self.contains(&target) {
                    if let Some(section) = self.get_mut(sid) {
                        section.id = target;
                        section.anonymous = false;
                    }
                }
            }
            Change::RenameOption { sid, option, name } => {
                if let Some(section) = self.get_mut(sid) {
                    if !section.options.contains_key(name) {
                        if let Some((index, _, value)) = section.options.shift_remove_full(option)
                        {
                            section.options.shift_insert(index, name.clone(), value);
                        }
                    }
                }
            }
        }
        self.renumber();
    }
}

/// Fold one change into a snapshot.
///
/// Changes aimed at sections that do not exist are ignored, as are renames
/// onto an id that is already taken.
pub fn apply(mut snapshot: ConfigSnapshot, change: &Change) -> ConfigSnapshot {
    snapshot.apply_mut(change);
    snapshot
}

/// Fold a sequence of changes into a copy of `base`.
pub fn replay<'a>(
    base: &ConfigSnapshot,
    changes: impl IntoIterator<Item = &'a Change>,
) -> ConfigSnapshot {
    changes.into_iter().fold(base.clone(), apply)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::PlaceholderId;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    fn committed(name: &str) -> SectionId {
        SectionId::Committed(name.into())
    }

    fn remote(name: &str, section_type: &str, options: &[(&str, &str)]) -> Section {
        Section {
            id: committed(name),
            section_type: section_type.into(),
            anonymous: false,
            index: 0,
            options: options
                .iter()
                .map(|(k, v)| ((*k).to_owned(), OptionValue::from(*v)))
                .collect::<IndexMap<_, _>>(),
            origin: Some(name.into()),
        }
    }

    fn network() -> ConfigSnapshot {
        ConfigSnapshot::new(vec![
            remote("loopback", "interface", &[("proto", "static")]),
            remote("lan", "interface", &[("proto", "static"), ("ipaddr", "192.168.1.1")]),
            remote("wan", "interface", &[("proto", "dhcp")]),
        ])
    }

    #[test]
    fn add_appends_with_index() {
        let sid = SectionId::Placeholder(PlaceholderId::from_token(1));
        let next = apply(
            network(),
            &Change::Add {
                sid: sid.clone(),
                section_type: "interface".into(),
                anonymous: true,
            },
        );
        let added = next.get(&sid).unwrap();
        assert_eq!(added.index, 3);
        assert!(added.is_unsaved());
    }

    #[test]
    fn set_and_unset_keep_option_order() {
        let lan = committed("lan");
        let next = replay(
            &network(),
            &[
                Change::Set {
                    sid: lan.clone(),
                    option: "proto".into(),
                    value: "dhcp".into(),
                },
                Change::Set {
                    sid: lan.clone(),
                    option: "mtu".into(),
                    value: "1400".into(),
                },
                Change::Unset {
                    sid: lan.clone(),
                    option: "ipaddr".into(),
                },
            ],
        );
        let keys: Vec<&str> = next
            .get(&lan)
            .unwrap()
            .options
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["proto", "mtu"]);
    }

    #[test]
    fn order_clamps_to_end() {
        let next = apply(
            network(),
            &Change::Order {
                sid: committed("loopback"),
                index: 99,
            },
        );
        assert_eq!(next.ids(), vec![committed("lan"), committed("wan"), committed("loopback")]);
        assert_eq!(next.get(&committed("loopback")).unwrap().index, 2);
    }

    #[test]
    fn list_add_promotes_scalar() {
        let lan = committed("lan");
        let next = apply(
            network(),
            &Change::ListAdd {
                sid: lan.clone(),
                option: "proto".into(),
                item: "extra".into(),
            },
        );
        assert_eq!(
            next.get(&lan).unwrap().option("proto"),
            Some(&OptionValue::from(vec!["static", "extra"]))
        );
    }

    #[test]
    fn list_del_drops_emptied_option() {
        let wan = committed("wan");
        let next = replay(
            &network(),
            &[
                Change::ListAdd {
                    sid: wan.clone(),
                    option: "dns".into(),
                    item: "1.1.1.1".into(),
                },
                Change::ListDel {
                    sid: wan.clone(),
                    option: "dns".into(),
                    item: "1.1.1.1".into(),
                },
            ],
        );
        assert_eq!(next.get(&wan).unwrap().option("dns"), None);
    }

    #[test]
    fn rename_refuses_taken_ids() {
        let next = apply(
            network(),
            &Change::Rename {
                sid: committed("wan"),
                name: "lan".into(),
            },
        );
        assert_eq!(next, network());
    }

    #[test]
    fn rename_option_keeps_position() {
        let lan = committed("lan");
        let next = apply(
            network(),
            &Change::RenameOption {
                sid: lan.clone(),
                option: "proto".into(),
                name: "protocol".into(),
            },
        );
        let keys: Vec<&str> = next
            .get(&lan)
            .unwrap()
            .options
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["protocol", "ipaddr"]);
    }

    #[test]
    fn changes_on_missing_sections_are_ignored() {
        let ghost = committed("ghost");
        let next = replay(
            &network(),
            &[
                Change::Set {
                    sid: ghost.clone(),
                    option: "a".into(),
                    value: "b".into(),
                },
                Change::Order {
                    sid: ghost.clone(),
                    index: 0,
                },
                Change::Remove { sid: ghost },
            ],
        );
        assert_eq!(next, network());
    }
}
