// ── Per-configuration overlay ──
//
// Pairs the last-known remote snapshot (`base`) with the log of local
// edits and the merged `view` that callers read. Every mutation goes
// through `record`, which appends to the log and folds the change into the
// view; compaction rebuilds the view from scratch.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use super::log::ChangeLog;
use super::snapshot::{ConfigSnapshot, apply, replay};
use crate::model::{
    Change, ChangeRecord, OptionValue, PlaceholderId, Section, SectionId, SectionRef,
    is_valid_name, is_valid_type,
};

#[derive(Debug, Clone)]
pub struct ConfigOverlay {
    name: String,
    base: ConfigSnapshot,
    log: ChangeLog,
    view: ConfigSnapshot,
    /// Placeholders handed out for this configuration, saved or not.
    issued: HashSet<PlaceholderId>,
    /// Saved placeholders and the names the router gave them.
    resolved: HashMap<PlaceholderId, String>,
}

impl ConfigOverlay {
    pub fn new(name: impl Into<String>, base: ConfigSnapshot) -> Self {
        Self {
            name: name.into(),
            view: base.clone(),
            base,
            log: ChangeLog::new(),
            issued: HashSet::new(),
            resolved: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> &ConfigSnapshot {
        &self.base
    }

    pub fn view(&self) -> &ConfigSnapshot {
        &self.view
    }

    pub fn log(&self) -> &ChangeLog {
        &self.log
    }

    pub fn records(&self) -> Vec<ChangeRecord> {
        self.log.records()
    }

    pub fn has_changes(&self) -> bool {
        !self.log.is_empty()
    }

    fn record(&mut self, change: Change) {
        debug!(config = %self.name, op = %change.op(), sid = %change.sid(), "recording change");
        self.view = apply(std::mem::take(&mut self.view), &change);
        self.log.push(change);
    }

    fn rebuild(&mut self) {
        self.view = replay(&self.base, &self.log);
    }

    // ── Section ids ──────────────────────────────────────────────────

    /// A placeholder id no section of this configuration uses or used.
    pub fn create_sid(&mut self) -> SectionId {
        self.issue_sid(PlaceholderId::random)
    }

    /// Draw candidates until one is free. Remote sections are compared by
    /// name, since the router may hold one named like a placeholder.
    fn issue_sid(&mut self, mut candidates: impl FnMut() -> PlaceholderId) -> SectionId {
        loop {
            let candidate = candidates();
            let raw = candidate.to_string();
            if self.issued.contains(&candidate)
                || self.resolved.contains_key(&candidate)
                || self.base.find(&raw).is_some()
                || self.base.by_origin(&raw).is_some()
                || self.view.find(&raw).is_some()
            {
                continue;
            }
            self.issued.insert(candidate);
            return SectionId::Placeholder(candidate);
        }
    }

    /// Whether `name` can be given to a section: a valid name that is not
    /// taken and cannot be mistaken for a placeholder.
    fn name_available(&self, name: &str) -> bool {
        is_valid_name(name)
            && PlaceholderId::parse(name).is_none()
            && self.view.find(name).is_none()
    }

    /// Turn a caller-supplied id into the id the section has right now.
    pub fn resolve(&self, raw: &str) -> Option<SectionId> {
        match SectionRef::parse(raw) {
            SectionRef::Positional {
                section_type,
                index,
            } => {
                let matching: Vec<&Section> = self.view.of_type(section_type).collect();
                let position = if index < 0 {
                    let back = usize::try_from(index.unsigned_abs()).ok()?;
                    matching.len().checked_sub(back)?
                } else {
                    usize::try_from(index).ok()?
                };
                matching.get(position).map(|s| s.id.clone())
            }
            SectionRef::Id(raw) => {
                if let Some(section) = self.view.find(raw) {
                    return Some(section.id.clone());
                }
                let name = self.resolved.get(&PlaceholderId::parse(raw)?)?;
                self.view
                    .find(name)
                    .map(|section| section.id.clone())
            }
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, raw: &str) -> Option<&Section> {
        let sid = self.resolve(raw)?;
        self.view.get(&sid)
    }

    pub fn get_first(&self, section_type: Option<&str>) -> Option<&Section> {
        self.view
            .sections()
            .iter()
            .find(|s| section_type.is_none_or(|t| s.section_type == t))
    }

    pub fn sections(&self, section_type: Option<&str>) -> Vec<Section> {
        self.view
            .sections()
            .iter()
            .filter(|s| section_type.is_none_or(|t| s.section_type == t))
            .cloned()
            .collect()
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Stage a new section. A `name` gives it a committed id right away;
    /// without one it gets a placeholder.
    pub fn add(&mut self, section_type: &str, name: Option<&str>) -> Option<SectionId> {
        if !is_valid_type(section_type) {
            warn!(config = %self.name, section_type, "invalid section type");
            return None;
        }

        let (sid, anonymous) = match name {
            Some(name) => {
                if !self.name_available(name) {
                    warn!(config = %self.name, name, "invalid or duplicate section name");
                    return None;
                }
                (SectionId::Committed(name.to_owned()), false)
            }
            None => (self.create_sid(), true),
        };

        self.record(Change::Add {
            sid: sid.clone(),
            section_type: section_type.to_owned(),
            anonymous,
        });
        Some(sid)
    }

    /// Stage removal of a section.
    ///
    /// A section that only exists locally disappears from the log entirely,
    /// together with every edit made to it under any of its ids. For a remote
    /// section its pending option edits are dropped and a `remove` recorded.
    pub fn remove(&mut self, raw: &str) -> bool {
        let Some(section) = self.get(raw) else {
            return false;
        };
        let sid = section.id.clone();
        let unsaved = section.is_unsaved();
        let lineage: HashSet<usize> = self.log.lineage(&sid).into_iter().collect();

        if unsaved {
            let desired: Vec<SectionId> =
                self.view.ids().into_iter().filter(|id| *id != sid).collect();
            self.compact(&desired, |index, _| lineage.contains(&index));
        } else {
            let desired = self.view.ids();
            self.compact(&desired, |index, change| {
                change.is_option_edit() && lineage.contains(&index)
            });
            self.record(Change::Remove { sid });
        }
        true
    }

    /// Drop log entries matching `discard`, rebuild the view, then append
    /// `order` entries until the view has the `desired` section order.
    fn compact(&mut self, desired: &[SectionId], discard: impl Fn(usize, &Change) -> bool) {
        let before = self.log.len();
        self.log.retain(|index, change| !discard(index, change));
        debug!(
            config = %self.name,
            dropped = before - self.log.len(),
            "compacted change log"
        );
        self.rebuild();

        let desired: Vec<&SectionId> = desired.iter().filter(|id| self.view.contains(id)).collect();
        for (index, sid) in desired.into_iter().enumerate() {
            let in_place = self
                .view
                .sections()
                .get(index)
                .is_some_and(|section| &section.id == sid);
            if !in_place {
                self.record(Change::Order {
                    sid: sid.clone(),
                    index,
                });
            }
        }
    }

    /// Stage an option change. `None` or an empty list removes the option.
    /// Setting the value the option already has records nothing.
    pub fn set(&mut self, raw: &str, option: &str, value: Option<OptionValue>) -> bool {
        if !is_valid_name(option) {
            warn!(config = %self.name, option, "invalid option name");
            return false;
        }
        let Some(section) = self.get(raw) else {
            return false;
        };

        let value = value.filter(|v| !v.is_empty_list());
        if section.options.get(option) == value.as_ref() {
            return true;
        }

        let sid = section.id.clone();
        let option = option.to_owned();
        match value {
            Some(value) => self.record(Change::Set { sid, option, value }),
            None => self.record(Change::Unset { sid, option }),
        }
        true
    }

    /// Append one item to a list option, converting a scalar into a list.
    pub fn list_add(&mut self, raw: &str, option: &str, item: &str) -> bool {
        if !is_valid_name(option) {
            return false;
        }
        let Some(sid) = self.resolve(raw) else {
            return false;
        };
        self.record(Change::ListAdd {
            sid,
            option: option.to_owned(),
            item: item.to_owned(),
        });
        true
    }

    /// Remove every occurrence of `item` from a list option.
    pub fn list_del(&mut self, raw: &str, option: &str, item: &str) -> bool {
        let Some(section) = self.get(raw) else {
            return false;
        };
        let present = section
            .options
            .get(option)
            .is_some_and(|value| match value {
                OptionValue::Scalar(s) => s == item,
                OptionValue::List(items) => items.iter().any(|i| i == item),
            });
        if !present {
            return true;
        }
        let sid = section.id.clone();
        self.record(Change::ListDel {
            sid,
            option: option.to_owned(),
            item: item.to_owned(),
        });
        true
    }

    /// Move a section before or after another one, or to the end when no
    /// anchor is given.
    pub fn move_section(&mut self, raw: &str, anchor: Option<&str>, after: bool) -> bool {
        let Some(sid) = self.resolve(raw) else {
            return false;
        };
        let anchor = match anchor {
            Some(anchor) => match self.resolve(anchor) {
                Some(anchor) => Some(anchor),
                None => return false,
            },
            None => None,
        };
        if anchor.as_ref() == Some(&sid) {
            return true;
        }

        let mut order = self.view.ids();
        order.retain(|id| *id != sid);
        let index = match &anchor {
            Some(anchor) => match order.iter().position(|id| id == anchor) {
                Some(position) => position + usize::from(after),
                None => return false,
            },
            None => order.len(),
        };

        if self.view.position(&sid) != Some(index) {
            self.record(Change::Order { sid, index });
        }
        true
    }

    /// Give a section a new name.
    pub fn rename(&mut self, raw: &str, name: &str) -> bool {
        let Some(sid) = self.resolve(raw) else {
            return false;
        };
        if sid.matches(name) {
            return true;
        }
        if !self.name_available(name) {
            warn!(config = %self.name, name, "invalid or duplicate section name");
            return false;
        }
        self.record(Change::Rename {
            sid,
            name: name.to_owned(),
        });
        true
    }

    /// Rename an option, keeping its value and position.
    pub fn rename_option(&mut self, raw: &str, option: &str, name: &str) -> bool {
        let Some(sid) = self.resolve(raw) else {
            return false;
        };
        if !is_valid_name(name) {
            warn!(config = %self.name, name, "invalid option name");
            return false;
        }
        let Some(section) = self.view.get(&sid) else {
            return false;
        };
        if !section.options.contains_key(option) || section.options.contains_key(name) {
            return false;
        }
        self.record(Change::RenameOption {
            sid,
            option: option.to_owned(),
            name: name.to_owned(),
        });
        true
    }

    // ── Flush support ────────────────────────────────────────────────

    /// Hand the whole log to a flush.
    ///
    /// The current view becomes a provisional base, so edits made while the
    /// flush is in flight stack on top of it. Sections the flush creates are
    /// treated as remote from here on.
    pub(crate) fn begin_flush(&mut self) -> InFlight {
        let drained = self.log.drain_front(self.log.len());
        let provisional = self
            .view
            .sections()
            .iter()
            .cloned()
            .map(|mut section| {
                if section.origin.is_none() {
                    section.origin = Some(section.id.to_string());
                }
                section
            })
            .collect();
        let base = std::mem::replace(&mut self.base, ConfigSnapshot::new(provisional));
        self.rebuild();
        InFlight { base, drained }
    }

    /// Undo `begin_flush`: the flushed entries go back ahead of newer ones.
    pub(crate) fn abort_flush(&mut self, flight: InFlight) {
        self.base = flight.base;
        self.log.restore_front(flight.drained);
        self.rebuild();
    }

    /// Install the snapshot read back after a flush and point remaining
    /// entries at the names the router gave to saved placeholders.
    pub(crate) fn finish_flush(
        &mut self,
        base: ConfigSnapshot,
        created: &HashMap<PlaceholderId, String>,
    ) {
        self.resolved
            .extend(created.iter().map(|(p, name)| (*p, name.clone())));
        let resolved = &self.resolved;
        self.log.rebase(|p| resolved.get(&p).cloned());
        self.base = base;
        self.rebuild();
    }

    /// Swap in a fresh remote snapshot, keeping local edits on top.
    pub(crate) fn replace_base(&mut self, base: ConfigSnapshot) {
        self.base = base;
        self.rebuild();
    }
}

/// State parked while a flush is in flight.
#[derive(Debug)]
pub(crate) struct InFlight {
    base: ConfigSnapshot,
    drained: Vec<Change>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Map;
    use startwrt_api::UciSectionData;

    fn empty() -> ConfigOverlay {
        ConfigOverlay::new("firewall", ConfigSnapshot::default())
    }

    fn with_zones() -> ConfigOverlay {
        let mut overlay = empty();
        overlay.add("defaults", None).unwrap();
        overlay.add("zone", Some("lan")).unwrap();
        overlay.add("zone", Some("wan")).unwrap();
        overlay
    }

    /// The zones of `with_zones`, as if loaded from the router.
    fn remote_zones() -> ConfigOverlay {
        let sections = with_zones()
            .view()
            .sections()
            .iter()
            .cloned()
            .map(|mut section| {
                section.origin = Some(section.id.to_string());
                section
            })
            .collect();
        ConfigOverlay::new("firewall", ConfigSnapshot::new(sections))
    }

    fn assert_replay_invariant(overlay: &ConfigOverlay) {
        assert_eq!(&replay(overlay.base(), overlay.log()), overlay.view());
    }

    #[test]
    fn add_then_read_back() {
        let mut overlay = empty();
        let sid = overlay.add("zone", None).unwrap();
        assert!(sid.is_placeholder());
        assert!(overlay.set(&sid.to_string(), "name", Some("guest".into())));

        let section = overlay.get(&sid.to_string()).unwrap();
        assert!(section.anonymous);
        assert_eq!(section.option("name"), Some(&"guest".into()));
        assert_replay_invariant(&overlay);
    }

    #[test]
    fn add_rejects_duplicates_and_invalid_names() {
        let mut overlay = with_zones();
        assert_eq!(overlay.add("zone", Some("lan")), None);
        assert_eq!(overlay.add("zone", Some("bad-name")), None);
        assert_eq!(overlay.add("bad type", None), None);
        assert_eq!(overlay.log().len(), 3);
    }

    #[test]
    fn positional_references_resolve_in_view_order() {
        let overlay = with_zones();
        assert_eq!(
            overlay.resolve("@zone[0]"),
            Some(SectionId::Committed("lan".into()))
        );
        assert_eq!(
            overlay.resolve("@zone[-1]"),
            Some(SectionId::Committed("wan".into()))
        );
        assert_eq!(overlay.resolve("@zone[2]"), None);
        assert_eq!(overlay.resolve("@zone[-3]"), None);
        assert_eq!(overlay.resolve("@forwarding[0]"), None);
    }

    #[test]
    fn removing_unsaved_add_leaves_no_trace() {
        let mut overlay = empty();
        let sid = overlay.add("rule", None).unwrap();
        let raw = sid.to_string();
        overlay.set(&raw, "name", Some("Allow-SSH".into()));
        overlay.rename(&raw, "allow_ssh");

        assert!(overlay.remove("allow_ssh"));
        assert!(!overlay.has_changes());
        assert!(overlay.view().is_empty());
    }

    #[test]
    fn removing_unsaved_add_keeps_other_order() {
        let mut overlay = with_zones();
        let rule = overlay.add("rule", None).unwrap().to_string();
        // Put the rule first, then the defaults after wan.
        overlay.move_section(&rule, Some("@defaults[0]"), false);
        overlay.move_section("@defaults[0]", Some("wan"), true);
        let expected: Vec<SectionId> = overlay
            .view()
            .ids()
            .into_iter()
            .filter(|id| id.to_string() != rule)
            .collect();

        assert!(overlay.remove(&rule));
        assert_eq!(overlay.view().ids(), expected);
        assert!(overlay.log().iter().all(|c| !c.sid().matches(&rule)));
        assert_replay_invariant(&overlay);
    }

    #[test]
    fn removing_remote_section_drops_option_edits() {
        let mut overlay = remote_zones();
        overlay.set("wan", "input", Some("REJECT".into()));
        overlay.set("lan", "input", Some("ACCEPT".into()));

        assert!(overlay.remove("wan"));
        let records = overlay.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sid, "lan");
        assert_eq!(records[1].op.to_string(), "remove");
        assert_eq!(overlay.get("wan"), None);
        assert_replay_invariant(&overlay);
    }

    #[test]
    fn removing_readded_name_keeps_remote_removal() {
        let mut overlay = remote_zones();
        assert!(overlay.remove("lan"));
        overlay.add("zone", Some("lan")).unwrap();
        overlay.set("lan", "input", Some("DROP".into()));
        assert!(overlay.remove("lan"));

        assert_eq!(overlay.get("lan"), None);
        assert!(overlay.view().sections().iter().all(|s| !s.id.matches("lan")));
        let records = overlay.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].op.to_string(), "remove");
        assert_eq!(records[0].sid, "lan");
        assert_replay_invariant(&overlay);
    }

    #[test]
    fn removing_renamed_remote_keeps_edits_of_name_successor() {
        let mut overlay = remote_zones();
        overlay.set("lan", "input", Some("DROP".into()));
        assert!(overlay.rename("lan", "lan_old"));
        assert!(overlay.rename("wan", "lan"));
        overlay.set("lan", "masq", Some("1".into()));

        assert!(overlay.remove("lan_old"));
        assert_eq!(
            overlay.get("lan").unwrap().option("masq"),
            Some(&OptionValue::from("1"))
        );
        assert_replay_invariant(&overlay);
    }

    #[test]
    fn set_none_equals_unset_and_noop_records_nothing() {
        let mut overlay = with_zones();
        overlay.set("lan", "input", Some("ACCEPT".into()));
        let logged = overlay.log().len();

        assert!(overlay.set("lan", "input", Some("ACCEPT".into())));
        assert_eq!(overlay.log().len(), logged);

        let mut via_empty = overlay.clone();
        overlay.set("lan", "input", None);
        via_empty.set("lan", "input", Some(OptionValue::List(Vec::new())));
        assert_eq!(overlay.view(), via_empty.view());
        assert_eq!(overlay.get("lan").unwrap().option("input"), None);
    }

    #[test]
    fn set_rejects_metadata_option_names() {
        let mut overlay = with_zones();
        assert!(!overlay.set("lan", ".name", Some("x".into())));
        assert!(!overlay.set("lan", "", Some("x".into())));
    }

    #[test]
    fn move_after_places_immediately_after_anchor() {
        let mut overlay = with_zones();
        let defaults = overlay.resolve("@defaults[0]").unwrap();
        assert!(overlay.move_section(&defaults.to_string(), Some("lan"), true));
        assert_eq!(
            overlay.view().ids(),
            vec![
                SectionId::Committed("lan".into()),
                defaults,
                SectionId::Committed("wan".into())
            ]
        );
        assert_replay_invariant(&overlay);
    }

    #[test]
    fn move_without_anchor_goes_to_end() {
        let mut overlay = with_zones();
        assert!(overlay.move_section("lan", None, false));
        assert_eq!(overlay.view().sections().last().unwrap().id.to_string(), "lan");
        assert!(!overlay.move_section("ghost", None, false));
        assert!(!overlay.move_section("lan", Some("ghost"), false));
    }

    #[test]
    fn rename_keeps_resolving_new_name() {
        let mut overlay = with_zones();
        assert!(overlay.rename("wan", "wan_zone"));
        assert!(overlay.get("wan").is_none());
        assert!(!overlay.get("wan_zone").unwrap().anonymous);
        assert!(!overlay.rename("lan", "wan_zone"));
    }

    #[test]
    fn rename_option_keeps_value_and_position() {
        let mut overlay = with_zones();
        overlay.set("lan", "input", Some("ACCEPT".into()));
        overlay.set("lan", "output", Some("ACCEPT".into()));
        assert!(overlay.rename_option("lan", "input", "inbound"));
        assert!(!overlay.rename_option("lan", "missing", "other"));
        assert!(!overlay.rename_option("lan", "output", "inbound"));

        let keys: Vec<&String> = overlay.get("lan").unwrap().options.keys().collect();
        assert_eq!(keys, vec!["inbound", "output"]);
        assert_replay_invariant(&overlay);
    }

    #[test]
    fn list_edits_track_items() {
        let mut overlay = with_zones();
        assert!(overlay.list_add("lan", "network", "lan"));
        assert!(overlay.list_add("lan", "network", "guest"));
        assert!(overlay.list_del("lan", "network", "lan"));
        assert_eq!(
            overlay.get("lan").unwrap().option("network"),
            Some(&OptionValue::from(vec!["guest"]))
        );
        assert_replay_invariant(&overlay);
    }

    #[test]
    fn create_sid_never_repeats() {
        let mut overlay = empty();
        let ids: HashSet<SectionId> = (0..256).map(|_| overlay.create_sid()).collect();
        assert_eq!(ids.len(), 256);
    }

    #[test]
    fn placeholders_never_shadow_remote_names() {
        let remote = Section::from_remote(UciSectionData {
            anonymous: false,
            section_type: "host".into(),
            name: "new0000ab".into(),
            index: Some(0),
            options: Map::new(),
        });
        let mut overlay = ConfigOverlay::new("dhcp", ConfigSnapshot::new(vec![remote]));

        let mut tokens = [0xab, 0xac].into_iter();
        let sid = overlay.issue_sid(|| PlaceholderId::from_token(tokens.next().unwrap()));
        assert_eq!(sid.to_string(), "new0000ac");

        assert!(overlay.get("new0000ab").is_some_and(|s| !s.is_unsaved()));
        assert_eq!(overlay.add("host", Some("new0000ad")), None);
        assert!(!overlay.rename("new0000ab", "new000001"));
        assert!(overlay.rename("new0000ab", "printer"));
    }

    #[test]
    fn finished_flush_keeps_old_placeholders_resolving() {
        let mut overlay = empty();
        let sid = overlay.add("zone", None).unwrap();
        let placeholder = sid.as_placeholder().unwrap();

        let mut saved = overlay.view().sections()[0].clone();
        saved.id = SectionId::Committed("cfg0a1b2c".into());
        saved.origin = Some("cfg0a1b2c".into());
        let _flight = overlay.begin_flush();
        overlay.finish_flush(
            ConfigSnapshot::new(vec![saved]),
            &HashMap::from([(placeholder, "cfg0a1b2c".to_owned())]),
        );

        assert!(!overlay.has_changes());
        assert_eq!(
            overlay.resolve(&sid.to_string()),
            Some(SectionId::Committed("cfg0a1b2c".into()))
        );
    }

    #[test]
    fn edits_during_flush_replay_after_abort() {
        let mut overlay = remote_zones();
        overlay.set("lan", "input", Some("ACCEPT".into()));
        let rule = overlay.add("rule", None).unwrap().to_string();

        let flight = overlay.begin_flush();
        assert!(!overlay.has_changes());
        overlay.set(&rule, "name", Some("Allow-DHCP".into()));
        overlay.remove(&rule);
        let during = overlay.view().clone();

        overlay.abort_flush(flight);
        assert_eq!(overlay.view(), &during);
        assert_eq!(overlay.get(&rule), None);
        assert_replay_invariant(&overlay);
    }
}
