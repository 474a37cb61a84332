// ── Flush planning ──
//
// Turns an overlay into the uci calls that bring the router's staged state
// in line with the local view. The calls come from diffing the view against
// the base snapshot, so edits that cancel out never reach the wire.
//
// Calls are ordered so later ones still find what they address: section
// deletes first, then option edits under the remote names, then renames,
// then adds. Renames are sequenced so none targets a name another section
// still holds; a cycle (two sections swapping names) goes through a free
// temporary name. The resulting section order goes out in a second
// request, once the names of added sections are known.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use startwrt_api::UciCall;
use tracing::debug;

use super::config::ConfigOverlay;
use super::snapshot::ConfigSnapshot;
use crate::model::{OptionValue, PlaceholderId, Section, SectionId};

#[derive(Debug, Clone)]
pub(crate) struct FlushPlan {
    pub config: String,
    pub calls: Vec<UciCall>,
    /// Placeholder adds and the index of their call in `calls`.
    pub created: Vec<(usize, PlaceholderId)>,
    /// Section order to send after the calls, if anything was moved.
    pub order: Option<Vec<SectionId>>,
    /// The view the plan was built from.
    pub expected: ConfigSnapshot,
}

impl FlushPlan {
    pub fn compile(overlay: &ConfigOverlay) -> Self {
        let config = overlay.name().to_owned();
        let base = overlay.base();
        let view = overlay.view();

        let mut deletes = Vec::new();
        let mut edits = Vec::new();
        let mut renames = Vec::new();
        let mut adds = Vec::new();
        let mut placeholders = Vec::new();

        for remote in base.sections() {
            let name = remote_name(remote);
            if view.by_origin(&name).is_none() {
                deletes.push(UciCall::Delete {
                    config: config.clone(),
                    section: name,
                    options: None,
                });
            }
        }

        for section in view.sections() {
            let Some(origin) = &section.origin else {
                if let Some(placeholder) = section.id.as_placeholder() {
                    placeholders.push((adds.len(), placeholder));
                }
                adds.push(UciCall::Add {
                    config: config.clone(),
                    section_type: section.section_type.clone(),
                    name: section.id.as_committed().map(str::to_owned),
                    values: to_values(section.options.iter()),
                });
                continue;
            };

            if let Some(remote) = base.by_origin(origin) {
                let changed = section
                    .options
                    .iter()
                    .filter(|(key, value)| remote.options.get(*key) != Some(*value));
                let values = to_values(changed);
                if !values.is_empty() {
                    edits.push(UciCall::Set {
                        config: config.clone(),
                        section: origin.clone(),
                        values,
                    });
                }

                let removed: Vec<String> = remote
                    .options
                    .keys()
                    .filter(|key| !section.options.contains_key(*key))
                    .cloned()
                    .collect();
                if !removed.is_empty() {
                    edits.push(UciCall::Delete {
                        config: config.clone(),
                        section: origin.clone(),
                        options: Some(removed),
                    });
                }
            }

            if !section.id.matches(origin) {
                renames.push((origin.clone(), section.id.to_string()));
            }
        }

        let taken: HashSet<String> = base
            .sections()
            .iter()
            .map(remote_name)
            .chain(view.sections().iter().map(|s| s.id.to_string()))
            .collect();
        let mut renames = sequence_renames(&config, renames, &taken);

        let offset = deletes.len() + edits.len() + renames.len();
        let created = placeholders
            .into_iter()
            .map(|(index, placeholder)| (offset + index, placeholder))
            .collect();

        let mut calls = deletes;
        calls.append(&mut edits);
        calls.append(&mut renames);
        calls.append(&mut adds);

        Self {
            config,
            calls,
            created,
            order: overlay.log().has_reorder().then(|| view.ids()),
            expected: view.clone(),
        }
    }

    /// The `order` call for the planned section order, with placeholders
    /// replaced by the names the router assigned.
    pub fn order_call(&self, names: &HashMap<PlaceholderId, String>) -> Option<UciCall> {
        let order = self.order.as_ref()?;
        let sections = order
            .iter()
            .map(|sid| match sid.as_placeholder().and_then(|p| names.get(&p)) {
                Some(name) => name.clone(),
                None => sid.to_string(),
            })
            .collect();
        Some(UciCall::Order {
            config: self.config.clone(),
            sections,
        })
    }

    /// What the router should hold once every call succeeded. Used when the
    /// configuration cannot be read back after a save.
    pub fn assumed_snapshot(&self, names: &HashMap<PlaceholderId, String>) -> ConfigSnapshot {
        let sections = self
            .expected
            .sections()
            .iter()
            .cloned()
            .map(|mut section| {
                if let Some(name) = section.id.as_placeholder().and_then(|p| names.get(&p)) {
                    section.id = SectionId::Committed(name.clone());
                }
                section.origin = Some(section.id.to_string());
                section
            })
            .collect();
        ConfigSnapshot::new(sections)
    }
}

/// Order `(from, to)` section renames so each target is free when its call
/// runs. When every remaining target is still held, the renames form a
/// cycle and one section moves to a temporary name first.
fn sequence_renames(
    config: &str,
    mut pending: Vec<(String, String)>,
    taken: &HashSet<String>,
) -> Vec<UciCall> {
    let rename = |from: String, to: String| UciCall::Rename {
        config: config.to_owned(),
        section: from,
        option: None,
        name: to,
    };

    let mut calls = Vec::with_capacity(pending.len());
    let mut parked_names = HashSet::new();
    while !pending.is_empty() {
        let ready = pending
            .iter()
            .position(|(_, to)| pending.iter().all(|(from, _)| from != to));
        if let Some(index) = ready {
            let (from, to) = pending.remove(index);
            calls.push(rename(from, to));
            continue;
        }

        let Some((from, to)) = pending.first_mut() else {
            break;
        };
        let parked = (1u32..)
            .map(|n| format!("{to}_{n}"))
            .find(|candidate| !taken.contains(candidate) && !parked_names.contains(candidate))
            .unwrap_or_default();
        parked_names.insert(parked.clone());
        debug!(config, section = %from, parked = %parked, "breaking rename cycle");
        calls.push(rename(std::mem::replace(from, parked.clone()), parked));
    }
    calls
}

fn remote_name(section: &Section) -> String {
    section
        .origin
        .clone()
        .unwrap_or_else(|| section.id.to_string())
}

fn to_values<'a>(options: impl Iterator<Item = (&'a String, &'a OptionValue)>) -> Map<String, Value> {
    options
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn remote(name: &str, section_type: &str, options: &[(&str, &str)]) -> Section {
        let mut section = Section::created(
            SectionId::Committed(name.into()),
            section_type.into(),
            false,
        );
        for (key, value) in options {
            section
                .options
                .insert((*key).to_owned(), OptionValue::from(*value));
        }
        section.origin = Some(name.into());
        section
    }

    fn firewall() -> ConfigOverlay {
        ConfigOverlay::new(
            "firewall",
            ConfigSnapshot::new(vec![
                remote("lan", "zone", &[("input", "ACCEPT"), ("forward", "ACCEPT")]),
                remote("wan", "zone", &[("input", "REJECT")]),
                remote("cfg0a0b0c", "rule", &[("name", "Allow-Ping")]),
            ]),
        )
    }

    #[test]
    fn untouched_overlay_plans_nothing() {
        let plan = FlushPlan::compile(&firewall());
        assert!(plan.calls.is_empty());
        assert!(plan.order.is_none());
    }

    #[test]
    fn option_edits_become_set_and_delete() {
        let mut overlay = firewall();
        overlay.set("lan", "input", Some("REJECT".into()));
        overlay.set("lan", "forward", None);
        overlay.set("lan", "network", Some(vec!["lan"].into()));

        let plan = FlushPlan::compile(&overlay);
        assert_eq!(
            plan.calls,
            vec![
                UciCall::Set {
                    config: "firewall".into(),
                    section: "lan".into(),
                    values: json!({ "input": "REJECT", "network": ["lan"] })
                        .as_object()
                        .unwrap()
                        .clone(),
                },
                UciCall::Delete {
                    config: "firewall".into(),
                    section: "lan".into(),
                    options: Some(vec!["forward".into()]),
                },
            ]
        );
    }

    #[test]
    fn add_carries_values_and_is_tracked() {
        let mut overlay = firewall();
        let sid = overlay.add("rule", None).unwrap();
        overlay.set(&sid.to_string(), "name", Some("Allow-SSH".into()));
        overlay.add("zone", Some("guest")).unwrap();

        let plan = FlushPlan::compile(&overlay);
        assert_eq!(plan.calls.len(), 2);
        assert_eq!(plan.created, vec![(0, sid.as_placeholder().unwrap())]);
        match &plan.calls[1] {
            UciCall::Add { name, .. } => assert_eq!(name.as_deref(), Some("guest")),
            other => panic!("expected add, got {other:?}"),
        }
    }

    #[test]
    fn deletes_precede_renames_and_adds() {
        let mut overlay = firewall();
        overlay.remove("wan");
        overlay.rename("cfg0a0b0c", "allow_ping");
        overlay.add("zone", Some("wan")).unwrap();

        let plan = FlushPlan::compile(&overlay);
        let methods: Vec<&str> = plan
            .calls
            .iter()
            .map(|c| c.prepare().procedure.method)
            .collect();
        assert_eq!(methods, vec!["delete", "rename", "add"]);
    }

    #[test]
    fn renames_wait_for_their_target_name() {
        let mut overlay = firewall();
        overlay.rename("wan", "wan_old");
        overlay.rename("lan", "wan");

        let plan = FlushPlan::compile(&overlay);
        let renames: Vec<(String, String)> = plan
            .calls
            .iter()
            .filter_map(|call| match call {
                UciCall::Rename { section, name, .. } => Some((section.clone(), name.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            renames,
            vec![
                ("wan".to_owned(), "wan_old".to_owned()),
                ("lan".to_owned(), "wan".to_owned())
            ]
        );
    }

    #[test]
    fn swapped_names_go_through_a_free_name() {
        let mut overlay = firewall();
        overlay.rename("lan", "lan_1");
        overlay.rename("wan", "lan");
        overlay.rename("lan_1", "wan");

        let plan = FlushPlan::compile(&overlay);
        let renames: Vec<(String, String)> = plan
            .calls
            .iter()
            .filter_map(|call| match call {
                UciCall::Rename { section, name, .. } => Some((section.clone(), name.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            renames,
            vec![
                ("lan".to_owned(), "wan_1".to_owned()),
                ("wan".to_owned(), "lan".to_owned()),
                ("wan_1".to_owned(), "wan".to_owned())
            ]
        );
    }

    #[test]
    fn order_maps_placeholders_to_assigned_names() {
        let mut overlay = firewall();
        let sid = overlay.add("rule", None).unwrap();
        overlay.move_section(&sid.to_string(), Some("lan"), false);

        let plan = FlushPlan::compile(&overlay);
        let names = HashMap::from([(sid.as_placeholder().unwrap(), "cfg1d2e3f".to_owned())]);
        assert_eq!(
            plan.order_call(&names),
            Some(UciCall::Order {
                config: "firewall".into(),
                sections: vec![
                    "cfg1d2e3f".into(),
                    "lan".into(),
                    "wan".into(),
                    "cfg0a0b0c".into()
                ],
            })
        );

        let assumed = plan.assumed_snapshot(&names);
        assert_eq!(assumed.sections()[0].origin.as_deref(), Some("cfg1d2e3f"));
    }
}
