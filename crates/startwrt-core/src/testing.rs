// In-memory stand-in for rpcd's uci object, used by the overlay tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use startwrt_api::{Error, UbusStatus, UciCall, UciSectionData};
use tokio::sync::Notify;

use crate::backend::UciBackend;

#[derive(Debug, Clone)]
struct StoredSection {
    name: String,
    section_type: String,
    anonymous: bool,
    options: Map<String, Value>,
}

/// Pauses the first batch until the test releases it.
#[derive(Debug, Clone, Default)]
pub(crate) struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[derive(Debug, Default)]
struct MemoryState {
    configs: BTreeMap<String, Vec<StoredSection>>,
    next_anonymous: u32,
    batches: Vec<Vec<UciCall>>,
    failing_methods: HashMap<&'static str, UbusStatus>,
    unreachable: bool,
    failing_reads: bool,
    applied: Vec<(u64, bool)>,
    apply_status: Option<UbusStatus>,
    confirms: usize,
    confirm_after: usize,
    reverted: Vec<String>,
    pending: Map<String, Value>,
}

#[derive(Debug, Default)]
pub(crate) struct MemoryBackend {
    state: Mutex<MemoryState>,
    gate: Mutex<Option<Gate>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_config(self, config: &str, sections: &[(&str, &str, &[(&str, &str)])]) -> Self {
        let stored = sections
            .iter()
            .map(|(name, section_type, options)| StoredSection {
                name: (*name).to_owned(),
                section_type: (*section_type).to_owned(),
                anonymous: name.starts_with("cfg"),
                options: options
                    .iter()
                    .map(|(k, v)| ((*k).to_owned(), Value::String((*v).to_owned())))
                    .collect(),
            })
            .collect();
        self.state().configs.insert(config.to_owned(), stored);
        self
    }

    pub fn with_gate(self, gate: Gate) -> Self {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(gate);
        self
    }

    pub fn fail_method(&self, method: &'static str, status: UbusStatus) {
        self.state().failing_methods.insert(method, status);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Make `get` fail while batches still go through.
    pub fn fail_reads(&self, failing: bool) {
        self.state().failing_reads = failing;
    }

    pub fn set_apply_status(&self, status: UbusStatus) {
        self.state().apply_status = Some(status);
    }

    /// Let `confirm` fail this many times before it succeeds.
    pub fn confirm_after(&self, attempts: usize) {
        self.state().confirm_after = attempts;
    }

    pub fn set_pending(&self, pending: Value) {
        if let Value::Object(map) = pending {
            self.state().pending = map;
        }
    }

    pub fn batches(&self) -> Vec<Vec<UciCall>> {
        self.state().batches.clone()
    }

    pub fn applied(&self) -> Vec<(u64, bool)> {
        self.state().applied.clone()
    }

    pub fn confirms(&self) -> usize {
        self.state().confirms
    }

    pub fn reverted(&self) -> Vec<String> {
        self.state().reverted.clone()
    }

    /// Section names of `config` in stored order.
    pub fn names(&self, config: &str) -> Vec<String> {
        self.state()
            .configs
            .get(config)
            .map(|sections| sections.iter().map(|s| s.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn option(&self, config: &str, section: &str, option: &str) -> Option<Value> {
        self.state()
            .configs
            .get(config)?
            .iter()
            .find(|s| s.name == section)?
            .options
            .get(option)
            .cloned()
    }

    fn unreachable_error() -> Error {
        Error::Http {
            status: 502,
            body: "Bad Gateway".into(),
        }
    }
}

fn rejected(method: &str, status: UbusStatus) -> Error {
    Error::Ubus {
        object: "uci".into(),
        method: method.into(),
        status,
    }
}

impl MemoryState {
    fn execute(&mut self, call: &UciCall) -> Result<Value, Error> {
        let method = call.prepare().procedure.method;
        if let Some(status) = self.failing_methods.get(method) {
            return Err(rejected(method, *status));
        }
        let not_found = || rejected(method, UbusStatus::NotFound);

        let next_anonymous = &mut self.next_anonymous;
        let sections = self
            .configs
            .get_mut(call.config())
            .ok_or_else(not_found)?;

        match call {
            UciCall::Add {
                section_type,
                name,
                values,
                ..
            } => {
                if name
                    .as_ref()
                    .is_some_and(|n| sections.iter().any(|s| &s.name == n))
                {
                    return Err(rejected(method, UbusStatus::InvalidArgument));
                }
                let anonymous = name.is_none();
                let name = name.clone().unwrap_or_else(|| {
                    *next_anonymous += 1;
                    format!("cfg{:06x}", 0x0a_0000 + *next_anonymous)
                });
                sections.push(StoredSection {
                    name: name.clone(),
                    section_type: section_type.clone(),
                    anonymous,
                    options: values.clone(),
                });
                Ok(Value::String(name))
            }
            UciCall::Set {
                section, values, ..
            } => {
                let stored = sections
                    .iter_mut()
                    .find(|s| &s.name == section)
                    .ok_or_else(not_found)?;
                for (key, value) in values {
                    stored.options.insert(key.clone(), value.clone());
                }
                Ok(Value::Null)
            }
            UciCall::Delete {
                section, options, ..
            } => {
                let position = sections
                    .iter()
                    .position(|s| &s.name == section)
                    .ok_or_else(not_found)?;
                match options {
                    None => {
                        sections.remove(position);
                    }
                    Some(options) => {
                        if let Some(stored) = sections.get_mut(position) {
                            for option in options {
                                stored.options.remove(option);
                            }
                        }
                    }
                }
                Ok(Value::Null)
            }
            UciCall::Rename {
                section,
                option,
                name,
                ..
            } => {
                if option.is_none() && sections.iter().any(|s| &s.name == name) {
                    return Err(rejected(method, UbusStatus::InvalidArgument));
                }
                let stored = sections
                    .iter_mut()
                    .find(|s| &s.name == section)
                    .ok_or_else(not_found)?;
                match option {
                    None => {
                        stored.name.clone_from(name);
                        stored.anonymous = false;
                    }
                    Some(option) => {
                        if let Some(value) = stored.options.remove(option) {
                            stored.options.insert(name.clone(), value);
                        }
                    }
                }
                Ok(Value::Null)
            }
            UciCall::Order {
                sections: order, ..
            } => {
                let mut reordered = Vec::with_capacity(sections.len());
                for name in order {
                    if let Some(position) = sections.iter().position(|s| &s.name == name) {
                        reordered.push(sections.remove(position));
                    }
                }
                reordered.append(sections);
                *sections = reordered;
                Ok(Value::Null)
            }
        }
    }
}

impl UciBackend for MemoryBackend {
    async fn get(&self, config: &str) -> Result<Vec<UciSectionData>, Error> {
        let state = self.state();
        if state.unreachable || state.failing_reads {
            return Err(Self::unreachable_error());
        }
        let sections = state
            .configs
            .get(config)
            .ok_or_else(|| rejected("get", UbusStatus::NotFound))?;
        Ok(sections
            .iter()
            .zip(0u64..)
            .map(|(s, index)| UciSectionData {
                anonymous: s.anonymous,
                section_type: s.section_type.clone(),
                name: s.name.clone(),
                index: Some(index),
                options: s.options.clone(),
            })
            .collect())
    }

    async fn batch(&self, calls: &[UciCall]) -> Result<Vec<Result<Value, Error>>, Error> {
        let gate = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let mut state = self.state();
        state.batches.push(calls.to_vec());
        if state.unreachable {
            return Err(Self::unreachable_error());
        }
        Ok(calls.iter().map(|call| state.execute(call)).collect())
    }

    async fn changes(&self) -> Result<Map<String, Value>, Error> {
        Ok(self.state().pending.clone())
    }

    async fn revert(&self, config: &str) -> Result<(), Error> {
        let mut state = self.state();
        state.reverted.push(config.to_owned());
        state.pending.remove(config);
        Ok(())
    }

    async fn apply(&self, timeout: u64, rollback: bool) -> Result<UbusStatus, Error> {
        let mut state = self.state();
        state.applied.push((timeout, rollback));
        Ok(state.apply_status.unwrap_or(UbusStatus::Ok))
    }

    async fn confirm(&self) -> Result<UbusStatus, Error> {
        let mut state = self.state();
        state.confirms += 1;
        if state.confirms > state.confirm_after {
            Ok(UbusStatus::Ok)
        } else {
            Err(Self::unreachable_error())
        }
    }

    async fn rollback(&self) -> Result<UbusStatus, Error> {
        Ok(UbusStatus::Ok)
    }
}
