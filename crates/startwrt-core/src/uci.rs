// ── UCI overlay store ──
//
// `Uci` caches loaded configurations and the local edits made to them.
// Reads and edits are synchronous and only touch the cache; `load`, `save`
// and the apply family talk to the router. Flushing operations queue behind
// a single async latch so two saves never interleave, while edits keep
// flowing into the log during a flush.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::Value;
use startwrt_api::{UbusStatus, UciCall, UciSectionData};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::UciBackend;
use crate::error::CoreError;
use crate::model::{Change, ChangeRecord, OptionValue, PlaceholderId, Section, SectionId};
use crate::overlay::config::InFlight;
use crate::overlay::plan::FlushPlan;
use crate::overlay::{ConfigOverlay, ConfigSnapshot};

/// Rollback window used when `apply` is given less than a second.
pub const DEFAULT_APPLY_TIMEOUT: u64 = 10;

const CONFIRM_DELAY: Duration = Duration::from_secs(1);
const CONFIRM_INTERVAL: Duration = Duration::from_millis(250);

type Configs = BTreeMap<String, ConfigOverlay>;

/// Optimistic view of the router's UCI configurations.
///
/// Cheap to clone; clones share the same cache and flush latch.
pub struct Uci<B: UciBackend> {
    inner: Arc<UciInner<B>>,
}

struct UciInner<B> {
    backend: B,
    configs: RwLock<Configs>,
    flush: Mutex<()>,
}

impl<B: UciBackend> Clone for Uci<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: UciBackend> Uci<B> {
    pub fn new(backend: B) -> Self {
        Self {
            inner: Arc::new(UciInner {
                backend,
                configs: RwLock::new(BTreeMap::new()),
                flush: Mutex::new(()),
            }),
        }
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    fn read<R>(&self, f: impl FnOnce(&Configs) -> R) -> R {
        let configs = self
            .inner
            .configs
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&configs)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Configs) -> R) -> R {
        let mut configs = self
            .inner
            .configs
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut configs)
    }

    fn with_config<R>(&self, config: &str, f: impl FnOnce(&ConfigOverlay) -> R) -> Option<R> {
        self.read(|configs| configs.get(config).map(f))
    }

    fn with_config_mut<R>(
        &self,
        config: &str,
        f: impl FnOnce(&mut ConfigOverlay) -> R,
    ) -> Option<R> {
        let result = self.write(|configs| configs.get_mut(config).map(f));
        if result.is_none() {
            debug!(config, "configuration not loaded");
        }
        result
    }

    // ── Loading ──────────────────────────────────────────────────────

    pub fn is_loaded(&self, config: &str) -> bool {
        self.read(|configs| configs.contains_key(config))
    }

    /// Names of the loaded configurations.
    pub fn loaded(&self) -> Vec<String> {
        self.read(|configs| configs.keys().cloned().collect())
    }

    /// Fetch configurations that are not cached yet.
    ///
    /// Failures are logged and the configuration stays unloaded; the
    /// returned list holds every requested configuration that is loaded
    /// afterwards.
    pub async fn load(&self, configs: &[&str]) -> Vec<String> {
        let mut loaded = Vec::with_capacity(configs.len());
        for &config in configs {
            if !self.is_loaded(config) {
                match self.inner.backend.get(config).await {
                    Ok(sections) => {
                        let snapshot = snapshot_from(sections);
                        debug!(config, sections = snapshot.len(), "loaded uci config");
                        self.write(|cache| {
                            cache
                                .entry(config.to_owned())
                                .or_insert_with(|| ConfigOverlay::new(config, snapshot));
                        });
                    }
                    Err(e) => {
                        let err = CoreError::from(e);
                        warn!(config, error = %err, "failed to load uci config");
                        continue;
                    }
                }
            }
            loaded.push(config.to_owned());
        }
        loaded
    }

    /// Drop cached configurations together with their pending edits.
    pub fn unload(&self, configs: &[&str]) {
        self.write(|cache| {
            for config in configs {
                if let Some(overlay) = cache.remove(*config) {
                    if overlay.has_changes() {
                        warn!(config, "discarding unsaved changes");
                    }
                }
            }
        });
    }

    // ── Section ids ──────────────────────────────────────────────────

    /// A fresh placeholder id for `config`.
    pub fn create_sid(&self, config: &str) -> Option<SectionId> {
        self.with_config_mut(config, ConfigOverlay::create_sid)
    }

    /// The current id of a section given as a raw id, a saved placeholder,
    /// or an `@type[index]` reference.
    pub fn resolve_sid(&self, config: &str, sid: &str) -> Option<SectionId> {
        self.with_config(config, |overlay| overlay.resolve(sid))
            .flatten()
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Sections of `config` in order, optionally limited to one type.
    pub fn sections(&self, config: &str, section_type: Option<&str>) -> Vec<Section> {
        self.with_config(config, |overlay| overlay.sections(section_type))
            .unwrap_or_default()
    }

    pub fn get(&self, config: &str, sid: &str) -> Option<Section> {
        self.with_config(config, |overlay| overlay.get(sid).cloned())
            .flatten()
    }

    /// One option of a section. Metadata keys like `.type` are answered too.
    pub fn get_option(&self, config: &str, sid: &str, option: &str) -> Option<OptionValue> {
        self.with_config(config, |overlay| {
            overlay.get(sid).and_then(|section| section.value(option))
        })
        .flatten()
    }

    /// The first section of `section_type`, or of any type.
    pub fn get_first(&self, config: &str, section_type: Option<&str>) -> Option<Section> {
        self.with_config(config, |overlay| overlay.get_first(section_type).cloned())
            .flatten()
    }

    pub fn get_first_option(
        &self,
        config: &str,
        section_type: Option<&str>,
        option: &str,
    ) -> Option<OptionValue> {
        self.with_config(config, |overlay| {
            overlay
                .get_first(section_type)
                .and_then(|section| section.value(option))
        })
        .flatten()
    }

    // ── Edits ────────────────────────────────────────────────────────

    /// Stage a new section, named or with a placeholder id.
    pub fn add(&self, config: &str, section_type: &str, name: Option<&str>) -> Option<SectionId> {
        self.with_config_mut(config, |overlay| overlay.add(section_type, name))
            .flatten()
    }

    pub fn remove(&self, config: &str, sid: &str) -> bool {
        self.with_config_mut(config, |overlay| overlay.remove(sid))
            .unwrap_or(false)
    }

    /// Stage an option value. `None` or an empty list removes the option.
    pub fn set(&self, config: &str, sid: &str, option: &str, value: Option<OptionValue>) -> bool {
        self.with_config_mut(config, |overlay| overlay.set(sid, option, value))
            .unwrap_or(false)
    }

    pub fn unset(&self, config: &str, sid: &str, option: &str) -> bool {
        self.set(config, sid, option, None)
    }

    /// `set` on the first section of `section_type` (or of any type).
    pub fn set_first(
        &self,
        config: &str,
        section_type: Option<&str>,
        option: &str,
        value: Option<OptionValue>,
    ) -> bool {
        self.with_config_mut(config, |overlay| {
            let Some(sid) = overlay.get_first(section_type).map(|s| s.id.to_string()) else {
                return false;
            };
            overlay.set(&sid, option, value)
        })
        .unwrap_or(false)
    }

    pub fn unset_first(&self, config: &str, section_type: Option<&str>, option: &str) -> bool {
        self.set_first(config, section_type, option, None)
    }

    /// Append an item to a list option.
    pub fn list_add(&self, config: &str, sid: &str, option: &str, item: &str) -> bool {
        self.with_config_mut(config, |overlay| overlay.list_add(sid, option, item))
            .unwrap_or(false)
    }

    /// Remove an item from a list option.
    pub fn list_del(&self, config: &str, sid: &str, option: &str, item: &str) -> bool {
        self.with_config_mut(config, |overlay| overlay.list_del(sid, option, item))
            .unwrap_or(false)
    }

    /// Move `sid` right before `anchor`, right after it when `after` is set,
    /// or to the end when there is no anchor.
    pub fn move_section(&self, config: &str, sid: &str, anchor: Option<&str>, after: bool) -> bool {
        self.with_config_mut(config, |overlay| overlay.move_section(sid, anchor, after))
            .unwrap_or(false)
    }

    pub fn rename(&self, config: &str, sid: &str, name: &str) -> bool {
        self.with_config_mut(config, |overlay| overlay.rename(sid, name))
            .unwrap_or(false)
    }

    pub fn rename_option(&self, config: &str, sid: &str, option: &str, name: &str) -> bool {
        self.with_config_mut(config, |overlay| overlay.rename_option(sid, option, name))
            .unwrap_or(false)
    }

    /// Pending local change records of every configuration that has any.
    pub fn changes(&self) -> BTreeMap<String, Vec<ChangeRecord>> {
        self.read(|configs| {
            configs
                .iter()
                .filter(|(_, overlay)| overlay.has_changes())
                .map(|(name, overlay)| (name.clone(), overlay.records()))
                .collect()
        })
    }

    // ── Saving ───────────────────────────────────────────────────────

    /// Push pending edits of all loaded configurations to the router.
    ///
    /// All writes go out in one batch; section order follows in a second one
    /// when something was moved. Saved configurations are read back so
    /// placeholders pick up their assigned names. When every call of a
    /// configuration is rejected, or the request fails outright, its edits
    /// stay pending. A partly applied configuration is read back as the
    /// router has it (or taken to match the plan when the read fails) and
    /// the error reported.
    pub async fn save(&self) -> Result<Vec<String>, CoreError> {
        let _flush = self.inner.flush.lock().await;

        let flights: Vec<(FlushPlan, InFlight)> = self.write(|configs| {
            configs
                .values_mut()
                .filter(|overlay| overlay.has_changes())
                .map(|overlay| (FlushPlan::compile(overlay), overlay.begin_flush()))
                .collect()
        });
        if flights.is_empty() {
            debug!("nothing to save");
            return Ok(Vec::new());
        }

        let calls: Vec<UciCall> = flights
            .iter()
            .flat_map(|(plan, _)| plan.calls.iter().cloned())
            .collect();
        info!(
            configs = flights.len(),
            calls = calls.len(),
            "saving uci changes"
        );

        let sent = if calls.is_empty() {
            // Edits cancelled out; only the section order may be left.
            Ok(Vec::new())
        } else {
            self.inner.backend.batch(&calls).await
        };
        let replies = match sent {
            Ok(replies) => replies,
            Err(e) => {
                let err = CoreError::from(e);
                warn!(error = %err, "save request failed, keeping changes");
                self.write(|configs| {
                    for (plan, flight) in flights {
                        if let Some(overlay) = configs.get_mut(&plan.config) {
                            overlay.abort_flush(flight);
                        }
                    }
                });
                return Err(err);
            }
        };

        let mut replies = replies.into_iter();
        let mut flushed: Vec<Flushed> = flights
            .into_iter()
            .map(|(plan, flight)| {
                let replies: Vec<_> = replies.by_ref().take(plan.calls.len()).collect();
                Flushed::new(plan, flight, &replies)
            })
            .collect();

        self.send_order(&mut flushed).await;

        for entry in &mut flushed {
            if !matches!(entry.outcome, Outcome::Rejected(_)) {
                entry.reloaded = match self.inner.backend.get(&entry.plan.config).await {
                    Ok(sections) => Some(snapshot_from(sections)),
                    Err(e) => {
                        let err = CoreError::from(e);
                        warn!(config = %entry.plan.config, error = %err, "failed to reload saved config");
                        None
                    }
                };
            }
        }

        let (saved, errors) = self.write(|configs| settle(configs, flushed));
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => {
                info!(configs = ?saved, "saved uci changes");
                Ok(saved)
            }
        }
    }

    /// Second phase of a save: section order, now that added sections have
    /// names.
    async fn send_order(&self, flushed: &mut [Flushed]) {
        let pending: Vec<(usize, UciCall)> = flushed
            .iter()
            .enumerate()
            .filter(|(_, entry)| matches!(entry.outcome, Outcome::Saved))
            .filter_map(|(index, entry)| {
                entry
                    .plan
                    .order_call(&entry.names)
                    .map(|call| (index, call))
            })
            .collect();
        if pending.is_empty() {
            return;
        }

        let calls: Vec<UciCall> = pending.iter().map(|(_, call)| call.clone()).collect();
        debug!(calls = calls.len(), "saving section order");
        match self.inner.backend.batch(&calls).await {
            Ok(replies) => {
                for ((index, _), reply) in pending.iter().zip(replies) {
                    if let (Err(e), Some(entry)) = (reply, flushed.get_mut(*index)) {
                        entry.outcome = Outcome::Partial(CoreError::SaveFailed {
                            config: entry.plan.config.clone(),
                            failed: 1,
                            total: 1,
                            status: e.status().unwrap_or(UbusStatus::UnknownError),
                        });
                    }
                }
            }
            Err(e) => {
                let err = CoreError::from(e);
                warn!(error = %err, "saving section order failed");
                for (index, _) in &pending {
                    if let Some(entry) = flushed.get_mut(*index) {
                        entry.outcome = Outcome::Partial(CoreError::Network {
                            message: format!(
                                "section order of '{}' not saved: {err}",
                                entry.plan.config
                            ),
                        });
                    }
                }
            }
        }
    }

    // ── Apply / confirm / rollback ───────────────────────────────────

    /// Commit saved changes on the router with a rollback timer.
    ///
    /// Unless [`confirm`](Self::confirm) follows within `timeout` seconds
    /// the router reverts. Values below 1 mean the default of 10 seconds.
    pub async fn apply(&self, timeout: u64) -> Result<(), CoreError> {
        let _flush = self.inner.flush.lock().await;
        self.start_apply(timeout).await.map(|_| ())
    }

    /// `apply`, then keep confirming until the router accepts or the
    /// rollback window closes.
    pub async fn apply_and_confirm(&self, timeout: u64) -> Result<(), CoreError> {
        let _flush = self.inner.flush.lock().await;
        let timeout = self.start_apply(timeout).await?;
        let deadline = Instant::now() + Duration::from_secs(timeout);

        tokio::time::sleep(CONFIRM_DELAY).await;
        loop {
            match self.inner.backend.confirm().await {
                Ok(UbusStatus::Ok) => {
                    info!("apply confirmed");
                    return Ok(());
                }
                Ok(status) => debug!(%status, "confirm not accepted yet"),
                Err(e) => debug!(error = %e, "confirm attempt failed"),
            }
            if Instant::now() + CONFIRM_INTERVAL >= deadline {
                warn!(timeout, "apply not confirmed in time");
                return Err(CoreError::ConfirmTimeout {
                    timeout_secs: timeout,
                });
            }
            tokio::time::sleep(CONFIRM_INTERVAL).await;
        }
    }

    async fn start_apply(&self, timeout: u64) -> Result<u64, CoreError> {
        let timeout = if timeout < 1 {
            DEFAULT_APPLY_TIMEOUT
        } else {
            timeout
        };
        let unsaved = self.read(|configs| configs.values().filter(|o| o.has_changes()).count());
        if unsaved > 0 {
            warn!(configs = unsaved, "applying while local changes are unsaved");
        }

        info!(timeout, "applying uci changes");
        let status = self.inner.backend.apply(timeout, true).await?;
        ensure_ok("uci.apply", status)?;
        Ok(timeout)
    }

    /// Confirm a pending apply so the router keeps it.
    pub async fn confirm(&self) -> Result<(), CoreError> {
        let _flush = self.inner.flush.lock().await;
        let status = self.inner.backend.confirm().await?;
        ensure_ok("uci.confirm", status)
    }

    /// Roll a pending apply back right away.
    pub async fn rollback(&self) -> Result<(), CoreError> {
        let _flush = self.inner.flush.lock().await;
        info!("rolling back uci apply");
        let status = self.inner.backend.rollback().await?;
        ensure_ok("uci.rollback", status)
    }

    // ── Router-side changes ──────────────────────────────────────────

    /// Changes saved on the router but not yet applied, per configuration.
    ///
    /// Every record must decode to a change the reducer understands, so a
    /// reply rpcd would not produce is reported instead of shown half-read.
    pub async fn remote_changes(&self) -> Result<BTreeMap<String, Vec<ChangeRecord>>, CoreError> {
        let pending = self.inner.backend.changes().await?;
        pending
            .into_iter()
            .map(|(config, records)| {
                let records: Vec<ChangeRecord> =
                    serde_json::from_value(records).map_err(|e| CoreError::InvalidChange {
                        message: format!("changes of '{config}': {e}"),
                    })?;
                for record in &records {
                    Change::from_record(record).map_err(|e| CoreError::InvalidChange {
                        message: format!("changes of '{config}': {e}"),
                    })?;
                }
                Ok((config, records))
            })
            .collect()
    }

    /// Discard the router's saved changes of `config` and reload it if
    /// loaded. Local edits stay pending on top of the fresh snapshot.
    pub async fn revert(&self, config: &str) -> Result<(), CoreError> {
        let _flush = self.inner.flush.lock().await;
        info!(config, "reverting saved changes");
        self.inner.backend.revert(config).await?;

        if self.is_loaded(config) {
            let snapshot = snapshot_from(self.inner.backend.get(config).await?);
            self.with_config_mut(config, |overlay| overlay.replace_base(snapshot));
        }
        Ok(())
    }
}

// ── Save bookkeeping ─────────────────────────────────────────────────

enum Outcome {
    Saved,
    /// Nothing reached the router; edits stay pending.
    Rejected(CoreError),
    /// Some calls went through.
    Partial(CoreError),
}

struct Flushed {
    plan: FlushPlan,
    flight: InFlight,
    names: HashMap<PlaceholderId, String>,
    outcome: Outcome,
    reloaded: Option<ConfigSnapshot>,
}

impl Flushed {
    fn new(
        plan: FlushPlan,
        flight: InFlight,
        replies: &[Result<Value, startwrt_api::Error>],
    ) -> Self {
        let names = plan
            .created
            .iter()
            .filter_map(|(index, placeholder)| match replies.get(*index) {
                Some(Ok(Value::String(name))) => Some((*placeholder, name.clone())),
                _ => None,
            })
            .collect();

        let failures: Vec<&startwrt_api::Error> =
            replies.iter().filter_map(|r| r.as_ref().err()).collect();
        let outcome = match failures.first() {
            None if replies.len() == plan.calls.len() => Outcome::Saved,
            first => {
                let status = first
                    .and_then(|e| e.status())
                    .unwrap_or(UbusStatus::UnknownError);
                let err = CoreError::SaveFailed {
                    config: plan.config.clone(),
                    failed: plan.calls.len() - (replies.len() - failures.len()),
                    total: plan.calls.len(),
                    status,
                };
                if failures.len() == replies.len() {
                    Outcome::Rejected(err)
                } else {
                    Outcome::Partial(err)
                }
            }
        };
        if let Outcome::Rejected(err) | Outcome::Partial(err) = &outcome {
            warn!(config = %plan.config, error = %err, "save incomplete");
        }

        Self {
            plan,
            flight,
            names,
            outcome,
            reloaded: None,
        }
    }
}

/// Fold flush results back into the cache. Returns the saved configuration
/// names and the errors to report.
fn settle(configs: &mut Configs, flushed: Vec<Flushed>) -> (Vec<String>, Vec<CoreError>) {
    let mut saved = Vec::new();
    let mut errors = Vec::new();

    for entry in flushed {
        let config = entry.plan.config.clone();
        let Some(overlay) = configs.get_mut(&config) else {
            debug!(config, "config unloaded during save");
            continue;
        };

        match entry.outcome {
            Outcome::Saved => {
                let base = entry
                    .reloaded
                    .unwrap_or_else(|| entry.plan.assumed_snapshot(&entry.names));
                overlay.finish_flush(base, &entry.names);
                saved.push(config);
            }
            Outcome::Rejected(err) => {
                overlay.abort_flush(entry.flight);
                errors.push(err);
            }
            Outcome::Partial(err) => {
                // Without a read-back the planned state stands in until the
                // next reload; edits made during the save stay on top of it.
                let base = entry.reloaded.unwrap_or_else(|| {
                    warn!(config, "partial save not read back, assuming planned state");
                    entry.plan.assumed_snapshot(&entry.names)
                });
                overlay.finish_flush(base, &entry.names);
                errors.push(err);
            }
        }
    }
    (saved, errors)
}

fn ensure_ok(operation: &str, status: UbusStatus) -> Result<(), CoreError> {
    if status.is_ok() {
        Ok(())
    } else {
        Err(CoreError::Rejected {
            operation: operation.to_owned(),
            status,
        })
    }
}

fn snapshot_from(sections: Vec<UciSectionData>) -> ConfigSnapshot {
    ConfigSnapshot::new(sections.into_iter().map(Section::from_remote).collect())
}
