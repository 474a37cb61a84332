// rpcd `uci` object bindings
//
// Typed wrappers around the uci methods rpcd exposes. Write operations
// stage changes in the session's delta directory; `apply` commits them
// (optionally with a rollback timer) and `confirm` disarms the timer.

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::Error;
use crate::status::UbusStatus;
use crate::ubus::client::UbusClient;
use crate::ubus::models::UciSectionData;
use crate::ubus::procedure::{PreparedCall, Procedure, Shape};

static UCI_CONFIGS: Procedure = Procedure::new("uci", "configs").expect("configs", Shape::Array);

static UCI_GET: Procedure = Procedure::new("uci", "get")
    .params(&["config"])
    .expect("values", Shape::Object)
    .reject();

static UCI_ADD: Procedure = Procedure::new("uci", "add")
    .params(&["config", "type", "name", "values"])
    .expect("section", Shape::String)
    .reject();

static UCI_SET: Procedure = Procedure::new("uci", "set")
    .params(&["config", "section", "values"])
    .reject();

static UCI_DELETE: Procedure = Procedure::new("uci", "delete")
    .params(&["config", "section", "options"])
    .reject();

static UCI_RENAME: Procedure = Procedure::new("uci", "rename")
    .params(&["config", "section", "option", "name"])
    .reject();

static UCI_ORDER: Procedure = Procedure::new("uci", "order")
    .params(&["config", "sections"])
    .reject();

static UCI_CHANGES: Procedure = Procedure::new("uci", "changes").expect("changes", Shape::Object);

static UCI_REVERT: Procedure = Procedure::new("uci", "revert")
    .params(&["config"])
    .reject();

/// One staged write against the `uci` object.
///
/// Calls are built by the overlay when flushing and sent together through
/// [`UbusClient::uci_batch`].
#[derive(Debug, Clone, PartialEq)]
pub enum UciCall {
    Add {
        config: String,
        section_type: String,
        name: Option<String>,
        values: Map<String, Value>,
    },
    Set {
        config: String,
        section: String,
        values: Map<String, Value>,
    },
    /// Delete the whole section when `options` is `None`.
    Delete {
        config: String,
        section: String,
        options: Option<Vec<String>>,
    },
    /// Rename the section, or one of its options when `option` is set.
    Rename {
        config: String,
        section: String,
        option: Option<String>,
        name: String,
    },
    Order {
        config: String,
        sections: Vec<String>,
    },
}

impl UciCall {
    pub fn config(&self) -> &str {
        match self {
            Self::Add { config, .. }
            | Self::Set { config, .. }
            | Self::Delete { config, .. }
            | Self::Rename { config, .. }
            | Self::Order { config, .. } => config,
        }
    }

    pub fn prepare(&self) -> PreparedCall<'static> {
        match self {
            Self::Add {
                config,
                section_type,
                name,
                values,
            } => UCI_ADD.prepare(vec![
                json!(config),
                json!(section_type),
                json!(name),
                Value::Object(values.clone()),
            ]),
            Self::Set {
                config,
                section,
                values,
            } => UCI_SET.prepare(vec![
                json!(config),
                json!(section),
                Value::Object(values.clone()),
            ]),
            Self::Delete {
                config,
                section,
                options,
            } => UCI_DELETE.prepare(vec![json!(config), json!(section), json!(options)]),
            Self::Rename {
                config,
                section,
                option,
                name,
            } => UCI_RENAME.prepare(vec![
                json!(config),
                json!(section),
                json!(option),
                json!(name),
            ]),
            Self::Order { config, sections } => {
                UCI_ORDER.prepare(vec![json!(config), json!(sections)])
            }
        }
    }
}

impl UbusClient {
    /// List the configuration names the session may read.
    pub async fn uci_configs(&self) -> Result<Vec<String>, Error> {
        let reply = self.invoke(&UCI_CONFIGS, Vec::new()).await?;
        Ok(serde_json::from_value(reply).unwrap_or_default())
    }

    /// Fetch every section of `config`, keyed by section name.
    ///
    /// Sections come back sorted by their `.index` so the caller sees the
    /// order the configuration file has.
    pub async fn uci_get(&self, config: &str) -> Result<Vec<UciSectionData>, Error> {
        debug!(config, "fetching uci config");
        let reply = self.invoke(&UCI_GET, vec![json!(config)]).await?;
        let Value::Object(values) = reply else {
            return Ok(Vec::new());
        };

        let mut sections = Vec::with_capacity(values.len());
        for (name, raw) in values {
            let section: UciSectionData =
                serde_json::from_value(raw).map_err(|e| Error::Deserialization {
                    message: format!("invalid section '{name}' in '{config}': {e}"),
                    body: String::new(),
                })?;
            sections.push(section);
        }
        sections.sort_by_key(|s| s.index.unwrap_or(u64::MAX));
        Ok(sections)
    }

    /// Send a single staged write. `Add` yields the new section name.
    pub async fn uci_call(&self, call: &UciCall) -> Result<Value, Error> {
        debug!(config = call.config(), ?call, "uci write");
        self.invoke_prepared(&call.prepare()).await
    }

    /// Send staged writes in one request, returning per-call outcomes.
    pub async fn uci_batch(&self, calls: &[UciCall]) -> Result<Vec<Result<Value, Error>>, Error> {
        let prepared: Vec<PreparedCall<'static>> = calls.iter().map(UciCall::prepare).collect();
        self.batch(&prepared).await
    }

    /// Pending (saved, uncommitted) change records per configuration.
    pub async fn uci_changes(&self) -> Result<Map<String, Value>, Error> {
        let reply = self.invoke(&UCI_CHANGES, Vec::new()).await?;
        match reply {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }

    /// Drop the saved-but-uncommitted changes of `config`.
    pub async fn uci_revert(&self, config: &str) -> Result<(), Error> {
        debug!(config, "reverting uci config");
        self.invoke(&UCI_REVERT, vec![json!(config)]).await?;
        Ok(())
    }

    /// Commit all saved changes and reload affected services.
    ///
    /// With `rollback` set, rpcd reverts the commit unless
    /// [`uci_confirm`](Self::uci_confirm) arrives within `timeout` seconds.
    pub async fn uci_apply(&self, timeout: u64, rollback: bool) -> Result<UbusStatus, Error> {
        debug!(timeout, rollback, "applying uci changes");
        let (status, _) = self
            .call_status(
                "uci",
                "apply",
                json!({ "timeout": timeout, "rollback": rollback }),
            )
            .await?;
        Ok(status)
    }

    /// Confirm a rollback-protected apply.
    pub async fn uci_confirm(&self) -> Result<UbusStatus, Error> {
        let (status, _) = self.call_status("uci", "confirm", json!({})).await?;
        Ok(status)
    }

    /// Revert a pending rollback-protected apply right away.
    pub async fn uci_rollback(&self) -> Result<UbusStatus, Error> {
        debug!("rolling back uci apply");
        let (status, _) = self.call_status("uci", "rollback", json!({})).await?;
        Ok(status)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_add_omits_name() {
        let call = UciCall::Add {
            config: "firewall".into(),
            section_type: "zone".into(),
            name: None,
            values: Map::new(),
        };
        let prepared = call.prepare();
        assert_eq!(prepared.procedure.method, "add");
        assert!(!prepared.args.contains_key("name"));
        assert_eq!(prepared.args["type"], json!("zone"));
    }

    #[test]
    fn section_delete_omits_options() {
        let call = UciCall::Delete {
            config: "network".into(),
            section: "wan6".into(),
            options: None,
        };
        let prepared = call.prepare();
        assert_eq!(prepared.args.len(), 2);
    }

    #[test]
    fn option_delete_lists_options() {
        let call = UciCall::Delete {
            config: "network".into(),
            section: "lan".into(),
            options: Some(vec!["ip6assign".into(), "dns".into()]),
        };
        let prepared = call.prepare();
        assert_eq!(prepared.args["options"], json!(["ip6assign", "dns"]));
    }
}
