// ── Remote store seam ──
//
// The overlay talks to the router through `UciBackend`. `UbusClient`
// implements it over JSON-RPC; tests plug in an in-memory store.

use std::future::Future;

use serde_json::{Map, Value};
use startwrt_api::{Error, UbusClient, UbusStatus, UciCall, UciSectionData};

/// The subset of rpcd's `uci` object the overlay needs.
pub trait UciBackend: Send + Sync + 'static {
    /// All sections of `config`, in configuration order.
    fn get(&self, config: &str)
    -> impl Future<Output = Result<Vec<UciSectionData>, Error>> + Send;

    /// Send staged writes together, one outcome per call.
    fn batch(
        &self,
        calls: &[UciCall],
    ) -> impl Future<Output = Result<Vec<Result<Value, Error>>, Error>> + Send;

    /// The router's saved, uncommitted change records per configuration.
    fn changes(&self) -> impl Future<Output = Result<Map<String, Value>, Error>> + Send;

    fn revert(&self, config: &str) -> impl Future<Output = Result<(), Error>> + Send;

    fn apply(
        &self,
        timeout: u64,
        rollback: bool,
    ) -> impl Future<Output = Result<UbusStatus, Error>> + Send;

    fn confirm(&self) -> impl Future<Output = Result<UbusStatus, Error>> + Send;

    fn rollback(&self) -> impl Future<Output = Result<UbusStatus, Error>> + Send;
}

impl UciBackend for UbusClient {
    fn get(
        &self,
        config: &str,
    ) -> impl Future<Output = Result<Vec<UciSectionData>, Error>> + Send {
        self.uci_get(config)
    }

    fn batch(
        &self,
        calls: &[UciCall],
    ) -> impl Future<Output = Result<Vec<Result<Value, Error>>, Error>> + Send {
        self.uci_batch(calls)
    }

    fn changes(&self) -> impl Future<Output = Result<Map<String, Value>, Error>> + Send {
        self.uci_changes()
    }

    fn revert(&self, config: &str) -> impl Future<Output = Result<(), Error>> + Send {
        self.uci_revert(config)
    }

    fn apply(
        &self,
        timeout: u64,
        rollback: bool,
    ) -> impl Future<Output = Result<UbusStatus, Error>> + Send {
        self.uci_apply(timeout, rollback)
    }

    fn confirm(&self) -> impl Future<Output = Result<UbusStatus, Error>> + Send {
        self.uci_confirm()
    }

    fn rollback(&self) -> impl Future<Output = Result<UbusStatus, Error>> + Send {
        self.uci_rollback()
    }
}
