//! Optimistic UCI overlay between `startwrt-api` and its consumers.
//!
//! This crate owns the change-tracking model for OpenWrt's UCI
//! configuration store:
//!
//! - **[`Uci`]**: the overlay store. [`load`](Uci::load) caches remote
//!   configurations; reads and edits are synchronous and only touch the
//!   cache; [`save`](Uci::save) flushes every pending edit in one batch
//!   and re-reads the result; [`apply`](Uci::apply) and
//!   [`confirm`](Uci::confirm) drive rpcd's rollback-protected commit.
//!
//! - **Overlay** ([`overlay`]): per-configuration base snapshot plus an
//!   append-only [`ChangeLog`]. The visible state is always
//!   `replay(base, log)`, computed with the pure [`overlay::apply`] reducer.
//!
//! - **Domain model** ([`model`]): [`Section`], [`OptionValue`], and
//!   [`SectionId`], which is either a local placeholder or a name the
//!   router assigned.
//!
//! - **[`Router`]**: logs in over ubus and hands out a [`Uci`] bound to
//!   the live session.
//!
//! The remote side is abstracted behind [`UciBackend`], implemented for
//! [`startwrt_api::UbusClient`].

pub mod backend;
pub mod config;
pub mod error;
pub mod model;
pub mod overlay;
pub mod router;
pub mod uci;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backend::UciBackend;
pub use config::{Credentials, RouterConfig, TlsVerification};
pub use error::CoreError;
pub use router::Router;
pub use uci::{DEFAULT_APPLY_TIMEOUT, Uci};

pub use model::{
    Change, ChangeOp, ChangeRecord, OptionValue, PlaceholderId, Section, SectionId, SectionRef,
    is_valid_name,
};
pub use overlay::{ChangeLog, ConfigOverlay, ConfigSnapshot};
