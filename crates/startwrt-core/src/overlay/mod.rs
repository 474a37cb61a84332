// ── Optimistic overlay ──
//
// Local edits on top of the last-known remote state of each configuration.

pub mod config;
pub mod log;
pub(crate) mod plan;
pub mod snapshot;

pub use config::ConfigOverlay;
pub use log::ChangeLog;
pub use snapshot::{ConfigSnapshot, apply, replay};
