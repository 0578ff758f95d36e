//! # pairsync-sync
//!
//! Change classification, asset resolution and the sync orchestrator.
//!
//! Build a [`SyncOrchestrator`] per remote target, feed it snapshots with
//! [`SyncOrchestrator::apply_state`] and watcher events with
//! [`SyncOrchestrator::handle_target_event`], and call
//! [`SyncOrchestrator::teardown`] when the session ends.

pub mod content_store;
pub mod diff;
pub mod error;
pub mod orchestrator;
pub mod resolve;
pub mod revert;
pub mod snapshot_file;
mod stats;

pub use content_store::{FileContentStore, StoreStatus};
pub use diff::{ChangeOptions, CategoryReport};
pub use error::SyncError;
pub use orchestrator::{ApplyHandle, ApplyOutcome, ApplyRequest, SyncOrchestrator, SyncPhase};
pub use resolve::{AssetResolver, Resolution};
pub use revert::{CategoryRevert, RevertReport, RevertStatus, RevertStep};
pub use snapshot_file::{load_snapshot, save_snapshot};
pub use stats::StatsSnapshot;
