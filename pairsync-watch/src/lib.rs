//! # pairsync-watch
//!
//! Fingerprint watchers for live targets and the suppression gate they share.
//!
//! Call [`FingerprintWatcher::poll`] once per scheduling tick; events arrive on
//! the channel passed at construction.

pub mod event;
pub mod fingerprint;
pub mod gate;
pub mod watcher;

pub use event::TargetEvent;
pub use fingerprint::{Fingerprint, FingerprintDiff};
pub use gate::SuppressionGate;
pub use watcher::{FingerprintWatcher, WatchState};
