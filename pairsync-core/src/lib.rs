//! # pairsync-core
//!
//! Domain types, external-interface contracts and configuration shared by the
//! pairsync crates.
//!
//! - [`types`]: snapshots, categories, change sets, target identities
//! - [`host`], [`content`], [`backend`]: traits the host environment implements
//! - [`generation`]: generation-counter cancellation
//! - [`config`]: `~/.pairsync/config.yaml`

pub mod backend;
pub mod config;
pub mod content;
pub mod error;
pub mod generation;
pub mod host;
pub mod trace;
pub mod types;

pub use backend::{Backends, FeatureBackend, RenderBackend, ResolvedMapping};
pub use config::SyncConfig;
pub use content::{AssetFetcher, ContentRecord, ContentResolver};
pub use error::{BackendError, Cancelled, ConfigError, StoreError};
pub use generation::{CancelGuard, GenerationCounter};
pub use host::TargetHost;
pub use trace::CorrelationId;
pub use types::{
    Address, AssetReference, CategoryState, ChangeKind, ChangeSet, ContentHash, ObjectKind,
    RawFingerprint, StateSnapshot, TargetHandle, TargetIdentity,
};
