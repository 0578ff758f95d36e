//! Shared test utilities for the pairsync workspace.
//!
//! In-memory stand-ins for everything the host environment provides. It is a
//! dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`host`]: [`FakeHost`], a scriptable target lookup
//! - [`store`]: [`MemoryResolver`] and [`ScriptedFetcher`]
//! - [`backends`]: recording mutation backends sharing one [`CallLog`]
//! - [`fixtures`]: snapshot builders and fast timing settings

pub mod backends;
pub mod fixtures;
pub mod host;
pub mod store;

pub use backends::{BackendCall, CallLog, RecordingBackends, RecordingFeature, RecordingRender};
pub use fixtures::{category, fast_apply_settings, fast_watch_settings, snapshot};
pub use host::FakeHost;
pub use store::{MemoryResolver, ScriptedFetcher};
