//! Snapshot builders and timing settings short enough for real-time tests.

use std::collections::BTreeMap;

use pairsync_core::config::{ApplySettings, WatchSettings};
use pairsync_core::types::{AssetReference, CategoryState, ObjectKind, StateSnapshot};

/// Snapshot from `(kind, state)` pairs.
pub fn snapshot(categories: impl IntoIterator<Item = (ObjectKind, CategoryState)>) -> StateSnapshot {
    StateSnapshot::new(categories.into_iter().collect::<BTreeMap<_, _>>())
}

/// Category with an appearance payload and hashed assets.
///
/// `assets` are `(hash, game_path)` pairs.
pub fn category(appearance: &str, assets: &[(&str, &str)]) -> CategoryState {
    CategoryState {
        appearance: Some(appearance.to_owned()),
        assets: assets
            .iter()
            .map(|(hash, path)| AssetReference::hashed(*hash, &[path]))
            .collect(),
        ..CategoryState::default()
    }
}

/// Apply settings with millisecond-scale delays.
pub fn fast_apply_settings() -> ApplySettings {
    ApplySettings {
        resolve_parallelism: 4,
        fetch_rounds: 10,
        fetch_retry_delay_ms: 5,
        prior_apply_poll_ms: 5,
        draw_wait_timeout_ms: 200,
        revert_timeout_ms: 500,
    }
}

/// Watch settings with a short removal grace and zone windows.
pub fn fast_watch_settings() -> WatchSettings {
    WatchSettings {
        tick_interval_ms: 10,
        removal_grace_ms: 1_000,
        zone_suppression_ms: 120_000,
        zone_settle_ms: 2_500,
    }
}
