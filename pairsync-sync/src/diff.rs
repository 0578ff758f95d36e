//! Change classification between the last applied snapshot and a new one.
//!
//! The diff walks the union of categories, so a category or payload that
//! disappeared raises the same [`ChangeKind`] as one that changed.

use std::collections::BTreeSet;

use serde::Serialize;

use pairsync_core::types::{CategoryState, ChangeKind, ChangeSet, ObjectKind, StateSnapshot};

/// Flags that re-raise changes even when payloads are equal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeOptions {
    /// Re-raise every present customization payload.
    pub force_customization: bool,
    /// Re-raise `ModFiles`/`ModManipulation` for categories that carry them.
    pub force_mods: bool,
}

impl ChangeOptions {
    pub fn forced() -> Self {
        Self {
            force_customization: true,
            force_mods: true,
        }
    }
}

/// Compute the [`ChangeSet`] taking `old` (or nothing) to `new`.
pub fn compute(old: Option<&StateSnapshot>, new: &StateSnapshot, options: ChangeOptions) -> ChangeSet {
    let empty = CategoryState::default();
    let kinds: BTreeSet<ObjectKind> = new
        .categories()
        .keys()
        .chain(old.into_iter().flat_map(|o| o.categories().keys()))
        .copied()
        .collect();

    let mut changes = ChangeSet::default();
    for kind in kinds {
        let before = old.and_then(|o| o.category(kind)).unwrap_or(&empty);
        let after = new.category(kind).unwrap_or(&empty);
        classify(kind, before, after, options, &mut changes);
    }
    changes
}

fn classify(
    kind: ObjectKind,
    before: &CategoryState,
    after: &CategoryState,
    options: ChangeOptions,
    changes: &mut ChangeSet,
) {
    for &change in ChangeKind::customization() {
        let now = after.payload(change);
        if before.payload(change) != now || (options.force_customization && now.is_some()) {
            record(changes, kind, change, after);
        }
    }

    if before.asset_set() != after.asset_set() || (options.force_mods && !after.assets.is_empty()) {
        record(changes, kind, ChangeKind::ModFiles, after);
    }

    // Only the primary's manipulation reaches the rendering backend.
    if kind.is_primary() {
        let manipulation = after.payload(ChangeKind::ModManipulation);
        if before.payload(ChangeKind::ModManipulation) != manipulation
            || (options.force_mods && manipulation.is_some())
        {
            record(changes, kind, ChangeKind::ModManipulation, after);
        }
    }
}

fn record(changes: &mut ChangeSet, kind: ObjectKind, change: ChangeKind, after: &CategoryState) {
    let present = match change {
        ChangeKind::ModFiles => !after.assets.is_empty(),
        other => after.payload(other).is_some(),
    };
    if present {
        changes.insert(kind, change);
    } else {
        changes.insert_cleared(kind, change);
    }
}

/// Re-raise `unsettled` changes against `new`.
///
/// Changes scheduled by requests that never committed may have reached the
/// target in part; the next request applies `new`'s payload for each of them
/// (or reverts it when absent).
pub fn carry_over(changes: &mut ChangeSet, unsettled: &ChangeSet, new: &StateSnapshot) {
    let empty = CategoryState::default();
    for (kind, set) in unsettled.iter() {
        let after = new.category(kind).unwrap_or(&empty);
        for &change in set {
            if !changes.contains(kind, change) {
                record(changes, kind, change, after);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// Per-category view of a change set, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryReport {
    pub kind: ObjectKind,
    pub changes: Vec<ChangeKind>,
    pub needs_redraw: bool,
}

pub fn report(changes: &ChangeSet) -> Vec<CategoryReport> {
    changes
        .iter()
        .map(|(kind, set)| CategoryReport {
            kind,
            changes: set.iter().copied().collect(),
            needs_redraw: changes.needs_redraw(kind),
        })
        .collect()
}
