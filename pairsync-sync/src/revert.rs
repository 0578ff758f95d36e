//! Revert of applied state on teardown.
//!
//! Every external call is bracketed by an identity check: the target must
//! still resolve to the same address and carry the same name. A mismatch
//! aborts the remaining steps of that category only.

use serde::Serialize;

use pairsync_core::backend::Backends;
use pairsync_core::generation::CancelGuard;
use pairsync_core::host::TargetHost;
use pairsync_core::trace::CorrelationId;
use pairsync_core::types::{CategoryState, ChangeKind, ObjectKind, TargetHandle};

/// One external call made while reverting a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertStep {
    Files,
    Appearance,
    BodyScale,
    HeelsOffset,
    Title,
    Palette,
    Redraw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RevertStatus {
    Reverted,
    /// The target did not resolve; nothing to revert.
    TargetAbsent,
    /// The target changed identity around `step`; later steps were skipped.
    IdentityMismatch { step: RevertStep },
    TimedOut,
    /// A backend refused `step`. The remaining steps still ran.
    Failed { step: RevertStep, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRevert {
    pub kind: ObjectKind,
    #[serde(flatten)]
    pub status: RevertStatus,
}

/// Result of one teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevertReport {
    pub trace_id: CorrelationId,
    pub categories: Vec<CategoryRevert>,
}

impl RevertReport {
    pub(crate) fn new(trace_id: CorrelationId) -> Self {
        Self {
            trace_id,
            categories: Vec::new(),
        }
    }

    pub fn status(&self, kind: ObjectKind) -> Option<&RevertStatus> {
        self.categories
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| &c.status)
    }

    /// True when no category hit a mismatch, timeout or failure.
    pub fn is_clean(&self) -> bool {
        self.categories
            .iter()
            .all(|c| matches!(c.status, RevertStatus::Reverted | RevertStatus::TargetAbsent))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PlannedStep {
    Files,
    RestoreAppearance(String),
    Feature(ChangeKind),
    Redraw,
}

impl PlannedStep {
    fn label(&self) -> RevertStep {
        match self {
            PlannedStep::Files => RevertStep::Files,
            PlannedStep::RestoreAppearance(_) => RevertStep::Appearance,
            PlannedStep::Feature(change) => match change {
                ChangeKind::AppearanceDescription => RevertStep::Appearance,
                ChangeKind::BodyScale => RevertStep::BodyScale,
                ChangeKind::HeelsOffset => RevertStep::HeelsOffset,
                ChangeKind::TitleText => RevertStep::Title,
                ChangeKind::Palette => RevertStep::Palette,
                ChangeKind::ModFiles | ChangeKind::ModManipulation => RevertStep::Files,
            },
            PlannedStep::Redraw => RevertStep::Redraw,
        }
    }
}

/// Steps needed to return one category to its pre-sync state.
///
/// `original` is the appearance captured before the first apply, if any was
/// attempted: `Some(None)` means the backend could not read it back.
pub(crate) fn plan(
    kind: ObjectKind,
    category: Option<&CategoryState>,
    original: Option<&Option<String>>,
) -> Vec<PlannedStep> {
    let mut steps = Vec::new();
    if kind.is_primary() {
        steps.push(PlannedStep::Files);
    }

    match original {
        Some(Some(description)) => steps.push(PlannedStep::RestoreAppearance(description.clone())),
        Some(None) => steps.push(PlannedStep::Feature(ChangeKind::AppearanceDescription)),
        None if category.is_some_and(|c| c.appearance.is_some()) => {
            steps.push(PlannedStep::Feature(ChangeKind::AppearanceDescription))
        }
        None => {}
    }

    if let Some(category) = category {
        for change in [
            ChangeKind::BodyScale,
            ChangeKind::HeelsOffset,
            ChangeKind::TitleText,
            ChangeKind::Palette,
        ] {
            if category.payload(change).is_some() {
                steps.push(PlannedStep::Feature(change));
            }
        }
    }

    if !steps.is_empty() {
        steps.push(PlannedStep::Redraw);
    }
    steps
}

fn same_target(host: &dyn TargetHost, target: &TargetHandle) -> bool {
    host.resolve_address(&target.identity) == Some(target.address)
        && host.object_name(target.address).as_deref() == Some(target.identity.name.as_str())
}

/// Run `steps` against `target`, checking its identity around every call.
pub(crate) async fn revert_category(
    host: &dyn TargetHost,
    backends: &Backends,
    target: &TargetHandle,
    steps: &[PlannedStep],
    trace: &CorrelationId,
    cancel: &CancelGuard,
) -> RevertStatus {
    let mut failure = None;
    for step in steps {
        let label = step.label();
        if !same_target(host, target) {
            tracing::warn!(identity = %target.identity, trace_id = %trace, ?label, "target changed before revert step; skipping rest of category");
            return RevertStatus::IdentityMismatch { step: label };
        }

        let result = match step {
            PlannedStep::Files => backends.render.revert(target).await,
            PlannedStep::RestoreAppearance(description) => {
                backends
                    .appearance
                    .apply(target, description, trace, cancel)
                    .await
            }
            PlannedStep::Feature(change) => match backends.feature(*change) {
                Some(backend) => backend.revert(target).await,
                None => Ok(()),
            },
            PlannedStep::Redraw => backends.render.redraw(target, trace, cancel).await,
        };
        if let Err(err) = result {
            tracing::warn!(identity = %target.identity, trace_id = %trace, ?label, "revert step failed: {err}");
            failure.get_or_insert(RevertStatus::Failed {
                step: label,
                reason: err.to_string(),
            });
        }

        if !same_target(host, target) {
            tracing::warn!(identity = %target.identity, trace_id = %trace, ?label, "target changed during revert step; skipping rest of category");
            return RevertStatus::IdentityMismatch { step: label };
        }
    }
    failure.unwrap_or(RevertStatus::Reverted)
}
