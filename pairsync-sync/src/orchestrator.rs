//! Sync orchestrator: diff, resolve, apply and revert for one remote target.
//!
//! # Request lifecycle
//!
//! ```text
//! apply_state ─▶ ResolvingAssets ─▶ AwaitingPriorApply ─▶ Applying ─▶ Idle
//!                                                  teardown ─▶ Reverting
//! ```
//!
//! Every scheduled request advances a generation counter. Work belonging to an
//! older generation stops at its next suspension point, so a burst of requests
//! collapses to the newest one. The apply slot admits one request at a time;
//! it is only granted to a request whose generation is still current.
//!
//! The session state lives behind a synchronous mutex that is never held
//! across an `.await`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use pairsync_core::backend::{Backends, FeatureBackend, ResolvedMapping};
use pairsync_core::config::ApplySettings;
use pairsync_core::content::{AssetFetcher, ContentResolver};
use pairsync_core::error::{BackendError, Cancelled};
use pairsync_core::generation::{CancelGuard, GenerationCounter};
use pairsync_core::host::TargetHost;
use pairsync_core::trace::CorrelationId;
use pairsync_core::types::{ChangeKind, ChangeSet, ObjectKind, StateSnapshot, TargetHandle, TargetIdentity};
use pairsync_watch::TargetEvent;

use crate::diff::{self, ChangeOptions};
use crate::error::SyncError;
use crate::resolve::{AssetResolver, Resolution};
use crate::revert::{self, CategoryRevert, RevertReport, RevertStatus};
use crate::stats::{StatsSnapshot, SyncStats};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Phase of the most recent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    ResolvingAssets,
    AwaitingPriorApply,
    Applying,
    Reverting,
}

/// How a scheduled request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Completed { trace_id: CorrelationId },
    /// A newer request (or teardown) replaced this one.
    Superseded,
    /// The primary target vanished mid-apply; a forced re-apply is queued for
    /// its next appearance.
    Abandoned,
    /// A backend failed. The cached state was left untouched.
    Failed {
        trace_id: Option<CorrelationId>,
        reason: String,
    },
}

/// Handle to a scheduled request.
#[derive(Debug)]
pub struct ApplyHandle {
    generation: u64,
    changes: ChangeSet,
    task: JoinHandle<ApplyOutcome>,
}

impl ApplyHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub async fn outcome(self) -> ApplyOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => ApplyOutcome::Failed {
                trace_id: None,
                reason: format!("apply task ended abnormally: {err}"),
            },
        }
    }
}

/// Immediate answer to [`SyncOrchestrator::apply_state`].
#[derive(Debug)]
pub enum ApplyRequest {
    /// The target has never resolved; the snapshot is held until it does.
    Deferred,
    /// Same aggregate hash as the in-flight snapshot, or as the applied one
    /// with no interrupted changes left to restore.
    Unchanged,
    /// The diff against the applied snapshot is empty.
    NoChanges,
    Scheduled(ApplyHandle),
}

impl ApplyRequest {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, ApplyRequest::Scheduled(_))
    }

    /// Wait for the scheduled request, if there is one.
    pub async fn outcome(self) -> Option<ApplyOutcome> {
        match self {
            ApplyRequest::Scheduled(handle) => Some(handle.outcome().await),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CachedState {
    snapshot: Option<Arc<StateSnapshot>>,
    mappings: BTreeMap<ObjectKind, ResolvedMapping>,
    /// Appearance read back before the first apply. `None` when unreadable.
    original_appearance: BTreeMap<ObjectKind, Option<String>>,
    last_appearance: BTreeMap<ObjectKind, String>,
    /// Categories a backend was called for, including applies that never finished.
    touched: BTreeSet<ObjectKind>,
}

#[derive(Debug, Default)]
struct SessionState {
    cache: CachedState,
    last_received: Option<Arc<StateSnapshot>>,
    /// Snapshot of the newest scheduled request, until it finishes.
    pending: Option<(u64, Arc<StateSnapshot>)>,
    /// Changes scheduled since the last commit. A superseded or failed
    /// request may have applied part of them.
    unsettled: ChangeSet,
    deferred: Option<Arc<StateSnapshot>>,
    initialized: bool,
    visible: bool,
    reapply_on_visible: bool,
    /// Set after an apply with unresolved assets; mod kinds are re-raised until cleared.
    force_mods: bool,
    torn_down: bool,
    /// Generation currently inside the Applying phase.
    apply_slot: Option<u64>,
}

struct Inner {
    primary: TargetIdentity,
    host: Arc<dyn TargetHost>,
    assets: AssetResolver,
    backends: Backends,
    settings: ApplySettings,
    requests: GenerationCounter,
    state: Mutex<SessionState>,
    phase: watch::Sender<SyncPhase>,
    stats: SyncStats,
}

enum PhaseError {
    Superseded,
    TargetLost,
    Backend {
        trace: CorrelationId,
        source: BackendError,
    },
}

impl From<Cancelled> for PhaseError {
    fn from(_: Cancelled) -> Self {
        PhaseError::Superseded
    }
}

fn backend_failure(trace: &CorrelationId) -> impl FnOnce(BackendError) -> PhaseError + '_ {
    move |source| PhaseError::Backend {
        trace: *trace,
        source,
    }
}

// ---------------------------------------------------------------------------
// SyncOrchestrator
// ---------------------------------------------------------------------------

/// Keeps one remote target in line with the snapshots pushed for it.
///
/// Cloning shares the orchestrator. [`apply_state`](Self::apply_state) and
/// [`handle_target_event`](Self::handle_target_event) spawn onto the current
/// tokio runtime.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    pub fn new(
        primary: TargetIdentity,
        host: Arc<dyn TargetHost>,
        resolver: Arc<dyn ContentResolver>,
        fetcher: Arc<dyn AssetFetcher>,
        backends: Backends,
        settings: ApplySettings,
    ) -> Self {
        let (phase, _rx) = watch::channel(SyncPhase::Idle);
        Self {
            inner: Arc::new(Inner {
                primary,
                host,
                assets: AssetResolver::new(resolver, fetcher, settings.clone()),
                backends,
                settings,
                requests: GenerationCounter::new(),
                state: Mutex::new(SessionState::default()),
                phase,
                stats: SyncStats::default(),
            }),
        }
    }

    pub fn primary(&self) -> &TargetIdentity {
        &self.inner.primary
    }

    /// Receiver tracking the phase of the most recent request.
    pub fn phase(&self) -> watch::Receiver<SyncPhase> {
        self.inner.phase.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Last fully applied snapshot.
    pub fn cached_snapshot(&self) -> Option<Arc<StateSnapshot>> {
        self.inner.lock_state().cache.snapshot.clone()
    }

    pub fn is_visible(&self) -> bool {
        self.inner.lock_state().visible
    }

    /// Whether the next diff re-raises mod changes to retry missing assets.
    pub fn retrying_missing_assets(&self) -> bool {
        self.inner.lock_state().force_mods
    }

    /// Appearance observed on `kind` before the first sync touched it.
    pub fn original_appearance(&self, kind: ObjectKind) -> Option<String> {
        self.inner
            .lock_state()
            .cache
            .original_appearance
            .get(&kind)
            .cloned()
            .flatten()
    }

    /// Most recently applied appearance for `kind`.
    pub fn last_appearance(&self, kind: ObjectKind) -> Option<String> {
        self.inner
            .lock_state()
            .cache
            .last_appearance
            .get(&kind)
            .cloned()
    }

    /// Bring the target in line with `snapshot`.
    ///
    /// With `forced` the aggregate-hash fast path is skipped and every
    /// present payload is re-applied.
    pub fn apply_state(
        &self,
        snapshot: impl Into<Arc<StateSnapshot>>,
        forced: bool,
    ) -> Result<ApplyRequest, SyncError> {
        let snapshot = snapshot.into();
        let inner = &self.inner;
        let mut state = inner.lock_state();
        if state.torn_down {
            return Err(SyncError::TornDown);
        }
        state.last_received = Some(Arc::clone(&snapshot));

        if !state.initialized {
            if inner.host.resolve_address(&inner.primary).is_none() {
                tracing::info!(identity = %inner.primary, "target not resolved yet; deferring snapshot");
                state.deferred = Some(snapshot);
                return Ok(ApplyRequest::Deferred);
            }
            state.initialized = true;
            state.visible = true;
        }

        let hash = snapshot.aggregate_hash();
        let cached = state.cache.snapshot.clone();
        if !forced {
            let applied = cached.as_ref().is_some_and(|c| c.aggregate_hash() == hash)
                && state.unsettled.is_empty();
            let in_flight = state
                .pending
                .as_ref()
                .is_some_and(|(_, p)| p.aggregate_hash() == hash);
            if applied || in_flight {
                tracing::debug!(identity = %inner.primary, %hash, "snapshot unchanged; skipping");
                return Ok(ApplyRequest::Unchanged);
            }
        }

        let options = ChangeOptions {
            force_customization: forced,
            force_mods: forced || state.force_mods,
        };
        let mut changes = diff::compute(cached.as_deref(), &snapshot, options);
        diff::carry_over(&mut changes, &state.unsettled, &snapshot);
        if changes.is_empty() {
            tracing::debug!(identity = %inner.primary, "no changes against applied snapshot");
            return Ok(ApplyRequest::NoChanges);
        }

        let guard = inner.requests.advance();
        let generation = guard.generation();
        state.pending = Some((generation, Arc::clone(&snapshot)));
        state.unsettled = changes.clone();
        drop(state);

        inner.stats.request_started();
        tracing::info!(
            identity = %inner.primary,
            generation,
            forced,
            categories = changes.iter().count(),
            "scheduling apply"
        );
        let task = tokio::spawn(run_request(
            Arc::clone(inner),
            snapshot,
            changes.clone(),
            guard,
        ));
        Ok(ApplyRequest::Scheduled(ApplyHandle {
            generation,
            changes,
            task,
        }))
    }

    /// Track visibility of the primary target and replay held snapshots.
    ///
    /// Events for other identities are ignored.
    pub fn handle_target_event(&self, event: &TargetEvent) -> Result<Option<ApplyRequest>, SyncError> {
        if event.identity() != &self.inner.primary {
            return Ok(None);
        }

        let replay = {
            let mut state = self.inner.lock_state();
            if state.torn_down {
                return Ok(None);
            }
            match event {
                TargetEvent::Removed { .. } => {
                    state.visible = false;
                    None
                }
                TargetEvent::Appeared { .. } | TargetEvent::Changed { .. } => {
                    state.initialized = true;
                    state.visible = true;
                    if state.reapply_on_visible {
                        state.reapply_on_visible = false;
                        state.deferred = None;
                        state.last_received.clone()
                    } else if matches!(event, TargetEvent::Changed { .. }) {
                        state.deferred.take()
                    } else {
                        None
                    }
                }
            }
        };

        match replay {
            Some(snapshot) => {
                tracing::info!(identity = %self.inner.primary, "target visible again; forcing re-apply");
                self.apply_state(snapshot, true).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Stop accepting snapshots and revert everything applied so far.
    ///
    /// Running a second time returns an empty report.
    pub async fn teardown(&self) -> RevertReport {
        let inner = &self.inner;
        let trace = CorrelationId::new();
        let mut report = RevertReport::new(trace);

        let guard = {
            let mut state = inner.lock_state();
            if state.torn_down {
                return report;
            }
            state.torn_down = true;
            state.deferred = None;
            inner.requests.advance()
        };
        inner.phase.send_replace(SyncPhase::Reverting);
        tracing::info!(identity = %inner.primary, trace_id = %trace, "tearing down; reverting applied state");

        let poll = inner.settings.prior_apply_poll();
        let drained = async {
            loop {
                let busy = inner.lock_state().apply_slot.is_some();
                if !busy {
                    break;
                }
                tokio::time::sleep(poll).await;
            }
        };
        if tokio::time::timeout(inner.settings.revert_timeout(), drained)
            .await
            .is_err()
        {
            tracing::warn!(identity = %inner.primary, "in-flight apply did not stop; reverting anyway");
        }

        let cache = std::mem::take(&mut inner.lock_state().cache);
        let mut kinds = cache.touched.clone();
        kinds.extend(cache.original_appearance.keys().copied());
        if let Some(snapshot) = &cache.snapshot {
            kinds.extend(snapshot.categories().keys().copied());
        }

        for kind in kinds {
            let status = inner.revert_kind(kind, &cache, &trace, &guard).await;
            tracing::debug!(identity = %inner.primary, %kind, ?status, "category revert finished");
            report.categories.push(CategoryRevert { kind, status });
        }

        inner.phase.send_replace(SyncPhase::Idle);
        tracing::info!(
            identity = %inner.primary,
            trace_id = %trace,
            clean = report.is_clean(),
            "teardown complete"
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Request pipeline
// ---------------------------------------------------------------------------

async fn run_request(
    inner: Arc<Inner>,
    snapshot: Arc<StateSnapshot>,
    changes: ChangeSet,
    guard: CancelGuard,
) -> ApplyOutcome {
    let generation = guard.generation();
    let outcome = match execute(&inner, &snapshot, &changes, &guard).await {
        Ok(trace_id) => {
            tracing::info!(identity = %inner.primary, generation, %trace_id, "apply completed");
            ApplyOutcome::Completed { trace_id }
        }
        Err(PhaseError::Superseded) => {
            tracing::debug!(identity = %inner.primary, generation, "apply superseded by a newer request");
            ApplyOutcome::Superseded
        }
        Err(PhaseError::TargetLost) => {
            tracing::info!(identity = %inner.primary, generation, "target lost mid-apply; re-applying on next appearance");
            ApplyOutcome::Abandoned
        }
        Err(PhaseError::Backend { trace, source }) => {
            tracing::error!(identity = %inner.primary, generation, trace_id = %trace, "apply failed: {source}");
            ApplyOutcome::Failed {
                trace_id: Some(trace),
                reason: source.to_string(),
            }
        }
    };
    inner.finish(generation, &outcome);
    outcome
}

async fn execute(
    inner: &Arc<Inner>,
    snapshot: &Arc<StateSnapshot>,
    changes: &ChangeSet,
    guard: &CancelGuard,
) -> Result<CorrelationId, PhaseError> {
    let resolution = if changes.any(ChangeKind::ModFiles) {
        inner.set_phase(guard, SyncPhase::ResolvingAssets);
        let categories = changes
            .iter()
            .filter(|(_, set)| set.contains(&ChangeKind::ModFiles))
            .map(|(kind, _)| {
                let assets = snapshot
                    .category(kind)
                    .map(|c| c.assets.clone())
                    .unwrap_or_default();
                (kind, assets)
            })
            .collect();
        let resolution = inner.assets.resolve(&inner.primary, categories, guard).await?;
        inner.stats.add_fetch_rounds(resolution.fetch_rounds);
        Some(resolution)
    } else {
        None
    };

    inner.set_phase(guard, SyncPhase::AwaitingPriorApply);
    let _slot = ApplySlot::acquire(inner, guard).await?;

    inner.set_phase(guard, SyncPhase::Applying);
    let trace = CorrelationId::new();
    let mappings = inner.merged_mappings(snapshot, resolution.as_ref());
    inner
        .apply_changes(snapshot, changes, &mappings, &trace, guard)
        .await?;

    {
        // A superseded request never becomes the cached state; its successor
        // carries these changes over.
        let mut state = inner.lock_state();
        guard.check()?;
        state.unsettled = ChangeSet::default();
        state.cache.snapshot = Some(Arc::clone(snapshot));
        state.cache.mappings = mappings;
        if let Some(resolution) = &resolution {
            state.force_mods = !resolution.is_complete();
        }
    }
    Ok(trace)
}

/// Exclusive right to mutate the target. Released on drop.
struct ApplySlot {
    inner: Arc<Inner>,
}

impl ApplySlot {
    async fn acquire(inner: &Arc<Inner>, guard: &CancelGuard) -> Result<Self, Cancelled> {
        loop {
            let acquired = {
                let mut state = inner.lock_state();
                guard.check()?;
                if state.apply_slot.is_none() {
                    state.apply_slot = Some(guard.generation());
                    true
                } else {
                    false
                }
            };
            if acquired {
                inner.stats.enter_apply();
                return Ok(Self {
                    inner: Arc::clone(inner),
                });
            }
            guard.sleep(inner.settings.prior_apply_poll()).await?;
        }
    }
}

impl Drop for ApplySlot {
    fn drop(&mut self) {
        self.inner.lock_state().apply_slot = None;
        self.inner.stats.exit_apply();
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_phase(&self, guard: &CancelGuard, phase: SyncPhase) {
        if !guard.is_cancelled() {
            self.phase.send_replace(phase);
        }
    }

    fn handle_for(&self, kind: ObjectKind) -> Option<TargetHandle> {
        let identity = self.primary.with_kind(kind);
        let address = self.host.resolve_address(&identity)?;
        Some(TargetHandle { identity, address })
    }

    /// Resolve the target of `kind`. Losing the primary abandons the phase;
    /// a missing secondary is skipped.
    fn category_target(&self, kind: ObjectKind) -> Result<Option<TargetHandle>, PhaseError> {
        match self.handle_for(kind) {
            Some(handle) => Ok(Some(handle)),
            None if kind.is_primary() => Err(PhaseError::TargetLost),
            None => Ok(None),
        }
    }

    fn primary_handle(&self) -> Result<TargetHandle, PhaseError> {
        self.handle_for(ObjectKind::Player)
            .ok_or(PhaseError::TargetLost)
    }

    /// Cached mappings overlaid with freshly resolved ones, restricted to
    /// categories that still carry assets.
    fn merged_mappings(
        &self,
        snapshot: &StateSnapshot,
        resolution: Option<&Resolution>,
    ) -> BTreeMap<ObjectKind, ResolvedMapping> {
        let mut mappings = self.lock_state().cache.mappings.clone();
        if let Some(resolution) = resolution {
            for (kind, mapping) in &resolution.mappings {
                mappings.insert(*kind, mapping.clone());
            }
        }
        mappings.retain(|kind, mapping| {
            !mapping.is_empty() && snapshot.category(*kind).is_some_and(|c| !c.assets.is_empty())
        });
        mappings
    }

    async fn apply_changes(
        &self,
        snapshot: &StateSnapshot,
        changes: &ChangeSet,
        mappings: &BTreeMap<ObjectKind, ResolvedMapping>,
        trace: &CorrelationId,
        guard: &CancelGuard,
    ) -> Result<(), PhaseError> {
        let primary = self.primary_handle()?;
        tracing::info!(
            identity = %self.primary,
            trace_id = %trace,
            generation = guard.generation(),
            "applying changes"
        );
        let settled = self
            .host
            .wait_while_drawing(primary.address, self.settings.draw_wait_timeout(), guard)
            .await?;
        if !settled {
            tracing::warn!(identity = %self.primary, trace_id = %trace, "target still drawing after timeout; applying anyway");
        }

        if changes.any(ChangeKind::ModFiles) {
            guard.check()?;
            let target = self.primary_handle()?;
            self.touch(ObjectKind::Player);
            let mapping = flatten(mappings);
            tracing::debug!(trace_id = %trace, paths = mapping.len(), "applying file mapping");
            self.backends
                .render
                .apply_files(&target, &mapping, trace, guard)
                .await
                .map_err(backend_failure(trace))?;
        }

        if changes.any(ChangeKind::ModManipulation) {
            guard.check()?;
            let target = self.primary_handle()?;
            self.touch(ObjectKind::Player);
            self.backends
                .render
                .apply_manipulation(&target, snapshot.manipulation(), trace, guard)
                .await
                .map_err(backend_failure(trace))?;
        }

        'categories: for (kind, set) in changes.iter() {
            let category = snapshot.category(kind);
            for &change in ChangeKind::customization() {
                if !set.contains(&change) {
                    continue;
                }
                let Some(backend) = self.backends.feature(change) else {
                    continue;
                };
                guard.check()?;
                let Some(target) = self.category_target(kind)? else {
                    tracing::debug!(%kind, trace_id = %trace, "category target not present; skipping");
                    continue 'categories;
                };
                self.touch(kind);

                match category.and_then(|c| c.payload(change)) {
                    Some(payload) => {
                        if change == ChangeKind::AppearanceDescription {
                            self.remember_original_appearance(kind, &target, backend).await;
                        }
                        backend
                            .apply(&target, payload, trace, guard)
                            .await
                            .map_err(backend_failure(trace))?;
                        if change == ChangeKind::AppearanceDescription {
                            self.lock_state()
                                .cache
                                .last_appearance
                                .insert(kind, payload.to_owned());
                        }
                    }
                    None => backend
                        .revert(&target)
                        .await
                        .map_err(backend_failure(trace))?,
                }
            }

            if changes.needs_redraw(kind) {
                guard.check()?;
                let Some(target) = self.category_target(kind)? else {
                    continue;
                };
                self.backends
                    .render
                    .redraw(&target, trace, guard)
                    .await
                    .map_err(backend_failure(trace))?;
            }
        }
        Ok(())
    }

    fn touch(&self, kind: ObjectKind) {
        self.lock_state().cache.touched.insert(kind);
    }

    async fn remember_original_appearance(
        &self,
        kind: ObjectKind,
        target: &TargetHandle,
        backend: &Arc<dyn FeatureBackend>,
    ) {
        let known = self.lock_state().cache.original_appearance.contains_key(&kind);
        if known {
            return;
        }
        let original = match backend.capture(target).await {
            Ok(original) => original,
            Err(err) => {
                tracing::warn!(%kind, "could not read original appearance: {err}");
                None
            }
        };
        self.lock_state()
            .cache
            .original_appearance
            .entry(kind)
            .or_insert(original);
    }

    fn finish(&self, generation: u64, outcome: &ApplyOutcome) {
        {
            let mut state = self.lock_state();
            if state.pending.as_ref().is_some_and(|(g, _)| *g == generation) {
                state.pending = None;
            }
            if *outcome == ApplyOutcome::Abandoned {
                state.visible = false;
                state.reapply_on_visible = true;
            }
        }
        self.stats.record(outcome);
        if self.requests.current() == generation {
            self.phase.send_replace(SyncPhase::Idle);
        }
    }

    async fn revert_kind(
        &self,
        kind: ObjectKind,
        cache: &CachedState,
        trace: &CorrelationId,
        guard: &CancelGuard,
    ) -> RevertStatus {
        let category = cache.snapshot.as_ref().and_then(|s| s.category(kind));
        let steps = revert::plan(kind, category, cache.original_appearance.get(&kind));
        if steps.is_empty() {
            return RevertStatus::Reverted;
        }
        let Some(target) = self.handle_for(kind) else {
            return RevertStatus::TargetAbsent;
        };

        let run = revert::revert_category(
            self.host.as_ref(),
            &self.backends,
            &target,
            &steps,
            trace,
            guard,
        );
        match tokio::time::timeout(self.settings.revert_timeout(), run).await {
            Ok(status) => status,
            Err(_) => {
                tracing::warn!(identity = %target.identity, trace_id = %trace, "revert timed out");
                RevertStatus::TimedOut
            }
        }
    }
}

/// One mapping for the rendering backend. Earlier categories win on conflicts.
fn flatten(mappings: &BTreeMap<ObjectKind, ResolvedMapping>) -> ResolvedMapping {
    let mut merged = ResolvedMapping::new();
    for mapping in mappings.values() {
        for (game_path, local) in mapping {
            merged
                .entry(game_path.clone())
                .or_insert_with(|| local.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn flatten_prefers_primary_category() {
        let mut mappings = BTreeMap::new();
        let mut player = ResolvedMapping::new();
        player.insert("shared.tex".to_string(), PathBuf::from("/p/shared.tex"));
        let mut pet = ResolvedMapping::new();
        pet.insert("shared.tex".to_string(), PathBuf::from("/pet/shared.tex"));
        pet.insert("pet.mdl".to_string(), PathBuf::from("/pet/pet.mdl"));
        mappings.insert(ObjectKind::Pet, pet);
        mappings.insert(ObjectKind::Player, player);

        let merged = flatten(&mappings);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["shared.tex"], PathBuf::from("/p/shared.tex"));
    }
}
