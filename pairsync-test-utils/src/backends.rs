//! Recording mutation backends.
//!
//! Every backend of one [`RecordingBackends`] set appends to the same
//! [`CallLog`], so tests can assert on the global order of calls.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use pairsync_core::backend::{Backends, FeatureBackend, RenderBackend, ResolvedMapping};
use pairsync_core::error::BackendError;
use pairsync_core::generation::CancelGuard;
use pairsync_core::trace::CorrelationId;
use pairsync_core::types::{TargetHandle, TargetIdentity};

/// One observed backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Apply {
        backend: &'static str,
        target: TargetIdentity,
        payload: String,
    },
    Revert {
        backend: &'static str,
        target: TargetIdentity,
    },
    Files {
        target: TargetIdentity,
        mapping: ResolvedMapping,
    },
    Manipulation {
        target: TargetIdentity,
        payload: Option<String>,
    },
    Redraw {
        target: TargetIdentity,
    },
}

impl BackendCall {
    pub fn target(&self) -> &TargetIdentity {
        match self {
            BackendCall::Apply { target, .. }
            | BackendCall::Revert { target, .. }
            | BackendCall::Files { target, .. }
            | BackendCall::Manipulation { target, .. }
            | BackendCall::Redraw { target } => target,
        }
    }
}

/// Shared, append-only call log.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<BackendCall>>>,
    traces: Arc<Mutex<Vec<CorrelationId>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: BackendCall, trace: Option<&CorrelationId>) {
        self.calls.lock().unwrap().push(call);
        if let Some(trace) = trace {
            self.traces.lock().unwrap().push(*trace);
        }
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Correlation ids of apply-side calls, in call order.
    pub fn traces(&self) -> Vec<CorrelationId> {
        self.traces.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
        self.traces.lock().unwrap().clear();
    }

    /// Payloads applied by `backend`, in order.
    pub fn applied(&self, backend: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Apply {
                    backend: name,
                    payload,
                    ..
                } if name == backend => Some(payload),
                _ => None,
            })
            .collect()
    }

    /// Number of calls touching `target`.
    pub fn count_for(&self, target: &TargetIdentity) -> usize {
        self.calls().iter().filter(|c| c.target() == target).count()
    }
}

// ---------------------------------------------------------------------------
// Feature backend
// ---------------------------------------------------------------------------

pub struct RecordingFeature {
    name: &'static str,
    log: CallLog,
    delay: Mutex<Option<Duration>>,
    failing: AtomicBool,
    captured: Mutex<Option<String>>,
}

impl RecordingFeature {
    pub fn new(name: &'static str, log: CallLog) -> Self {
        Self {
            name,
            log,
            delay: Mutex::new(None),
            failing: AtomicBool::new(false),
            captured: Mutex::new(None),
        }
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Value returned by `capture`, i.e. what the target currently shows.
    pub fn set_captured(&self, value: Option<&str>) {
        *self.captured.lock().unwrap() = value.map(str::to_owned);
    }
}

#[async_trait]
impl FeatureBackend for RecordingFeature {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn apply(
        &self,
        target: &TargetHandle,
        payload: &str,
        trace: &CorrelationId,
        _cancel: &CancelGuard,
    ) -> Result<(), BackendError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Failed {
                backend: self.name,
                reason: "scripted failure".to_string(),
            });
        }
        self.log.push(
            BackendCall::Apply {
                backend: self.name,
                target: target.identity.clone(),
                payload: payload.to_owned(),
            },
            Some(trace),
        );
        Ok(())
    }

    async fn revert(&self, target: &TargetHandle) -> Result<(), BackendError> {
        self.log.push(
            BackendCall::Revert {
                backend: self.name,
                target: target.identity.clone(),
            },
            None,
        );
        Ok(())
    }

    async fn capture(&self, _target: &TargetHandle) -> Result<Option<String>, BackendError> {
        Ok(self.captured.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Render backend
// ---------------------------------------------------------------------------

/// Render backend that also tracks how many of its calls overlap.
pub struct RecordingRender {
    log: CallLog,
    delay: Mutex<Option<Duration>>,
    failing: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    on_files: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl RecordingRender {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            delay: Mutex::new(None),
            failing: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            on_files: Mutex::new(None),
        }
    }

    /// Delay applied inside `apply_files`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Hook run at the start of every `apply_files` call.
    pub fn on_files(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_files.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderBackend for RecordingRender {
    async fn apply_files(
        &self,
        target: &TargetHandle,
        mapping: &ResolvedMapping,
        trace: &CorrelationId,
        _cancel: &CancelGuard,
    ) -> Result<(), BackendError> {
        if let Some(hook) = self.on_files.lock().unwrap().as_ref() {
            hook();
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Failed {
                backend: "render",
                reason: "scripted failure".to_string(),
            });
        }
        self.log.push(
            BackendCall::Files {
                target: target.identity.clone(),
                mapping: mapping.clone(),
            },
            Some(trace),
        );
        Ok(())
    }

    async fn apply_manipulation(
        &self,
        target: &TargetHandle,
        payload: Option<&str>,
        trace: &CorrelationId,
        _cancel: &CancelGuard,
    ) -> Result<(), BackendError> {
        self.log.push(
            BackendCall::Manipulation {
                target: target.identity.clone(),
                payload: payload.map(str::to_owned),
            },
            Some(trace),
        );
        Ok(())
    }

    async fn redraw(
        &self,
        target: &TargetHandle,
        trace: &CorrelationId,
        _cancel: &CancelGuard,
    ) -> Result<(), BackendError> {
        self.log.push(
            BackendCall::Redraw {
                target: target.identity.clone(),
            },
            Some(trace),
        );
        Ok(())
    }

    async fn revert(&self, target: &TargetHandle) -> Result<(), BackendError> {
        self.log.push(
            BackendCall::Revert {
                backend: "render",
                target: target.identity.clone(),
            },
            None,
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Full set
// ---------------------------------------------------------------------------

/// One recording backend per feature, plus the [`Backends`] bundle wiring them.
pub struct RecordingBackends {
    pub log: CallLog,
    pub render: Arc<RecordingRender>,
    pub appearance: Arc<RecordingFeature>,
    pub body_scale: Arc<RecordingFeature>,
    pub palette: Arc<RecordingFeature>,
    pub heels: Arc<RecordingFeature>,
    pub title: Arc<RecordingFeature>,
}

impl Default for RecordingBackends {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackends {
    pub fn new() -> Self {
        let log = CallLog::new();
        Self {
            render: Arc::new(RecordingRender::new(log.clone())),
            appearance: Arc::new(RecordingFeature::new("appearance", log.clone())),
            body_scale: Arc::new(RecordingFeature::new("body_scale", log.clone())),
            palette: Arc::new(RecordingFeature::new("palette", log.clone())),
            heels: Arc::new(RecordingFeature::new("heels", log.clone())),
            title: Arc::new(RecordingFeature::new("title", log.clone())),
            log,
        }
    }

    pub fn backends(&self) -> Backends {
        Backends {
            render: self.render.clone(),
            appearance: self.appearance.clone(),
            body_scale: self.body_scale.clone(),
            palette: self.palette.clone(),
            heels: self.heels.clone(),
            title: self.title.clone(),
        }
    }
}
