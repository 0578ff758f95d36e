//! Contracts for the mutation backends driven by the orchestrator.
//!
//! All `apply` calls must be idempotent for identical payloads.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::generation::CancelGuard;
use crate::trace::CorrelationId;
use crate::types::{ChangeKind, TargetHandle};

/// Game path → local file (or swap path) handed to the rendering backend.
pub type ResolvedMapping = BTreeMap<String, PathBuf>;

/// One customization feature (palette, body scale, heels, title, appearance).
#[async_trait]
pub trait FeatureBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(
        &self,
        target: &TargetHandle,
        payload: &str,
        trace: &CorrelationId,
        cancel: &CancelGuard,
    ) -> Result<(), BackendError>;

    async fn revert(&self, target: &TargetHandle) -> Result<(), BackendError>;

    /// Current payload as observed on the target, for backends that can read it back.
    async fn capture(&self, _target: &TargetHandle) -> Result<Option<String>, BackendError> {
        Ok(None)
    }
}

/// Asset redirection, manipulation payloads and redraws.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn apply_files(
        &self,
        target: &TargetHandle,
        mapping: &ResolvedMapping,
        trace: &CorrelationId,
        cancel: &CancelGuard,
    ) -> Result<(), BackendError>;

    async fn apply_manipulation(
        &self,
        target: &TargetHandle,
        payload: Option<&str>,
        trace: &CorrelationId,
        cancel: &CancelGuard,
    ) -> Result<(), BackendError>;

    async fn redraw(
        &self,
        target: &TargetHandle,
        trace: &CorrelationId,
        cancel: &CancelGuard,
    ) -> Result<(), BackendError>;

    /// Drop every redirection and manipulation applied to `target`.
    async fn revert(&self, target: &TargetHandle) -> Result<(), BackendError>;
}

/// The full set of backends one orchestrator drives.
#[derive(Clone)]
pub struct Backends {
    pub render: Arc<dyn RenderBackend>,
    pub appearance: Arc<dyn FeatureBackend>,
    pub body_scale: Arc<dyn FeatureBackend>,
    pub palette: Arc<dyn FeatureBackend>,
    pub heels: Arc<dyn FeatureBackend>,
    pub title: Arc<dyn FeatureBackend>,
}

impl Backends {
    /// Feature backend responsible for a customization change kind.
    pub fn feature(&self, kind: ChangeKind) -> Option<&Arc<dyn FeatureBackend>> {
        match kind {
            ChangeKind::Palette => Some(&self.palette),
            ChangeKind::BodyScale => Some(&self.body_scale),
            ChangeKind::HeelsOffset => Some(&self.heels),
            ChangeKind::TitleText => Some(&self.title),
            ChangeKind::AppearanceDescription => Some(&self.appearance),
            ChangeKind::ModFiles | ChangeKind::ModManipulation => None,
        }
    }
}
