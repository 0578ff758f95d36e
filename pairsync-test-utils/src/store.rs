//! In-memory content resolver and a fetcher that delivers on a script.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use pairsync_core::content::{AssetFetcher, ContentRecord, ContentResolver};
use pairsync_core::error::{BackendError, StoreError};
use pairsync_core::generation::CancelGuard;
use pairsync_core::types::{AssetReference, ContentHash, TargetIdentity};

// ---------------------------------------------------------------------------
// MemoryResolver
// ---------------------------------------------------------------------------

/// [`ContentResolver`] over a hash map. Paths are never touched on disk.
#[derive(Default)]
pub struct MemoryResolver {
    records: Mutex<HashMap<ContentHash, PathBuf>>,
    migrations: Mutex<Vec<(ContentHash, String)>>,
    resolve_calls: AtomicUsize,
    persist_calls: AtomicUsize,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, hash: impl Into<ContentHash>, path: impl Into<PathBuf>) {
        self.records
            .lock()
            .unwrap()
            .insert(hash.into(), path.into());
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.records.lock().unwrap().contains_key(hash)
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }

    /// `(hash, extension)` pairs passed to `migrate_legacy_record`.
    pub fn migrations(&self) -> Vec<(ContentHash, String)> {
        self.migrations.lock().unwrap().clone()
    }
}

impl ContentResolver for MemoryResolver {
    fn resolve(&self, hash: &ContentHash) -> Option<ContentRecord> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .get(hash)
            .map(|path| ContentRecord {
                hash: hash.clone(),
                path: path.clone(),
            })
    }

    fn migrate_legacy_record(
        &self,
        record: &ContentRecord,
        extension_hint: &str,
    ) -> Result<ContentRecord, StoreError> {
        let path = record.path.with_extension(extension_hint);
        let mut records = self.records.lock().unwrap();
        if !records.contains_key(&record.hash) {
            return Err(StoreError::UnknownHash(record.hash.0.clone()));
        }
        records.insert(record.hash.clone(), path.clone());
        self.migrations
            .lock()
            .unwrap()
            .push((record.hash.clone(), extension_hint.to_owned()));
        Ok(ContentRecord {
            hash: record.hash.clone(),
            path,
        })
    }

    fn persist_manifest(&self) -> Result<(), StoreError> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedFetcher
// ---------------------------------------------------------------------------

struct Delivery {
    hash: ContentHash,
    path: PathBuf,
    on_call: usize,
}

#[derive(Default)]
struct FetchState {
    calls: usize,
    deliveries: Vec<Delivery>,
    unobtainable: HashSet<ContentHash>,
    forbidden: HashSet<ContentHash>,
    requested: Vec<Vec<ContentHash>>,
    failing: bool,
}

/// [`AssetFetcher`] that writes scripted records into a [`MemoryResolver`].
pub struct ScriptedFetcher {
    resolver: Arc<MemoryResolver>,
    state: Mutex<FetchState>,
}

impl ScriptedFetcher {
    pub fn new(resolver: Arc<MemoryResolver>) -> Self {
        Self {
            resolver,
            state: Mutex::new(FetchState::default()),
        }
    }

    /// Make `hash` resolvable once the fetcher has been called `on_call` times.
    pub fn deliver_on_call(&self, on_call: usize, hash: impl Into<ContentHash>, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().deliveries.push(Delivery {
            hash: hash.into(),
            path: path.into(),
            on_call,
        });
    }

    /// `hash` is reported forbidden the first time it is requested.
    pub fn refuse(&self, hash: impl Into<ContentHash>) {
        self.state.lock().unwrap().unobtainable.insert(hash.into());
    }

    /// Every subsequent call fails with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    /// Hashes requested by each call, in call order.
    pub fn requested(&self) -> Vec<Vec<ContentHash>> {
        self.state.lock().unwrap().requested.clone()
    }
}

#[async_trait]
impl AssetFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        _target: &TargetIdentity,
        missing: &[AssetReference],
        _cancel: &CancelGuard,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        let hashes: Vec<ContentHash> = missing.iter().map(|r| r.hash.clone()).collect();
        state.requested.push(hashes.clone());

        if state.failing {
            return Err(BackendError::Unavailable {
                backend: "fetcher",
                reason: "scripted failure".to_string(),
            });
        }

        for hash in hashes {
            if state.unobtainable.contains(&hash) {
                state.forbidden.insert(hash);
            }
        }
        let calls = state.calls;
        for delivery in state.deliveries.iter().filter(|d| d.on_call <= calls) {
            self.resolver.insert(delivery.hash.clone(), delivery.path.clone());
        }
        Ok(())
    }

    fn forbidden_transfers(&self) -> HashSet<ContentHash> {
        self.state.lock().unwrap().forbidden.clone()
    }
}
