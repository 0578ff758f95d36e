//! Contracts for the content-addressed store and the asset fetcher.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{BackendError, StoreError};
use crate::generation::CancelGuard;
use crate::types::{AssetReference, ContentHash, TargetIdentity};

/// A locally available piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub hash: ContentHash,
    pub path: PathBuf,
}

impl ContentRecord {
    /// Extension of the stored file, lowercased.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Maps content hashes to local files.
///
/// Calls are blocking; async callers run them on the blocking pool.
pub trait ContentResolver: Send + Sync {
    fn resolve(&self, hash: &ContentHash) -> Option<ContentRecord>;

    /// Bring a record stored without its file extension in line with `extension_hint`.
    fn migrate_legacy_record(
        &self,
        record: &ContentRecord,
        extension_hint: &str,
    ) -> Result<ContentRecord, StoreError>;

    fn persist_manifest(&self) -> Result<(), StoreError>;
}

/// Downloads missing content into the resolver's store.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(
        &self,
        target: &TargetIdentity,
        missing: &[AssetReference],
        cancel: &CancelGuard,
    ) -> Result<(), BackendError>;

    /// Hashes the fetcher has determined cannot currently be obtained.
    fn forbidden_transfers(&self) -> HashSet<ContentHash>;
}
