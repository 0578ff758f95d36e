//! File-backed content store.
//!
//! Persists a `ManifestFile` JSON document at `<root>/manifest.json` mapping
//! content hashes to file names under `<root>`. Writes use the same atomic
//! `.tmp` + rename pattern as the configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use pairsync_core::content::{ContentRecord, ContentResolver};
use pairsync_core::error::{store_io_err, StoreError};
use pairsync_core::types::ContentHash;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Hash → stored path, relative to the store root unless absolute.
pub type Records = BTreeMap<String, PathBuf>;

/// On-disk manifest payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestFile {
    pub updated_at: DateTime<Utc>,
    pub records: Records,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestCompat {
    Structured(ManifestStructuredCompat),
    Legacy(Records),
}

#[derive(Debug, Deserialize)]
struct ManifestStructuredCompat {
    updated_at: Option<DateTime<Utc>>,
    records: Records,
}

/// Summary returned by [`FileContentStore::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub root: PathBuf,
    pub updated_at: DateTime<Utc>,
    pub records: usize,
    /// Hashes whose file no longer exists.
    pub missing: Vec<String>,
}

/// A content store rooted at one directory.
#[derive(Debug)]
pub struct FileContentStore {
    root: PathBuf,
    manifest: Mutex<ManifestFile>,
}

impl FileContentStore {
    /// Open (and create if needed) the store at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| store_io_err(&root, e))?;
        let manifest = load_manifest(&manifest_path(&root))?;
        Ok(Self {
            root,
            manifest: Mutex::new(manifest),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        manifest_path(&self.root)
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `file` into the store under its SHA-256 hex digest.
    ///
    /// The manifest is updated in memory; call `persist_manifest` to save it.
    pub fn ingest(&self, file: &Path) -> Result<ContentRecord, StoreError> {
        let bytes = std::fs::read(file).map_err(|e| store_io_err(file, e))?;
        let hash = hex::encode(Sha256::digest(&bytes));
        let name = match file.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{hash}.{}", ext.to_ascii_lowercase()),
            None => hash.clone(),
        };
        let dest = self.root.join(&name);
        if !dest.exists() {
            std::fs::write(&dest, &bytes).map_err(|e| store_io_err(&dest, e))?;
        }
        self.lock().records.insert(hash.clone(), PathBuf::from(&name));
        tracing::debug!(%hash, source = %file.display(), "ingested content");
        Ok(ContentRecord {
            hash: ContentHash(hash),
            path: dest,
        })
    }

    pub fn status(&self) -> StoreStatus {
        let manifest = self.lock();
        let missing = manifest
            .records
            .iter()
            .filter(|(_, path)| !self.root.join(path).is_file())
            .map(|(hash, _)| hash.clone())
            .collect();
        StoreStatus {
            root: self.root.clone(),
            updated_at: manifest.updated_at,
            records: manifest.records.len(),
            missing,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManifestFile> {
        self.manifest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ContentResolver for FileContentStore {
    fn resolve(&self, hash: &ContentHash) -> Option<ContentRecord> {
        let stored = self.lock().records.get(&hash.0).cloned()?;
        let path = self.root.join(stored);
        if !path.is_file() {
            tracing::debug!(%hash, path = %path.display(), "manifest entry points at a missing file");
            return None;
        }
        Some(ContentRecord {
            hash: hash.clone(),
            path,
        })
    }

    fn migrate_legacy_record(
        &self,
        record: &ContentRecord,
        extension_hint: &str,
    ) -> Result<ContentRecord, StoreError> {
        let mut manifest = self.lock();
        if !manifest.records.contains_key(&record.hash.0) {
            return Err(StoreError::UnknownHash(record.hash.0.clone()));
        }
        let name = format!("{}.{}", record.hash, extension_hint.to_ascii_lowercase());
        let dest = self.root.join(&name);
        if record.path != dest {
            std::fs::rename(&record.path, &dest).map_err(|e| store_io_err(&record.path, e))?;
        }
        manifest.records.insert(record.hash.0.clone(), PathBuf::from(name));
        Ok(ContentRecord {
            hash: record.hash.clone(),
            path: dest,
        })
    }

    /// Write the manifest atomically: `manifest.json.tmp` then rename.
    fn persist_manifest(&self) -> Result<(), StoreError> {
        let mut manifest = self.lock();
        manifest.updated_at = Utc::now();
        let json = serde_json::to_string_pretty(&*manifest)?;
        let path = self.manifest_path();
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| store_io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| store_io_err(&path, e))?;
        Ok(())
    }
}

fn manifest_path(root: &Path) -> PathBuf {
    root.join(MANIFEST_FILE)
}

/// Load a manifest, returning an empty one if the file does not yet exist.
fn load_manifest(path: &Path) -> Result<ManifestFile, StoreError> {
    if !path.exists() {
        return Ok(ManifestFile {
            updated_at: Utc::now(),
            records: Records::new(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| store_io_err(path, e))?;
    match serde_json::from_str::<ManifestCompat>(&contents)? {
        ManifestCompat::Structured(manifest) => Ok(ManifestFile {
            updated_at: manifest.updated_at.unwrap_or_else(Utc::now),
            records: manifest.records,
        }),
        ManifestCompat::Legacy(records) => Ok(ManifestFile {
            updated_at: Utc::now(),
            records,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_store_when_manifest_missing() {
        let tmp = TempDir::new().unwrap();
        let store = FileContentStore::open(tmp.path()).unwrap();
        assert!(store.is_empty());
        assert!(store.resolve(&ContentHash::from("nope")).is_none());
    }

    #[test]
    fn ingest_persist_reopen_resolves() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("body.MDL");
        std::fs::write(&source, b"model bytes").unwrap();
        let root = tmp.path().join("store");

        let store = FileContentStore::open(&root).unwrap();
        let record = store.ingest(&source).unwrap();
        assert_eq!(record.hash.0.len(), 64);
        assert_eq!(record.extension().as_deref(), Some("mdl"));
        store.persist_manifest().unwrap();
        assert!(!store.manifest_path().with_extension("json.tmp").exists());

        let reopened = FileContentStore::open(&root).unwrap();
        assert_eq!(reopened.resolve(&record.hash), Some(record));
    }

    #[test]
    fn resolve_requires_file_on_disk() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("tex.tex");
        std::fs::write(&source, b"texture").unwrap();
        let store = FileContentStore::open(tmp.path().join("store")).unwrap();
        let record = store.ingest(&source).unwrap();

        std::fs::remove_file(&record.path).unwrap();
        assert!(store.resolve(&record.hash).is_none());
        assert_eq!(store.status().missing, vec![record.hash.0.clone()]);
    }

    #[test]
    fn load_legacy_flat_map() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("deadbeef"), b"legacy").unwrap();
        std::fs::write(
            tmp.path().join(MANIFEST_FILE),
            r#"{"deadbeef":"deadbeef","cafebabe":"cafebabe.tex"}"#,
        )
        .unwrap();

        let before = Utc::now();
        let store = FileContentStore::open(tmp.path()).unwrap();
        let status = store.status();
        assert_eq!(status.records, 2);
        assert_eq!(status.missing, vec!["cafebabe".to_string()]);
        assert!(status.updated_at >= before);
    }

    #[test]
    fn migrate_renames_to_hash_and_extension() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("deadbeef"), b"legacy").unwrap();
        std::fs::write(tmp.path().join(MANIFEST_FILE), r#"{"records":{"deadbeef":"deadbeef"}}"#)
            .unwrap();
        let store = FileContentStore::open(tmp.path()).unwrap();
        let hash = ContentHash::from("deadbeef");
        let legacy = store.resolve(&hash).unwrap();

        let migrated = store.migrate_legacy_record(&legacy, "MDL").unwrap();
        assert_eq!(migrated.path, tmp.path().join("deadbeef.mdl"));
        assert!(migrated.path.is_file());
        assert!(!legacy.path.exists());
        assert_eq!(store.resolve(&hash), Some(migrated));
    }

    #[test]
    fn migrate_unknown_hash_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = FileContentStore::open(tmp.path()).unwrap();
        let record = ContentRecord {
            hash: ContentHash::from("ghost"),
            path: tmp.path().join("ghost"),
        };
        let err = store.migrate_legacy_record(&record, "tex").unwrap_err();
        assert!(matches!(err, StoreError::UnknownHash(h) if h == "ghost"));
    }
}
