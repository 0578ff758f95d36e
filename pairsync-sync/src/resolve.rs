//! Asset resolution with bounded fetch rounds.
//!
//! Each round resolves every pending reference through the content resolver
//! (on the blocking pool, bounded parallelism), then asks the fetcher for what
//! is still missing. The loop ends when nothing is missing, when every missing
//! hash is a known forbidden transfer, or after the configured number of
//! fetch rounds. A partial result is still returned.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use pairsync_core::backend::ResolvedMapping;
use pairsync_core::config::ApplySettings;
use pairsync_core::content::{AssetFetcher, ContentRecord, ContentResolver};
use pairsync_core::error::Cancelled;
use pairsync_core::generation::CancelGuard;
use pairsync_core::types::{AssetReference, ContentHash, ObjectKind, TargetIdentity};

/// Outcome of one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Game path → local path, per category.
    pub mappings: BTreeMap<ObjectKind, ResolvedMapping>,
    /// References that never resolved.
    pub missing: Vec<(ObjectKind, AssetReference)>,
    /// Number of fetcher calls made.
    pub fetch_rounds: usize,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

struct Lookup {
    kind: ObjectKind,
    reference: AssetReference,
    record: Option<ContentRecord>,
    migrated: bool,
}

pub struct AssetResolver {
    resolver: Arc<dyn ContentResolver>,
    fetcher: Arc<dyn AssetFetcher>,
    settings: ApplySettings,
}

impl AssetResolver {
    pub fn new(
        resolver: Arc<dyn ContentResolver>,
        fetcher: Arc<dyn AssetFetcher>,
        settings: ApplySettings,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            settings,
        }
    }

    /// Resolve every reference of `categories` into per-category mappings.
    pub async fn resolve(
        &self,
        target: &TargetIdentity,
        categories: BTreeMap<ObjectKind, Vec<AssetReference>>,
        cancel: &CancelGuard,
    ) -> Result<Resolution, Cancelled> {
        let mut resolution = Resolution::default();
        let mut pending = Vec::new();

        for (kind, references) in categories {
            let mapping = resolution.mappings.entry(kind).or_default();
            for reference in references {
                let Some(swap) = reference.swap_path.as_deref().map(PathBuf::from) else {
                    pending.push((kind, reference));
                    continue;
                };
                for game_path in &reference.game_paths {
                    mapping.insert(game_path.clone(), swap.clone());
                }
            }
        }

        loop {
            let lookups = self.lookup_all(std::mem::take(&mut pending), cancel).await?;
            let mut migrated = false;
            for lookup in lookups {
                migrated |= lookup.migrated;
                match lookup.record {
                    Some(record) => {
                        let mapping = resolution.mappings.entry(lookup.kind).or_default();
                        for game_path in &lookup.reference.game_paths {
                            mapping.insert(game_path.clone(), record.path.clone());
                        }
                    }
                    None => pending.push((lookup.kind, lookup.reference)),
                }
            }
            if migrated {
                self.persist_manifest().await;
            }

            if pending.is_empty() {
                break;
            }

            let forbidden = self.fetcher.forbidden_transfers();
            if pending.iter().all(|(_, r)| forbidden.contains(&r.hash)) {
                tracing::warn!(
                    identity = %target,
                    missing = pending.len(),
                    "every missing asset is a forbidden transfer; applying without them"
                );
                break;
            }
            if resolution.fetch_rounds >= self.settings.fetch_rounds {
                tracing::warn!(
                    identity = %target,
                    missing = pending.len(),
                    rounds = resolution.fetch_rounds,
                    "assets still missing after final fetch round; applying partial mapping"
                );
                break;
            }

            if resolution.fetch_rounds > 0 {
                cancel.sleep(self.settings.fetch_retry_delay()).await?;
            }
            resolution.fetch_rounds += 1;
            let request = fetch_request(&pending, &forbidden);
            tracing::debug!(
                identity = %target,
                round = resolution.fetch_rounds,
                missing = request.len(),
                "fetching missing assets"
            );
            if let Err(err) = cancel.run(self.fetcher.fetch(target, &request, cancel)).await? {
                tracing::warn!(identity = %target, round = resolution.fetch_rounds, "asset fetch failed: {err}");
            }
        }

        resolution.missing = pending;
        Ok(resolution)
    }

    /// Look up every pending reference, querying each distinct hash once so a
    /// legacy record is migrated by a single task.
    async fn lookup_all(
        &self,
        pending: Vec<(ObjectKind, AssetReference)>,
        cancel: &CancelGuard,
    ) -> Result<Vec<Lookup>, Cancelled> {
        let mut index: HashMap<ContentHash, usize> = HashMap::new();
        let mut groups: Vec<Vec<(ObjectKind, AssetReference)>> = Vec::new();
        for (kind, reference) in pending {
            let slot = *index.entry(reference.hash.clone()).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push((kind, reference));
        }

        let parallelism = self.settings.resolve_parallelism.max(1);
        let lookups = stream::iter(groups.into_iter().filter_map(|group| {
            let query = group.first()?.1.clone();
            let resolver = Arc::clone(&self.resolver);
            Some(async move {
                let hash = query.hash.clone();
                let (record, migrated) =
                    match tokio::task::spawn_blocking(move || lookup(resolver.as_ref(), &query)).await {
                        Ok(found) => found,
                        Err(err) => {
                            tracing::warn!(%hash, "content lookup task failed: {err}");
                            (None, false)
                        }
                    };
                group
                    .into_iter()
                    .map(|(kind, reference)| Lookup {
                        kind,
                        reference,
                        record: record.clone(),
                        migrated,
                    })
                    .collect::<Vec<_>>()
            })
        }))
        .buffer_unordered(parallelism)
        .collect::<Vec<_>>();

        Ok(cancel.run(lookups).await?.into_iter().flatten().collect())
    }

    async fn persist_manifest(&self) {
        let resolver = Arc::clone(&self.resolver);
        match tokio::task::spawn_blocking(move || resolver.persist_manifest()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!("failed to persist content manifest: {err}"),
            Err(err) => tracing::warn!("manifest persist task failed: {err}"),
        }
    }
}

/// Resolve one reference, migrating a record whose extension does not match.
fn lookup(resolver: &dyn ContentResolver, reference: &AssetReference) -> (Option<ContentRecord>, bool) {
    let Some(record) = resolver.resolve(&reference.hash) else {
        return (None, false);
    };
    let Some(wanted) = reference.game_paths.first().and_then(|p| extension_of(p)) else {
        return (Some(record), false);
    };
    if record.extension().as_deref() == Some(wanted.as_str()) {
        return (Some(record), false);
    }
    match resolver.migrate_legacy_record(&record, &wanted) {
        Ok(updated) => {
            tracing::debug!(hash = %record.hash, extension = %wanted, "migrated legacy content record");
            (Some(updated), true)
        }
        Err(err) => {
            tracing::warn!(hash = %record.hash, "legacy record migration failed: {err}");
            (Some(record), false)
        }
    }
}

fn extension_of(game_path: &str) -> Option<String> {
    Path::new(game_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Missing references worth asking for, one per hash.
fn fetch_request(
    pending: &[(ObjectKind, AssetReference)],
    forbidden: &HashSet<ContentHash>,
) -> Vec<AssetReference> {
    let mut seen = HashSet::new();
    pending
        .iter()
        .map(|(_, reference)| reference)
        .filter(|r| !forbidden.contains(&r.hash) && seen.insert(r.hash.clone()))
        .cloned()
        .collect()
}
