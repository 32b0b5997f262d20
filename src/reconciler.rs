//! Reconciliation of filesystem state against the catalog
//!
//! For every discovered file the [`Reconciler`] decides a [`Disposition`]
//! and the orchestrator applies it with [`Reconciler::apply`]. Lookups go
//! through the open batch, so a file reconciled later in the same batch sees
//! the writes of the files before it.
//!
//! Duplicate content collapses onto one entry. The first path to claim a
//! digest during a run is authoritative; later paths with the same digest
//! are `Unchanged` and never inserted. Files are fed in lexical path order,
//! which makes the authoritative path deterministic.

use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::Catalog;
use crate::classifier::{classify, detect_mime_type};
use crate::discovery::{created_time, modified_time};
use crate::error::{CatalogError, FileError, FileErrorKind, HashError};
use crate::hasher::FileHasher;
use crate::models::{file_name_of, CatalogEntry, Digest, DiscoveredFile, Disposition, EntryChange};

/// Digests already accounted for during one run, with the path that claimed each
#[derive(Debug, Clone, Default)]
pub struct DigestClaims {
    claimed: HashMap<Digest, PathBuf>,
}

impl DigestClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path that claimed `digest` in this run, if any
    pub fn owner(&self, digest: &Digest) -> Option<&Path> {
        self.claimed.get(digest).map(PathBuf::as_path)
    }

    /// Record `path` as authoritative for `digest` unless another path got there first
    pub fn claim(&mut self, digest: Digest, path: &Path) {
        self.claimed
            .entry(digest)
            .or_insert_with(|| path.to_path_buf());
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

/// Decides what happens to each discovered file
pub struct Reconciler<'h> {
    hasher: &'h FileHasher,
}

impl<'h> Reconciler<'h> {
    pub fn new(hasher: &'h FileHasher) -> Self {
        Self { hasher }
    }

    /// Hash `file` and reconcile it. Never fails; problems become `Disposition::Error`.
    pub fn reconcile<C: Catalog + ?Sized>(
        &self,
        catalog: &C,
        file: &DiscoveredFile,
        incremental: bool,
        claims: &mut DigestClaims,
    ) -> Disposition {
        let digest = self.hasher.hash(&file.path);
        self.reconcile_with_digest(catalog, file, digest, incremental, claims)
    }

    /// Reconcile with a digest computed ahead of time (e.g. by a batch hash)
    pub fn reconcile_with_digest<C: Catalog + ?Sized>(
        &self,
        catalog: &C,
        file: &DiscoveredFile,
        digest: Result<Digest, HashError>,
        incremental: bool,
        claims: &mut DigestClaims,
    ) -> Disposition {
        match decide(catalog, file, digest, incremental, claims) {
            Ok(disposition) => disposition,
            Err(e) => {
                log::error!("{}", e);
                Disposition::Error(e)
            }
        }
    }

    /// Re-check a stored entry against its file, re-hashing only when the
    /// file's modification time is newer than the stored one.
    pub fn reconcile_entry<C: Catalog + ?Sized>(
        &self,
        catalog: &C,
        entry: &CatalogEntry,
    ) -> Disposition {
        match self.refresh(catalog, entry) {
            Ok(disposition) => disposition,
            Err(e) => {
                log::error!("{}", e);
                Disposition::Error(e)
            }
        }
    }

    fn refresh<C: Catalog + ?Sized>(
        &self,
        catalog: &C,
        entry: &CatalogEntry,
    ) -> Result<Disposition, FileError> {
        let path = entry.path.as_path();
        let metadata = fs::metadata(path).map_err(|e| {
            FileError::new(
                FileErrorKind::FileAccess,
                path,
                format!("file no longer accessible: {e}"),
            )
        })?;
        let modified_at = modified_time(&metadata);
        if modified_at <= entry.modified_at {
            return Ok(Disposition::Unchanged);
        }

        let digest = self
            .hasher
            .hash(path)
            .map_err(|e| FileError::from_hash(path, &e))?;

        if digest != entry.digest {
            let holder = catalog
                .find_by_digest(&digest)
                .map_err(|e| FileError::catalog(path, &e))?;
            if let Some(other) = holder.filter(|other| other.id != entry.id) {
                return Err(FileError::new(
                    FileErrorKind::CatalogWrite,
                    path,
                    format!("new content duplicates entry at {:?}", other.path),
                ));
            }
        }

        let mut updated = entry.clone();
        updated.size = metadata.len();
        updated.modified_at = modified_at;
        updated.last_scanned_at = Utc::now();
        if digest != entry.digest {
            updated.digest = digest;
            updated.is_processed = false;
        }
        Ok(Disposition::Updated(EntryChange {
            entry: updated,
            previous_path: entry.path.clone(),
            previous_digest: entry.digest.clone(),
        }))
    }

    /// Write a disposition to the catalog
    pub fn apply<C: Catalog + ?Sized>(
        catalog: &mut C,
        disposition: &Disposition,
    ) -> Result<(), CatalogError> {
        match disposition {
            Disposition::New(entry) => {
                catalog.insert(entry.clone())?;
            }
            Disposition::Updated(change) | Disposition::Moved(change) => {
                catalog.update(change.entry.clone())?;
            }
            Disposition::Unchanged | Disposition::Error(_) => {}
        }
        Ok(())
    }
}

fn decide<C: Catalog + ?Sized>(
    catalog: &C,
    file: &DiscoveredFile,
    digest: Result<Digest, HashError>,
    incremental: bool,
    claims: &mut DigestClaims,
) -> Result<Disposition, FileError> {
    let path = file.path.as_path();
    // Stat again: the file may have changed or vanished since discovery
    let metadata = fs::metadata(path).map_err(|e| FileError::access(path, &e))?;
    if !metadata.is_file() {
        return Err(FileError::new(
            FileErrorKind::FileAccess,
            path,
            "not a regular file",
        ));
    }
    let modified_at = modified_time(&metadata);
    let digest = digest.map_err(|e| FileError::from_hash(path, &e))?;
    let catalog_err = |e: CatalogError| FileError::catalog(path, &e);

    if let Some(owner) = claims.owner(&digest) {
        if owner != path {
            log::debug!("{:?} duplicates {:?}", path, owner);
            return Ok(Disposition::Unchanged);
        }
    }

    let by_path = catalog.find_by_path(path).map_err(catalog_err)?;
    if incremental {
        if let Some(existing) = &by_path {
            if existing.digest == digest && existing.modified_at == modified_at {
                claims.claim(digest, path);
                return Ok(Disposition::Unchanged);
            }
        }
    }

    let by_digest = catalog.find_by_digest(&digest).map_err(catalog_err)?;
    let disposition = match (by_digest, by_path) {
        (Some(existing), _) if existing.path == path && existing.modified_at == modified_at => {
            Disposition::Unchanged
        }
        (Some(existing), Some(occupant)) if occupant.id != existing.id => {
            // The path's own entry is stale, but its new bytes already belong to another entry
            log::warn!(
                "{:?} now holds the content of {:?}; keeping the existing entry",
                path,
                existing.path
            );
            Disposition::Unchanged
        }
        (Some(existing), _) => {
            let mut entry = existing.clone();
            entry.path = path.to_path_buf();
            entry.name = file_name_of(path);
            entry.size = metadata.len();
            entry.modified_at = modified_at;
            entry.last_scanned_at = Utc::now();
            let change = EntryChange {
                entry,
                previous_path: existing.path,
                previous_digest: existing.digest,
            };
            if change.path_changed() {
                Disposition::Moved(change)
            } else {
                Disposition::Updated(change)
            }
        }
        (None, Some(existing)) => {
            let mut entry = existing.clone();
            entry.digest = digest.clone();
            entry.size = metadata.len();
            entry.modified_at = modified_at;
            entry.mime_type = detect_mime_type(path);
            entry.media_type = classify(path);
            entry.last_scanned_at = Utc::now();
            entry.is_processed = false;
            Disposition::Updated(EntryChange {
                entry,
                previous_path: existing.path,
                previous_digest: existing.digest,
            })
        }
        (None, None) => Disposition::New(CatalogEntry::new(
            path.to_path_buf(),
            metadata.len(),
            digest.clone(),
            classify(path),
            detect_mime_type(path),
            created_time(&metadata),
            modified_at,
        )),
    };

    claims.claim(digest, path);
    Ok(disposition)
}
