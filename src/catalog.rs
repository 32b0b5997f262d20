//! The catalog seam: what the scanner needs from persistent storage

use std::ops::{Deref, DerefMut};
use std::path::Path;

use crate::error::CatalogError;
use crate::models::{CatalogEntry, Digest, EntryId};

/// Persistent store of catalog entries, unique by path and by digest.
///
/// Implementations enforce both uniqueness constraints themselves; the scanner
/// relies on them as the final arbiter. Writers must be serialized by the
/// implementation if it is shared.
pub trait Catalog {
    fn find_by_id(&self, id: EntryId) -> Result<Option<CatalogEntry>, CatalogError>;

    fn find_by_path(&self, path: &Path) -> Result<Option<CatalogEntry>, CatalogError>;

    fn find_by_digest(&self, digest: &Digest) -> Result<Option<CatalogEntry>, CatalogError>;

    /// Store a new entry and return it with its assigned id
    fn insert(&mut self, entry: CatalogEntry) -> Result<CatalogEntry, CatalogError>;

    /// Overwrite an existing entry, matched by id
    fn update(&mut self, entry: CatalogEntry) -> Result<CatalogEntry, CatalogError>;

    /// Every entry, in id order
    fn entries(&self) -> Result<Vec<CatalogEntry>, CatalogError>;

    fn begin_batch(&mut self) -> Result<(), CatalogError>;

    fn commit_batch(&mut self) -> Result<(), CatalogError>;

    fn rollback_batch(&mut self) -> Result<(), CatalogError>;
}

/// Open a batch transaction on `catalog`.
///
/// The scope commits only through [`BatchScope::commit`]; dropping it any
/// other way rolls the batch back.
pub fn open_batch_transaction<C: Catalog + ?Sized>(
    catalog: &mut C,
) -> Result<BatchScope<'_, C>, CatalogError> {
    catalog.begin_batch()?;
    Ok(BatchScope {
        catalog,
        finished: false,
    })
}

/// A live batch transaction; derefs to the catalog
pub struct BatchScope<'a, C: Catalog + ?Sized> {
    catalog: &'a mut C,
    finished: bool,
}

impl<C: Catalog + ?Sized> BatchScope<'_, C> {
    pub fn commit(mut self) -> Result<(), CatalogError> {
        self.finished = true;
        if let Err(e) = self.catalog.commit_batch() {
            if let Err(rollback_err) = self.catalog.rollback_batch() {
                log::error!("Rollback after failed commit also failed: {}", rollback_err);
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), CatalogError> {
        self.finished = true;
        self.catalog.rollback_batch()
    }
}

impl<C: Catalog + ?Sized> Deref for BatchScope<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.catalog
    }
}

impl<C: Catalog + ?Sized> DerefMut for BatchScope<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.catalog
    }
}

impl<C: Catalog + ?Sized> Drop for BatchScope<'_, C> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.catalog.rollback_batch() {
                log::error!("Failed to roll back abandoned batch: {}", e);
            }
        }
    }
}
