//! Scan orchestration: discovery, batched reconciliation, reporting
//!
//! A scan moves through `Discovering -> Processing -> Finalizing -> Done`.
//! Files are reconciled in fixed-size batches, each inside one catalog
//! transaction, so an interrupted scan loses at most the batch in flight.
//! Batches run one after another; within a batch the hashes are computed
//! in parallel and the catalog writes are applied in path order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::catalog::{open_batch_transaction, Catalog};
use crate::config::{
    ScanConfig, DEFAULT_BATCH_SIZE, DEFAULT_MAX_REPORTED_ERRORS, DEFAULT_PROGRESS_INTERVAL,
};
use crate::discovery::discover;
use crate::error::{FileError, FileErrorKind, HashError, ScanError};
use crate::hasher::FileHasher;
use crate::models::{CatalogEntry, DiscoveredFile, Disposition, EntryId, ScanReport};
use crate::progress::{ProgressCallback, ScanPhase};
use crate::reconciler::{DigestClaims, Reconciler};

/// Runs scans against one catalog with one hasher
pub struct ScanOrchestrator<C: Catalog> {
    catalog: C,
    hasher: FileHasher,
    batch_size: usize,
    progress_interval: u64,
    max_reported_errors: usize,
    extensions: HashSet<String>,
    progress: Option<ProgressCallback>,
    phase: ScanPhase,
}

impl<C: Catalog> ScanOrchestrator<C> {
    /// Create an orchestrator with default batch size and extension filter
    pub fn new(catalog: C, hasher: FileHasher) -> Self {
        Self {
            catalog,
            hasher,
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            max_reported_errors: DEFAULT_MAX_REPORTED_ERRORS,
            extensions: crate::classifier::supported_extensions(),
            progress: None,
            phase: ScanPhase::Idle,
        }
    }

    /// Create an orchestrator and its hasher from a config
    pub fn from_config(catalog: C, config: &ScanConfig) -> Result<Self, ScanError> {
        let hasher = FileHasher::new(config.effective_workers())?;
        Ok(Self {
            batch_size: config.effective_batch_size(),
            progress_interval: config.progress_interval,
            max_reported_errors: config.max_reported_errors,
            extensions: config.extensions.clone(),
            ..Self::new(catalog, hasher)
        })
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Replace the extension filter; an empty set accepts every file
    pub fn with_extensions(mut self, extensions: HashSet<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut C {
        &mut self.catalog
    }

    pub fn hasher(&self) -> &FileHasher {
        &self.hasher
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// Stop the hash pool and hand the catalog back
    pub fn shutdown(self) -> C {
        let Self {
            catalog,
            mut hasher,
            ..
        } = self;
        hasher.shutdown();
        catalog
    }

    /// Scan `root` into the catalog.
    ///
    /// Only an invalid root or an unrecoverable catalog failure returns `Err`;
    /// per-file problems are counted in the report.
    pub fn scan_directory(
        &mut self,
        root: &Path,
        recursive: bool,
        include_hidden: bool,
        incremental: bool,
    ) -> Result<ScanReport, ScanError> {
        let start = Instant::now();
        let mut report = ScanReport::new();

        log::info!("Starting scan of {:?}", root);
        log::info!(
            "Options: recursive={}, include_hidden={}, incremental={}",
            recursive,
            include_hidden,
            incremental
        );

        self.phase = ScanPhase::Discovering;
        let mut discovery = match discover(root, recursive, include_hidden, &self.extensions) {
            Ok(discovery) => discovery,
            Err(e) => {
                self.phase = ScanPhase::Idle;
                return Err(e);
            }
        };
        let mut files: Vec<DiscoveredFile> = discovery.by_ref().collect();
        report.discovery_errors = discovery.skipped();
        // Lexical order decides which of several identical files becomes the entry
        files.sort_by(|a, b| a.path.cmp(&b.path));
        report.total_files = files.len() as u64;
        report.total_size = files.iter().map(|f| f.size).sum();
        log::info!("Found {} media files under {:?}", files.len(), discovery.root());

        self.phase = ScanPhase::Processing;
        if let Err(e) = self.process_files(&files, incremental, &mut report) {
            self.phase = ScanPhase::Idle;
            return Err(e);
        }

        Ok(self.finalize(report, start, "Scan"))
    }

    /// Walk the catalog instead of the filesystem, re-hashing only entries
    /// whose file has a newer modification time than the stored one.
    pub fn rescan_modified(&mut self) -> Result<ScanReport, ScanError> {
        let start = Instant::now();
        let mut report = ScanReport::new();
        log::info!("Starting rescan of modified files...");

        self.phase = ScanPhase::Processing;
        let entries = match self.catalog.entries() {
            Ok(entries) => entries,
            Err(e) => {
                self.phase = ScanPhase::Idle;
                return Err(e.into());
            }
        };
        report.total_files = entries.len() as u64;

        if let Err(e) = self.process_entries(&entries, &mut report) {
            self.phase = ScanPhase::Idle;
            return Err(e);
        }

        Ok(self.finalize(report, start, "Rescan"))
    }

    /// Point-in-time check that the entry's file exists and still hashes to
    /// the stored digest
    pub fn verify_integrity(&self, id: EntryId) -> bool {
        let entry = match self.catalog.find_by_id(id) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                log::error!("Media item not found: {}", id);
                return false;
            }
            Err(e) => {
                log::error!("Integrity verification failed for {}: {}", id, e);
                return false;
            }
        };
        if !entry.path.is_file() {
            log::error!("File no longer exists: {:?}", entry.path);
            return false;
        }
        self.hasher.verify(&entry.path, &entry.digest)
    }

    fn process_files(
        &mut self,
        files: &[DiscoveredFile],
        incremental: bool,
        report: &mut ScanReport,
    ) -> Result<(), ScanError> {
        let Self {
            catalog,
            hasher,
            batch_size,
            progress_interval,
            max_reported_errors,
            progress,
            ..
        } = self;
        let reconciler = Reconciler::new(hasher);
        let total = files.len() as u64;
        let mut processed = 0u64;
        let mut claims = DigestClaims::new();

        for batch in files.chunks(*batch_size) {
            let paths: Vec<PathBuf> = batch.iter().map(|f| f.path.clone()).collect();
            let mut digests = hasher.hash_batch(&paths).into_iter();
            let claims_before = claims.clone();

            let dispositions = run_batch(
                catalog,
                batch,
                |file| file.path.as_path(),
                |catalog, file| {
                    let digest = digests
                        .next()
                        .map(|(_, digest)| digest)
                        .unwrap_or_else(|| Err(HashError::NotFound(file.path.clone())));
                    let disposition =
                        reconciler.reconcile_with_digest(catalog, file, digest, incremental, &mut claims);
                    processed += 1;
                    notify(progress, *progress_interval, processed, total);
                    disposition
                },
            )?;
            if dispositions.rolled_back {
                claims = claims_before;
            }
            for disposition in &dispositions.outcomes {
                report.record(disposition, *max_reported_errors);
            }
        }

        log::debug!("{} distinct digests seen", claims.len());
        notify_done(progress, *progress_interval, total);
        Ok(())
    }

    fn process_entries(
        &mut self,
        entries: &[CatalogEntry],
        report: &mut ScanReport,
    ) -> Result<(), ScanError> {
        let Self {
            catalog,
            hasher,
            batch_size,
            progress_interval,
            max_reported_errors,
            progress,
            ..
        } = self;
        let reconciler = Reconciler::new(hasher);
        let total = entries.len() as u64;
        let mut processed = 0u64;

        for batch in entries.chunks(*batch_size) {
            let dispositions = run_batch(
                catalog,
                batch,
                |entry| entry.path.as_path(),
                |catalog, entry| {
                    let disposition = reconciler.reconcile_entry(catalog, entry);
                    processed += 1;
                    notify(progress, *progress_interval, processed, total);
                    disposition
                },
            )?;
            for (entry, disposition) in batch.iter().zip(&dispositions.outcomes) {
                report.total_size += match disposition {
                    Disposition::Updated(change) => change.entry.size,
                    _ => entry.size,
                };
                report.record(disposition, *max_reported_errors);
            }
        }

        notify_done(progress, *progress_interval, total);
        Ok(())
    }

    fn finalize(&mut self, mut report: ScanReport, start: Instant, label: &str) -> ScanReport {
        self.phase = ScanPhase::Finalizing;
        report.duration_ms = start.elapsed().as_millis() as u64;
        log::info!(
            "{} completed in {:.2}s",
            label,
            report.duration().as_secs_f64()
        );
        log::info!("{}", report);
        self.phase = ScanPhase::Done;
        report
    }
}

/// Dispositions of one batch, after any rollback
struct BatchOutcome {
    outcomes: Vec<Disposition>,
    rolled_back: bool,
}

/// Decide and apply every item of a batch inside one transaction.
///
/// If a write or the commit fails, the whole batch is rolled back and every
/// item that did not already fail on its own is reported as a catalog write
/// error. Only a failure to open the transaction is returned as `Err`.
fn run_batch<C, T, P, D>(
    catalog: &mut C,
    items: &[T],
    path_of: P,
    mut decide: D,
) -> Result<BatchOutcome, ScanError>
where
    C: Catalog + ?Sized,
    P: Fn(&T) -> &Path,
    D: FnMut(&C, &T) -> Disposition,
{
    let mut scope = open_batch_transaction(catalog)?;
    let mut decided = Vec::with_capacity(items.len());
    let mut failure = None;

    for item in items {
        let disposition = decide(&*scope, item);
        log::debug!("{:?}: {}", path_of(item), disposition.label());
        if let Err(e) = Reconciler::apply(&mut *scope, &disposition) {
            log::error!("Catalog write failed for {:?}: {}", path_of(item), e);
            failure = Some(e);
            break;
        }
        decided.push(disposition);
    }

    let failure = match failure {
        Some(e) => {
            if let Err(rollback_err) = scope.rollback() {
                log::error!("Rollback failed: {}", rollback_err);
            }
            Some(e)
        }
        None => {
            let written = decided.iter().filter(|d| d.writes()).count();
            log::debug!("Committing batch: {} of {} files written", written, items.len());
            scope.commit().err()
        }
    };

    let Some(e) = failure else {
        return Ok(BatchOutcome {
            outcomes: decided,
            rolled_back: false,
        });
    };

    log::error!("Batch of {} files rolled back: {}", items.len(), e);
    let outcomes = items
        .iter()
        .enumerate()
        .map(|(i, item)| match decided.get(i) {
            Some(err @ Disposition::Error(_)) => err.clone(),
            _ => Disposition::Error(FileError::new(
                FileErrorKind::CatalogWrite,
                path_of(item),
                format!("batch rolled back: {e}"),
            )),
        })
        .collect();
    Ok(BatchOutcome {
        outcomes,
        rolled_back: true,
    })
}

fn notify(progress: &Option<ProgressCallback>, interval: u64, processed: u64, total: u64) {
    if interval == 0 || processed % interval != 0 {
        return;
    }
    log::info!("Processed {}/{} files", processed, total);
    if let Some(callback) = progress {
        callback(processed, total);
    }
}

/// Completion call, unless the cadence already delivered `(total, total)`
fn notify_done(progress: &Option<ProgressCallback>, interval: u64, total: u64) {
    if total > 0 && interval > 0 && total % interval == 0 {
        return;
    }
    if let Some(callback) = progress {
        callback(total, total);
    }
}
