//! Incremental media scanning into a content-addressed catalog
//!
//! A scan walks a directory tree, classifies media files, hashes them on a
//! rayon pool and reconciles each file against a [`Catalog`], detecting new,
//! modified and moved files while collapsing duplicate content onto a single
//! entry.

pub mod catalog;
pub mod classifier;
pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod hasher;
pub mod models;
pub mod progress;
pub mod reconciler;
pub mod scanner;

pub use catalog::{open_batch_transaction, BatchScope, Catalog};
pub use classifier::{classify, detect_mime_type, is_supported_media};
pub use config::ScanConfig;
pub use db::SqliteCatalog;
pub use error::{CatalogError, FileError, FileErrorKind, HashError, ScanError};
pub use hasher::FileHasher;
pub use models::{
    format_file_size, CatalogEntry, Digest, DiscoveredFile, Disposition, EntryId, MediaType,
    ScanReport,
};
pub use progress::{ProgressCallback, ProgressReporter, ScanPhase};
pub use reconciler::Reconciler;
pub use scanner::ScanOrchestrator;
