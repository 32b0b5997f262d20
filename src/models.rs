//! Core data models for the media catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::FileError;

/// Coarse media category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
    Image,
    Document,
    Streaming,
    Other,
}

impl MediaType {
    /// Infer media type from a file extension (without the dot).
    /// Returns `None` when no extension table matches.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext_lower = ext.to_lowercase();
        let ext = ext_lower.as_str();
        if crate::classifier::VIDEO_EXTENSIONS.contains(&ext) {
            Some(MediaType::Video)
        } else if crate::classifier::AUDIO_EXTENSIONS.contains(&ext) {
            Some(MediaType::Audio)
        } else if crate::classifier::IMAGE_EXTENSIONS.contains(&ext) {
            Some(MediaType::Image)
        } else if crate::classifier::DOCUMENT_EXTENSIONS.contains(&ext) {
            Some(MediaType::Document)
        } else if crate::classifier::STREAMING_EXTENSIONS.contains(&ext) {
            Some(MediaType::Streaming)
        } else {
            None
        }
    }

    /// Map a MIME type to a media type by its top-level prefix
    pub fn from_mime(mime: &str) -> Self {
        match mime.split('/').next() {
            Some("video") => MediaType::Video,
            Some("audio") => MediaType::Audio,
            Some("image") => MediaType::Image,
            _ => MediaType::Other,
        }
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Image => "image",
            MediaType::Document => "document",
            MediaType::Streaming => "streaming",
            MediaType::Other => "other",
        }
    }

    /// Parse the stored representation; unknown values become `Other`
    pub fn parse(s: &str) -> Self {
        match s {
            "video" => MediaType::Video,
            "audio" => MediaType::Audio,
            "image" => MediaType::Image,
            "document" => MediaType::Document,
            "streaming" => MediaType::Streaming,
            _ => MediaType::Other,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opaque catalog entry identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub i64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 content digest, lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Wrap a hex digest, normalizing to lowercase
    pub fn from_hex(hex: impl AsRef<str>) -> Self {
        Self(hex.as_ref().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 hex characters, for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(16)]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A row of the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Assigned by the catalog on insert
    pub id: Option<EntryId>,
    /// Absolute path, unique in the catalog
    pub path: PathBuf,
    /// File name without directory
    pub name: String,
    pub size: u64,
    /// Content digest, unique in the catalog
    pub digest: Digest,
    pub media_type: MediaType,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub last_scanned_at: DateTime<Utc>,
    /// Set by downstream metadata extraction only
    pub is_processed: bool,
}

impl CatalogEntry {
    /// Build a fresh, not yet inserted entry
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        path: PathBuf,
        size: u64,
        digest: Digest,
        media_type: MediaType,
        mime_type: String,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        let name = file_name_of(&path);
        Self {
            id: None,
            path,
            name,
            size,
            digest,
            media_type,
            mime_type,
            created_at,
            modified_at,
            last_scanned_at: Utc::now(),
            is_processed: false,
        }
    }
}

/// File name component of a path, lossily converted
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// A candidate file found by the discoverer, not yet hashed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

/// An in-place modification of an existing catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryChange {
    /// The entry as it should be stored after the change
    pub entry: CatalogEntry,
    pub previous_path: PathBuf,
    pub previous_digest: Digest,
}

impl EntryChange {
    pub fn path_changed(&self) -> bool {
        self.entry.path != self.previous_path
    }

    pub fn digest_changed(&self) -> bool {
        self.entry.digest != self.previous_digest
    }
}

/// Outcome of reconciling one discovered file against the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Not in the catalog; the entry is to be inserted
    New(CatalogEntry),
    /// Content or timestamps changed for an existing entry
    Updated(EntryChange),
    /// Same content found under a different path
    Moved(EntryChange),
    /// Nothing to write
    Unchanged,
    Error(FileError),
}

impl Disposition {
    /// Whether applying this disposition writes to the catalog
    pub fn writes(&self) -> bool {
        matches!(
            self,
            Disposition::New(_) | Disposition::Updated(_) | Disposition::Moved(_)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Disposition::New(_) => "new",
            Disposition::Updated(_) => "updated",
            Disposition::Moved(_) => "moved",
            Disposition::Unchanged => "unchanged",
            Disposition::Error(_) => "error",
        }
    }
}

/// Result of a scan operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    /// Files handed to the reconciler
    pub total_files: u64,
    pub new_files: u64,
    /// Updated entries, moves included
    pub updated_files: u64,
    /// Subset of `updated_files` where only the path changed
    pub moved_files: u64,
    /// Unchanged files, collapsed duplicates included
    pub skipped_files: u64,
    pub error_files: u64,
    /// Entries skipped during the directory walk (not in `total_files`)
    pub discovery_errors: u64,
    /// Bytes across all files seen
    pub total_size: u64,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Error messages, capped; `error_files` keeps the full count
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
    /// Paths of newly inserted entries, for downstream metadata extraction
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub new_file_paths: Vec<PathBuf>,
}

impl ScanReport {
    /// Create a new empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one disposition
    pub fn record(&mut self, disposition: &Disposition, max_errors: usize) {
        match disposition {
            Disposition::New(entry) => {
                self.new_files += 1;
                self.new_file_paths.push(entry.path.clone());
            }
            Disposition::Updated(_) => self.updated_files += 1,
            Disposition::Moved(_) => {
                self.updated_files += 1;
                self.moved_files += 1;
            }
            Disposition::Unchanged => self.skipped_files += 1,
            Disposition::Error(err) => self.record_error(err.to_string(), max_errors),
        }
    }

    /// Count one failed file, keeping its message while under the cap
    pub fn record_error(&mut self, message: String, max_errors: usize) {
        self.error_files += 1;
        if self.errors.len() < max_errors {
            self.errors.push(message);
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Check if the scan completed without per-file errors
    pub fn is_success(&self) -> bool {
        self.error_files == 0
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scan results:")?;
        writeln!(f, "  Total files: {}", self.total_files)?;
        writeln!(f, "  New: {}", self.new_files)?;
        writeln!(f, "  Updated: {} ({} moved)", self.updated_files, self.moved_files)?;
        writeln!(f, "  Skipped: {}", self.skipped_files)?;
        writeln!(f, "  Errors: {}", self.error_files)?;
        if self.discovery_errors > 0 {
            writeln!(f, "  Unreadable entries: {}", self.discovery_errors)?;
        }
        writeln!(f, "  Total size: {}", format_file_size(self.total_size))?;
        write!(f, "  Duration: {:.2}s", self.duration().as_secs_f64())
    }
}

/// Format a byte count with binary units, e.g. `1.5 MB`
pub fn format_file_size(size_bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}
