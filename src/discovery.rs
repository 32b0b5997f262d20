//! Directory discovery: walks a root and yields candidate media files

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::classifier::extension_of;
use crate::error::ScanError;
use crate::models::DiscoveredFile;

/// Walk `root` and lazily yield files whose extension is in `extensions`.
///
/// An empty extension set accepts every file. The root must be an existing
/// directory; that is the only error this returns. Per-entry failures are
/// logged and counted in [`Discovery::skipped`].
pub fn discover(
    root: &Path,
    recursive: bool,
    include_hidden: bool,
    extensions: &HashSet<String>,
) -> Result<Discovery, ScanError> {
    let metadata = fs::metadata(root)
        .map_err(|e| ScanError::invalid_root(root, format!("directory does not exist: {e}")))?;
    if !metadata.is_dir() {
        return Err(ScanError::invalid_root(root, "path is not a directory"));
    }
    // One spelling per tree: `..` and symlinked roots resolve to the same paths
    let root = fs::canonicalize(root).map_err(|e| ScanError::invalid_root(root, e.to_string()))?;

    let walker = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .follow_links(false)
        .into_iter();

    Ok(Discovery {
        root,
        walker,
        include_hidden,
        extensions: extensions.clone(),
        skipped: 0,
    })
}

/// Lazy sequence of discovered files. Holds no state across calls to [`discover`].
pub struct Discovery {
    root: PathBuf,
    walker: walkdir::IntoIter,
    include_hidden: bool,
    extensions: HashSet<String>,
    skipped: u64,
}

impl Discovery {
    /// Canonical root being walked
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entries dropped because of I/O errors so far
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn accepts_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        extension_of(path)
            .map(|ext| self.extensions.contains(&ext))
            .unwrap_or(false)
    }
}

impl Iterator for Discovery {
    type Item = DiscoveredFile;

    fn next(&mut self) -> Option<DiscoveredFile> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Cannot access {:?}: {}", e.path().unwrap_or(&self.root), e);
                    self.skipped += 1;
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                if !self.include_hidden && is_hidden(&entry) {
                    self.walker.skip_current_dir();
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            if !self.include_hidden && is_hidden(&entry) {
                continue;
            }
            if !self.accepts_extension(entry.path()) {
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => {
                    return Some(DiscoveredFile {
                        path: entry.into_path(),
                        size: metadata.len(),
                        modified_at: modified_time(&metadata),
                    })
                }
                Err(e) => {
                    log::warn!("Cannot stat {:?}: {}", entry.path(), e);
                    self.skipped += 1;
                }
            }
        }
    }
}

/// An entry is hidden if its name starts with `.`, or the platform marks it hidden.
/// Hidden directories are pruned, so ancestors below the root are covered too.
fn is_hidden(entry: &DirEntry) -> bool {
    if entry.file_name().to_string_lossy().starts_with('.') {
        return true;
    }
    has_hidden_attribute(entry)
}

#[cfg(windows)]
fn has_hidden_attribute(entry: &DirEntry) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    entry
        .metadata()
        .map(|m| m.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0)
        .unwrap_or(false)
}

#[cfg(not(windows))]
fn has_hidden_attribute(_entry: &DirEntry) -> bool {
    false
}

/// Modification time in UTC; unreadable times map to the Unix epoch
pub fn modified_time(metadata: &Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Creation time in UTC, falling back to the modification time
pub fn created_time(metadata: &Metadata) -> DateTime<Utc> {
    metadata
        .created()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| modified_time(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::supported_extensions;
    use tempfile::TempDir;

    /// Temp dir under a canonical base, so discovered paths compare equal
    fn tempdir() -> TempDir {
        TempDir::new_in(std::env::temp_dir().canonicalize().unwrap()).unwrap()
    }

    fn touch(dir: &Path, rel: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, rel.as_bytes()).unwrap();
        path
    }

    fn names(root: &Path, recursive: bool, include_hidden: bool) -> Vec<String> {
        let mut found: Vec<String> = discover(root, recursive, include_hidden, &supported_extensions())
            .unwrap()
            .map(|f| {
                f.path
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        found.sort();
        found
    }

    #[test]
    fn test_invalid_root() {
        let dir = tempdir();
        let missing = dir.path().join("missing");
        assert!(matches!(
            discover(&missing, true, false, &HashSet::new()),
            Err(ScanError::InvalidRoot { .. })
        ));

        let file = touch(dir.path(), "file.mp4");
        assert!(matches!(
            discover(&file, true, false, &HashSet::new()),
            Err(ScanError::InvalidRoot { .. })
        ));
    }

    #[test]
    fn test_recursive_and_flat() {
        let dir = tempdir();
        touch(dir.path(), "a.mp4");
        touch(dir.path(), "sub/b.mp3");
        touch(dir.path(), "sub/deeper/c.jpg");

        assert_eq!(names(dir.path(), true, false), vec!["a.mp4", "sub/b.mp3", "sub/deeper/c.jpg"]);
        assert_eq!(names(dir.path(), false, false), vec!["a.mp4"]);
    }

    #[test]
    fn test_extension_filter() {
        let dir = tempdir();
        touch(dir.path(), "movie.MP4");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "paper.pdf");
        touch(dir.path(), "noext");

        assert_eq!(names(dir.path(), true, false), vec!["movie.MP4"]);

        let all = discover(dir.path(), true, false, &HashSet::new()).unwrap().count();
        assert_eq!(all, 4);
    }

    #[test]
    fn test_hidden_files_and_directories() {
        let dir = tempdir();
        touch(dir.path(), "a.mp4");
        touch(dir.path(), ".b.mp4");
        touch(dir.path(), ".cache/c.mp4");
        touch(dir.path(), "visible/.d.mp4");

        assert_eq!(names(dir.path(), true, false), vec!["a.mp4"]);
        assert_eq!(
            names(dir.path(), true, true),
            vec![".b.mp4", ".cache/c.mp4", "a.mp4", "visible/.d.mp4"]
        );
    }

    #[test]
    fn test_hidden_root_is_still_walked() {
        let dir = tempdir();
        let root = dir.path().join(".library");
        touch(&root, "a.mp4");
        assert_eq!(names(&root, true, false), vec!["a.mp4"]);
    }

    #[test]
    fn test_discovered_metadata_and_restart() {
        let dir = tempdir();
        let path = touch(dir.path(), "clip.mkv");

        let first: Vec<_> = discover(dir.path(), true, false, &supported_extensions())
            .unwrap()
            .collect();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].path, path);
        assert_eq!(first[0].size, "clip.mkv".len() as u64);

        // A fresh call walks the tree again
        touch(dir.path(), "second.mkv");
        let second = discover(dir.path(), true, false, &supported_extensions())
            .unwrap()
            .count();
        assert_eq!(second, 2);
    }

    #[test]
    fn test_root_is_canonical() {
        let dir = tempdir();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        touch(dir.path(), "a.mp4");

        let discovery = discover(&dir.path().join("sub/.."), true, false, &supported_extensions())
            .unwrap();
        assert_eq!(discovery.root(), dir.path());
        let files: Vec<_> = discovery.collect();
        assert_eq!(files[0].path, dir.path().join("a.mp4"));
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempdir();
        let mut discovery = discover(dir.path(), true, false, &supported_extensions()).unwrap();
        assert!(discovery.next().is_none());
        assert_eq!(discovery.skipped(), 0);
    }
}
