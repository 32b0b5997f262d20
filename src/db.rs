//! SQLite-backed catalog

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::catalog::Catalog;
use crate::error::CatalogError;
use crate::models::{CatalogEntry, Digest, EntryId, MediaType};

const ENTRY_COLUMNS: &str = "id, path, name, size, digest, media_type, mime_type, \
     created_at, modified_at, last_scanned_at, is_processed";

/// Catalog stored in a single SQLite database
pub struct SqliteCatalog {
    conn: Connection,
    in_batch: bool,
}

impl SqliteCatalog {
    /// Open or create database
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path)?;
        let catalog = Self {
            conn,
            in_batch: false,
        };
        catalog.init_schema()?;
        Ok(catalog)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        let catalog = Self {
            conn,
            in_batch: false,
        };
        catalog.init_schema()?;
        Ok(catalog)
    }

    fn init_schema(&self) -> Result<(), CatalogError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS media_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path BLOB NOT NULL UNIQUE,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                digest TEXT NOT NULL UNIQUE,
                media_type TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                modified_at INTEGER NOT NULL,
                last_scanned_at INTEGER NOT NULL,
                is_processed INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_media_items_media_type ON media_items(media_type);
            CREATE INDEX IF NOT EXISTS idx_media_items_processed ON media_items(is_processed);
            ",
        )?;
        Ok(())
    }

    /// Number of entries
    pub fn entry_count(&self) -> Result<u64, CatalogError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM media_items", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Entry counts grouped by media type
    pub fn media_type_counts(&self) -> Result<HashMap<MediaType, u64>, CatalogError> {
        let mut stmt = self
            .conn
            .prepare("SELECT media_type, COUNT(*) FROM media_items GROUP BY media_type")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (media_type, count) = row?;
            *counts.entry(MediaType::parse(&media_type)).or_insert(0) += count;
        }
        Ok(counts)
    }

    /// Entries downstream metadata extraction has not handled yet
    pub fn unprocessed_entries(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.query_entries(
            &format!("SELECT {ENTRY_COLUMNS} FROM media_items WHERE is_processed = 0 ORDER BY id"),
            [],
        )
    }

    fn query_entry<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Option<CatalogEntry>, CatalogError> {
        let raw = self.conn.query_row(sql, params, RawEntry::from_row).optional()?;
        raw.map(RawEntry::into_entry).transpose()
    }

    fn query_entries<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, RawEntry::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }
}

impl Catalog for SqliteCatalog {
    fn find_by_id(&self, id: EntryId) -> Result<Option<CatalogEntry>, CatalogError> {
        self.query_entry(
            &format!("SELECT {ENTRY_COLUMNS} FROM media_items WHERE id = ?1"),
            params![id.0],
        )
    }

    fn find_by_path(&self, path: &Path) -> Result<Option<CatalogEntry>, CatalogError> {
        self.query_entry(
            &format!("SELECT {ENTRY_COLUMNS} FROM media_items WHERE path = ?1"),
            params![path_key(path)],
        )
    }

    fn find_by_digest(&self, digest: &Digest) -> Result<Option<CatalogEntry>, CatalogError> {
        self.query_entry(
            &format!("SELECT {ENTRY_COLUMNS} FROM media_items WHERE digest = ?1"),
            params![digest.as_str()],
        )
    }

    fn insert(&mut self, mut entry: CatalogEntry) -> Result<CatalogEntry, CatalogError> {
        self.conn.execute(
            "INSERT INTO media_items
             (path, name, size, digest, media_type, mime_type,
              created_at, modified_at, last_scanned_at, is_processed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                path_key(&entry.path),
                entry.name,
                entry.size as i64,
                entry.digest.as_str(),
                entry.media_type.as_str(),
                entry.mime_type,
                to_nanos(&entry.created_at),
                to_nanos(&entry.modified_at),
                to_nanos(&entry.last_scanned_at),
                entry.is_processed as i32,
            ],
        )?;
        entry.id = Some(EntryId(self.conn.last_insert_rowid()));
        Ok(entry)
    }

    fn update(&mut self, entry: CatalogEntry) -> Result<CatalogEntry, CatalogError> {
        let id = entry.id.ok_or(CatalogError::MissingId)?;
        let changed = self.conn.execute(
            "UPDATE media_items SET
                path = ?2, name = ?3, size = ?4, digest = ?5, media_type = ?6, mime_type = ?7,
                created_at = ?8, modified_at = ?9, last_scanned_at = ?10, is_processed = ?11
             WHERE id = ?1",
            params![
                id.0,
                path_key(&entry.path),
                entry.name,
                entry.size as i64,
                entry.digest.as_str(),
                entry.media_type.as_str(),
                entry.mime_type,
                to_nanos(&entry.created_at),
                to_nanos(&entry.modified_at),
                to_nanos(&entry.last_scanned_at),
                entry.is_processed as i32,
            ],
        )?;
        if changed == 0 {
            return Err(CatalogError::NotFound(id));
        }
        Ok(entry)
    }

    fn entries(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.query_entries(&format!("SELECT {ENTRY_COLUMNS} FROM media_items ORDER BY id"), [])
    }

    fn begin_batch(&mut self) -> Result<(), CatalogError> {
        if self.in_batch {
            return Err(CatalogError::BatchAlreadyOpen);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_batch = true;
        Ok(())
    }

    fn commit_batch(&mut self) -> Result<(), CatalogError> {
        if !self.in_batch {
            return Err(CatalogError::NoActiveBatch);
        }
        self.conn.execute_batch("COMMIT")?;
        self.in_batch = false;
        Ok(())
    }

    fn rollback_batch(&mut self) -> Result<(), CatalogError> {
        if !self.in_batch {
            return Err(CatalogError::NoActiveBatch);
        }
        self.in_batch = false;
        // SQLite may already have rolled back on its own after certain errors
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

/// Row as stored, before decoding the typed columns
struct RawEntry {
    id: i64,
    path: Vec<u8>,
    name: String,
    size: i64,
    digest: String,
    media_type: String,
    mime_type: String,
    created_at: i64,
    modified_at: i64,
    last_scanned_at: i64,
    is_processed: bool,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            path: row.get(1)?,
            name: row.get(2)?,
            size: row.get(3)?,
            digest: row.get(4)?,
            media_type: row.get(5)?,
            mime_type: row.get(6)?,
            created_at: row.get(7)?,
            modified_at: row.get(8)?,
            last_scanned_at: row.get(9)?,
            is_processed: row.get(10)?,
        })
    }

    fn into_entry(self) -> Result<CatalogEntry, CatalogError> {
        if self.size < 0 {
            return Err(CatalogError::Corrupt(format!(
                "entry {} has negative size {}",
                self.id, self.size
            )));
        }
        Ok(CatalogEntry {
            id: Some(EntryId(self.id)),
            path: path_from_key(self.path),
            name: self.name,
            size: self.size as u64,
            digest: Digest::from_hex(self.digest),
            media_type: MediaType::parse(&self.media_type),
            mime_type: self.mime_type,
            created_at: DateTime::from_timestamp_nanos(self.created_at),
            modified_at: DateTime::from_timestamp_nanos(self.modified_at),
            last_scanned_at: DateTime::from_timestamp_nanos(self.last_scanned_at),
            is_processed: self.is_processed,
        })
    }
}

/// Stored form of a path: the exact OS bytes, so any legal filename round-trips
#[cfg(unix)]
fn path_key(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(unix)]
fn path_from_key(key: Vec<u8>) -> PathBuf {
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(std::ffi::OsString::from_vec(key))
}

/// Backslash is only a separator here, so it is normalized to `/`
#[cfg(not(unix))]
fn path_key(path: &Path) -> Vec<u8> {
    path.to_string_lossy().replace('\\', "/").into_bytes()
}

#[cfg(not(unix))]
fn path_from_key(key: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&key).into_owned())
}

fn to_nanos(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt()
        .unwrap_or_else(|| ts.timestamp().saturating_mul(1_000_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(path: &str, digest: &str, media_type: MediaType) -> CatalogEntry {
        let modified = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        CatalogEntry::new(
            PathBuf::from(path),
            42,
            Digest::from_hex(digest),
            media_type,
            "application/octet-stream".to_string(),
            modified,
            modified,
        )
    }

    #[test]
    fn test_insert_and_find() {
        let mut db = SqliteCatalog::open_memory().unwrap();
        let stored = db.insert(entry("/m/a.mp4", "aa11", MediaType::Video)).unwrap();
        let id = stored.id.unwrap();

        let by_id = db.find_by_id(id).unwrap().unwrap();
        let by_path = db.find_by_path(Path::new("/m/a.mp4")).unwrap().unwrap();
        let by_digest = db.find_by_digest(&Digest::from_hex("AA11")).unwrap().unwrap();

        assert_eq!(by_id, stored);
        assert_eq!(by_path, stored);
        assert_eq!(by_digest, stored);
        assert!(db.find_by_path(Path::new("/m/b.mp4")).unwrap().is_none());
    }

    #[test]
    fn test_timestamps_roundtrip_with_nanoseconds() {
        let mut db = SqliteCatalog::open_memory().unwrap();
        let original = entry("/m/a.mp4", "aa11", MediaType::Video);
        let stored = db.insert(original.clone()).unwrap();
        let loaded = db.find_by_id(stored.id.unwrap()).unwrap().unwrap();
        assert_eq!(loaded.modified_at, original.modified_at);
        assert_eq!(loaded.last_scanned_at, original.last_scanned_at);
    }

    #[test]
    fn test_unique_constraints() {
        let mut db = SqliteCatalog::open_memory().unwrap();
        db.insert(entry("/m/a.mp4", "aa11", MediaType::Video)).unwrap();

        let same_digest = db.insert(entry("/m/b.mp4", "aa11", MediaType::Video));
        assert!(matches!(same_digest, Err(CatalogError::Sqlite(_))));

        let same_path = db.insert(entry("/m/a.mp4", "bb22", MediaType::Video));
        assert!(matches!(same_path, Err(CatalogError::Sqlite(_))));
        assert_eq!(db.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_update() {
        let mut db = SqliteCatalog::open_memory().unwrap();
        let mut stored = db.insert(entry("/m/a.mp4", "aa11", MediaType::Video)).unwrap();
        stored.path = PathBuf::from("/m/moved/a.mp4");
        stored.is_processed = true;
        db.update(stored.clone()).unwrap();

        assert!(db.find_by_path(Path::new("/m/a.mp4")).unwrap().is_none());
        let loaded = db.find_by_path(Path::new("/m/moved/a.mp4")).unwrap().unwrap();
        assert!(loaded.is_processed);
        assert_eq!(loaded.id, stored.id);
    }

    #[test]
    fn test_update_errors() {
        let mut db = SqliteCatalog::open_memory().unwrap();
        let fresh = entry("/m/a.mp4", "aa11", MediaType::Video);
        assert!(matches!(db.update(fresh.clone()), Err(CatalogError::MissingId)));

        let mut ghost = fresh;
        ghost.id = Some(EntryId(99));
        assert!(matches!(db.update(ghost), Err(CatalogError::NotFound(EntryId(99)))));
    }

    #[cfg(unix)]
    #[test]
    fn test_backslash_in_unix_filename_roundtrips() {
        let mut db = SqliteCatalog::open_memory().unwrap();
        let stored = db.insert(entry("/m/live\\set.mp4", "aa11", MediaType::Video)).unwrap();

        let loaded = db.find_by_id(stored.id.unwrap()).unwrap().unwrap();
        assert_eq!(loaded.path, PathBuf::from("/m/live\\set.mp4"));
        assert!(db.find_by_path(Path::new("/m/live\\set.mp4")).unwrap().is_some());
        assert!(db.find_by_path(Path::new("/m/live/set.mp4")).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_roundtrips() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let raw = Path::new(OsStr::from_bytes(b"/m/caf\xe9.mp3"));
        let mut db = SqliteCatalog::open_memory().unwrap();
        let mut item = entry("/placeholder", "bb22", MediaType::Audio);
        item.path = raw.to_path_buf();
        db.insert(item).unwrap();

        let loaded = db.find_by_path(raw).unwrap().unwrap();
        assert_eq!(loaded.path.as_os_str().as_bytes(), b"/m/caf\xe9.mp3");
    }

    #[cfg(windows)]
    #[test]
    fn test_windows_separators_normalized() {
        let mut db = SqliteCatalog::open_memory().unwrap();
        db.insert(entry("C:\\media\\a.mp4", "aa11", MediaType::Video)).unwrap();
        assert!(db.find_by_path(Path::new("C:/media/a.mp4")).unwrap().is_some());
    }

    #[test]
    fn test_counts_and_listing() {
        let mut db = SqliteCatalog::open_memory().unwrap();
        db.insert(entry("/m/a.mp4", "01", MediaType::Video)).unwrap();
        db.insert(entry("/m/b.mkv", "02", MediaType::Video)).unwrap();
        let mut song = db.insert(entry("/m/c.mp3", "03", MediaType::Audio)).unwrap();
        song.is_processed = true;
        db.update(song).unwrap();

        let counts = db.media_type_counts().unwrap();
        assert_eq!(counts.get(&MediaType::Video), Some(&2));
        assert_eq!(counts.get(&MediaType::Audio), Some(&1));
        assert_eq!(db.entry_count().unwrap(), 3);

        let all = db.entries().unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(db.unprocessed_entries().unwrap().len(), 2);
    }

    #[test]
    fn test_batch_state_errors() {
        let mut db = SqliteCatalog::open_memory().unwrap();
        assert!(matches!(db.commit_batch(), Err(CatalogError::NoActiveBatch)));
        assert!(matches!(db.rollback_batch(), Err(CatalogError::NoActiveBatch)));

        db.begin_batch().unwrap();
        db.insert(entry("/m/a.mp4", "01", MediaType::Video)).unwrap();
        db.rollback_batch().unwrap();
        assert_eq!(db.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_open_file_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("catalog.db");
        {
            let mut db = SqliteCatalog::open(&path).unwrap();
            db.insert(entry("/m/a.mp4", "01", MediaType::Video)).unwrap();
        }
        let db = SqliteCatalog::open(&path).unwrap();
        assert_eq!(db.entry_count().unwrap(), 1);
    }
}
