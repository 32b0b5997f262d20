//! Streaming SHA-256 hashing on a bounded worker pool
//!
//! Each [`FileHasher`] owns its own rayon pool. Hashing is the only CPU-bound
//! step of a scan, so it is the only work that fans out; callers block on the
//! pool while it runs. The pool is torn down by [`FileHasher::shutdown`] or
//! when the hasher is dropped.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use sha2::{Digest as _, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::error::HashError;
use crate::models::Digest;

/// Default number of hash workers
pub const DEFAULT_WORKERS: usize = 4;

/// Read size; peak memory per in-flight hash is one chunk
pub const CHUNK_SIZE: usize = 64 * 1024;

/// File hasher with a private worker pool
pub struct FileHasher {
    pool: Option<ThreadPool>,
    workers: usize,
}

impl FileHasher {
    /// Create a hasher with `workers` threads (at least one)
    pub fn new(workers: usize) -> Result<Self, HashError> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("hash-worker-{i}"))
            .build()
            .map_err(|e| HashError::PoolBuild(e.to_string()))?;
        log::debug!("Initialized hash pool with {} workers", workers);
        Ok(Self {
            pool: Some(pool),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn is_shut_down(&self) -> bool {
        self.pool.is_none()
    }

    fn pool(&self) -> Result<&ThreadPool, HashError> {
        self.pool.as_ref().ok_or(HashError::ShutDown)
    }

    /// Hash one file on the pool
    pub fn hash(&self, path: &Path) -> Result<Digest, HashError> {
        let digest = self.pool()?.install(|| hash_file(path))?;
        log::debug!("Hashed {:?}: {}...", path.file_name().unwrap_or_default(), digest.short());
        Ok(digest)
    }

    /// Hash a batch in parallel, keeping each file's outcome in input order
    pub fn hash_batch(&self, paths: &[PathBuf]) -> Vec<(PathBuf, Result<Digest, HashError>)> {
        let pool = match self.pool() {
            Ok(pool) => pool,
            Err(_) => {
                return paths
                    .iter()
                    .map(|p| (p.clone(), Err(HashError::ShutDown)))
                    .collect()
            }
        };
        pool.install(|| {
            paths
                .par_iter()
                .map(|p| (p.clone(), hash_file(p)))
                .collect()
        })
    }

    /// Hash a batch; files that fail are logged and left out of the map
    pub fn hash_many(&self, paths: &[PathBuf]) -> HashMap<PathBuf, Digest> {
        self.hash_batch(paths)
            .into_iter()
            .filter_map(|(path, result)| match result {
                Ok(digest) => Some((path, digest)),
                Err(e) => {
                    log::error!("Failed to hash {:?}: {}", path, e);
                    None
                }
            })
            .collect()
    }

    /// Recompute and compare; any error counts as a mismatch
    pub fn verify(&self, path: &Path, expected: &Digest) -> bool {
        match self.hash(path) {
            Ok(actual) => actual.as_str().eq_ignore_ascii_case(expected.as_str()),
            Err(e) => {
                log::error!("Hash verification failed for {:?}: {}", path, e);
                false
            }
        }
    }

    /// Stop the worker pool. Later hash calls fail with [`HashError::ShutDown`].
    pub fn shutdown(&mut self) {
        if self.pool.take().is_some() {
            log::debug!("Shut down hash pool");
        }
    }
}

impl Drop for FileHasher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Hash a file on the current thread, streaming fixed-size chunks
pub fn hash_file(path: &Path) -> Result<Digest, HashError> {
    let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
    let metadata = file.metadata().map_err(|e| HashError::from_io(path, e))?;
    if !metadata.is_file() {
        return Err(HashError::NotAFile(path.to_path_buf()));
    }

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(HashError::from_io(path, e)),
        };
        hasher.update(&buffer[..n]);
    }
    Ok(Digest::from_hex(format!("{:x}", hasher.finalize())))
}
