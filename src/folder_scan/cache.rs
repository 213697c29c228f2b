// src/folder_scan/cache.rs

use std::collections::HashMap;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::types::{FolderSizeEntry, ScanRoot};
use crate::config::CleanerConfig;
use crate::error::{CleanerError, Result};

const CACHE_SCHEMA_VERSION: u32 = 1;
const CACHE_FILE_NAME: &str = "path_cache.json";
const APP_DIR_NAME: &str = "SkripClean";

/// Time-bounded snapshots of oversized folders, keyed by normalized scan root.
///
/// Only folders that exceeded the threshold of the scan that produced a snapshot
/// are recorded. Replaying a snapshot with a lower threshold therefore cannot
/// reveal smaller folders until the snapshot expires or is invalidated.
pub struct SizeCache {
    file: PathBuf,
    ttl: Duration,
    snapshots: Mutex<HashMap<String, CacheRecord>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    roots: HashMap<String, CacheRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheRecord {
    /// Seconds since the Unix epoch.
    timestamp: f64,
    folders: Vec<FolderSizeEntry>,
}

impl SizeCache {
    /// Open the cache at its configured location, falling back to the per-user
    /// data directory when the app-local `cache` directory is not writable.
    pub fn open(config: &CleanerConfig) -> Result<Self> {
        let dir = match &config.cache_dir {
            Some(dir) => {
                ensure_writable(dir)?;
                dir.clone()
            }
            None => default_cache_dir()?,
        };
        Ok(Self::at(dir.join(CACHE_FILE_NAME), config.cache_ttl()))
    }

    /// Cache backed by an explicit file. A missing, unreadable or corrupt file
    /// yields an empty cache.
    pub fn at(file: impl Into<PathBuf>, ttl: Duration) -> Self {
        let file = file.into();
        let snapshots = read_document(&file);
        SizeCache {
            file,
            ttl,
            snapshots: Mutex::new(snapshots),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn lookup(&self, root: &ScanRoot) -> Option<Vec<FolderSizeEntry>> {
        self.lookup_at(root, SystemTime::now())
    }

    pub fn lookup_at(&self, root: &ScanRoot, now: SystemTime) -> Option<Vec<FolderSizeEntry>> {
        let snapshots = self.lock();
        let record = snapshots.get(&root.cache_key())?;
        if self.is_fresh(record, now) {
            Some(record.folders.clone())
        } else {
            debug!("Size cache entry for {} expired", root);
            None
        }
    }

    pub fn is_valid(&self, root: &ScanRoot) -> bool {
        let snapshots = self.lock();
        snapshots
            .get(&root.cache_key())
            .map_or(false, |record| self.is_fresh(record, SystemTime::now()))
    }

    pub fn store(&self, root: &ScanRoot, entries: Vec<FolderSizeEntry>) -> Result<()> {
        self.store_at(root, entries, SystemTime::now())
    }

    /// Replace the snapshot for `root` and persist before returning. Other roots
    /// written by concurrent instances since this cache was loaded are kept.
    pub fn store_at(
        &self,
        root: &ScanRoot,
        entries: Vec<FolderSizeEntry>,
        timestamp: SystemTime,
    ) -> Result<()> {
        let folders: Vec<FolderSizeEntry> = entries
            .into_iter()
            .filter(|entry| {
                let printable = entry.path.to_str().is_some();
                if !printable {
                    debug!("Not caching non-UTF-8 path {:?}", entry.path);
                }
                printable
            })
            .collect();
        let record = CacheRecord {
            timestamp: epoch_seconds(timestamp),
            folders,
        };

        let mut snapshots = self.lock();
        let _file_lock = self.lock_file()?;
        let mut merged = read_document(&self.file);
        merged.insert(root.cache_key(), record);
        let result = self.write_document(&merged);
        *snapshots = merged;
        result
    }

    /// Drop every snapshot, keeping an empty backing document.
    pub fn invalidate_all(&self) -> Result<()> {
        let mut snapshots = self.lock();
        let _file_lock = self.lock_file()?;
        snapshots.clear();
        self.write_document(&snapshots)
    }

    /// Drop every snapshot and remove the backing file.
    pub fn clear(&self) {
        self.lock().clear();
        if let Err(e) = fs::remove_file(&self.file) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove size cache {}: {}", self.file.display(), e);
            }
        }
    }

    fn is_fresh(&self, record: &CacheRecord, now: SystemTime) -> bool {
        epoch_seconds(now) - record.timestamp <= self.ttl.as_secs_f64()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheRecord>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_file(&self) -> Result<fs::File> {
        let dir = self.parent_dir();
        fs::create_dir_all(dir)?;
        let lock_path = self.file.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?;
        lock.lock_exclusive()?;
        Ok(lock)
    }

    fn write_document(&self, roots: &HashMap<String, CacheRecord>) -> Result<()> {
        let document = CacheDocument {
            version: CACHE_SCHEMA_VERSION,
            roots: roots.clone(),
        };
        let data = serde_json::to_vec_pretty(&document)
            .map_err(|e| CleanerError::Cache(format!("failed to encode cache: {}", e)))?;

        let mut tmp = NamedTempFile::new_in(self.parent_dir())?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.file)
            .map_err(|e| CleanerError::Cache(format!("failed to replace {}: {}", self.file.display(), e)))?;
        Ok(())
    }

    fn parent_dir(&self) -> &Path {
        self.file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }
}

fn read_document(file: &Path) -> HashMap<String, CacheRecord> {
    let raw = match fs::read(file) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!("Failed to read size cache {}: {}", file.display(), e);
            return HashMap::new();
        }
    };
    match serde_json::from_slice::<CacheDocument>(&raw) {
        Ok(doc) if doc.version == CACHE_SCHEMA_VERSION => doc.roots,
        Ok(doc) => {
            warn!(
                "Ignoring size cache {} with schema version {}",
                file.display(),
                doc.version
            );
            HashMap::new()
        }
        Err(e) => {
            warn!("Ignoring corrupt size cache {}: {}", file.display(), e);
            HashMap::new()
        }
    }
}

fn epoch_seconds(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(before) => -before.duration().as_secs_f64(),
    }
}

fn default_cache_dir() -> Result<PathBuf> {
    let app_local = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("cache")));
    if let Some(dir) = app_local {
        match ensure_writable(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) => debug!("App-local cache dir {} unusable: {}", dir.display(), e),
        }
    }

    let fallback = dirs::data_dir()
        .ok_or_else(|| CleanerError::Cache("no per-user data directory available".into()))?
        .join(APP_DIR_NAME)
        .join("cache");
    ensure_writable(&fallback)?;
    Ok(fallback)
}

fn ensure_writable(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    NamedTempFile::new_in(dir)?;
    Ok(())
}
