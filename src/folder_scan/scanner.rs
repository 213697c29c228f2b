use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::cache::SizeCache;
use super::types::{ExclusionSet, FolderSizeEntry, ScanEvent, ScanRequest, ScanSummary};
use crate::config::CleanerConfig;
use crate::error::{CleanerError, Result};

/// Finds folders whose recursive size exceeds a threshold.
///
/// A scan is two-phase: every non-excluded directory under the root is
/// enumerated first so progress has a fixed denominator, then each candidate is
/// sized and emitted as soon as it qualifies.
pub struct FolderScanner {
    cache: Arc<SizeCache>,
    max_parallel_scans: usize,
}

/// What a scan will do, decided before any work is started.
#[derive(Debug, Clone)]
pub enum ScanPlan {
    Cached(Vec<FolderSizeEntry>),
    Walk,
}

impl FolderScanner {
    pub fn new(cache: Arc<SizeCache>) -> Self {
        FolderScanner {
            cache,
            max_parallel_scans: num_cpus::get(),
        }
    }

    pub fn with_config(cache: Arc<SizeCache>, config: &CleanerConfig) -> Self {
        FolderScanner {
            cache,
            max_parallel_scans: config.max_parallel_scans.max(1),
        }
    }

    pub fn cache(&self) -> &SizeCache {
        &self.cache
    }

    /// Pre-flight: consult the cache, and on a miss make sure the root is a
    /// walkable directory. Failures here are returned before any event is emitted.
    pub fn prepare(&self, request: &ScanRequest) -> Result<ScanPlan> {
        if let Some(entries) = self.cache.lookup(&request.root) {
            debug!("Size cache hit for {}", request.root);
            return Ok(ScanPlan::Cached(entries));
        }
        let root = request.root.as_path();
        let metadata = fs::metadata(root)
            .map_err(|e| CleanerError::invalid_root(root, e.to_string()))?;
        if !metadata.is_dir() {
            return Err(CleanerError::invalid_root(root, "not a directory"));
        }
        Ok(ScanPlan::Walk)
    }

    /// Blocking scan. Events are handed to `emit` in order and the final event is
    /// always `ScanEvent::Completed`.
    pub fn scan_blocking(
        &self,
        request: &ScanRequest,
        cancel: &CancellationToken,
        emit: &mut dyn FnMut(ScanEvent),
    ) -> Result<ScanSummary> {
        let plan = self.prepare(request)?;
        Ok(self.run(request, plan, cancel, emit))
    }

    pub(crate) fn run(
        &self,
        request: &ScanRequest,
        plan: ScanPlan,
        cancel: &CancellationToken,
        emit: &mut dyn FnMut(ScanEvent),
    ) -> ScanSummary {
        let summary = match plan {
            ScanPlan::Cached(entries) => Self::replay(entries, request.threshold_bytes, cancel, emit),
            ScanPlan::Walk => self.walk(request, cancel, emit),
        };
        emit(ScanEvent::Completed(summary));
        summary
    }

    fn replay(
        entries: Vec<FolderSizeEntry>,
        threshold_bytes: u64,
        cancel: &CancellationToken,
        emit: &mut dyn FnMut(ScanEvent),
    ) -> ScanSummary {
        let mut summary = ScanSummary {
            candidates: entries.len(),
            found: 0,
            from_cache: true,
            stopped: false,
        };
        emit(ScanEvent::CandidatesFound {
            total: entries.len(),
        });
        for entry in entries {
            if cancel.is_cancelled() {
                summary.stopped = true;
                return summary;
            }
            if entry.size_bytes > threshold_bytes {
                summary.found += 1;
                emit(ScanEvent::FolderFound(entry));
            }
        }
        emit(ScanEvent::Progress { percent: 100.0 });
        summary
    }

    fn walk(
        &self,
        request: &ScanRequest,
        cancel: &CancellationToken,
        emit: &mut dyn FnMut(ScanEvent),
    ) -> ScanSummary {
        let candidates = match enumerate_candidates(request.root.as_path(), &request.exclusions, cancel) {
            Some(candidates) => candidates,
            None => {
                return ScanSummary {
                    candidates: 0,
                    found: 0,
                    from_cache: false,
                    stopped: true,
                }
            }
        };
        let total = candidates.len();
        info!("Scanning {} candidate folders under {}", total, request.root);
        emit(ScanEvent::CandidatesFound { total });

        let mut found = Vec::new();
        let mut processed = 0usize;
        let mut on_sized = |dir: &Path, outcome: io::Result<u64>| {
            processed += 1;
            match outcome {
                Ok(size) if size > request.threshold_bytes => {
                    let entry = FolderSizeEntry {
                        path: dir.to_path_buf(),
                        size_bytes: size,
                    };
                    found.push(entry.clone());
                    emit(ScanEvent::FolderFound(entry));
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping folder {}: {}", dir.display(), e),
            }
            emit(ScanEvent::Progress {
                percent: processed as f32 * 100.0 / total as f32,
            });
        };
        self.size_candidates(&candidates, &request.exclusions, cancel, &mut on_sized);

        let stopped = cancel.is_cancelled() && processed < total;
        let summary = ScanSummary {
            candidates: total,
            found: found.len(),
            from_cache: false,
            stopped,
        };
        if stopped {
            info!("Scan of {} stopped after {}/{} folders", request.root, processed, total);
            return summary;
        }

        found.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
        if let Err(e) = self.cache.store(&request.root, found) {
            warn!("Failed to cache scan of {}: {}", request.root, e);
        }
        summary
    }

    #[cfg(feature = "parallel-scan")]
    fn size_candidates(
        &self,
        candidates: &[PathBuf],
        exclusions: &ExclusionSet,
        cancel: &CancellationToken,
        on_sized: &mut dyn FnMut(&Path, io::Result<u64>),
    ) {
        use rayon::prelude::*;
        use std::sync::mpsc;

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_parallel_scans)
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Falling back to serial sizing: {}", e);
                return size_serially(candidates, exclusions, cancel, on_sized);
            }
        };

        let (tx, rx) = mpsc::channel();
        std::thread::scope(|scope| {
            scope.spawn(move || {
                pool.install(|| {
                    candidates.par_iter().for_each_with(tx, |tx, dir| {
                        if cancel.is_cancelled() {
                            return;
                        }
                        let _ = tx.send((dir.as_path(), folder_size(dir, exclusions)));
                    });
                });
            });
            for (dir, outcome) in rx {
                on_sized(dir, outcome);
            }
        });
    }

    #[cfg(not(feature = "parallel-scan"))]
    fn size_candidates(
        &self,
        candidates: &[PathBuf],
        exclusions: &ExclusionSet,
        cancel: &CancellationToken,
        on_sized: &mut dyn FnMut(&Path, io::Result<u64>),
    ) {
        size_serially(candidates, exclusions, cancel, on_sized)
    }
}

fn size_serially(
    candidates: &[PathBuf],
    exclusions: &ExclusionSet,
    cancel: &CancellationToken,
    on_sized: &mut dyn FnMut(&Path, io::Result<u64>),
) {
    for dir in candidates {
        if cancel.is_cancelled() {
            return;
        }
        on_sized(dir, folder_size(dir, exclusions));
    }
}

/// Every directory strictly below `root` that is not inside an excluded subtree.
/// Returns `None` when cancelled mid-walk.
fn enumerate_candidates(
    root: &Path,
    exclusions: &ExclusionSet,
    cancel: &CancellationToken,
) -> Option<Vec<PathBuf>> {
    if exclusions.matches(root) {
        return Some(Vec::new());
    }
    let mut candidates = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !exclusions.is_excluded_name(entry.file_name()));
    for entry in walker {
        if cancel.is_cancelled() {
            return None;
        }
        match entry {
            Ok(entry) if entry.file_type().is_dir() => candidates.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => debug!("Enumeration skipped an entry: {}", e),
        }
    }
    Some(candidates)
}

/// Sum of regular-file sizes beneath `dir`, skipping excluded subtrees and
/// never following symbolic links.
pub(crate) fn folder_size(dir: &Path, exclusions: &ExclusionSet) -> io::Result<u64> {
    let metadata = fs::symlink_metadata(dir)?;
    if metadata.file_type().is_symlink() {
        return Ok(0);
    }
    fs::read_dir(dir)?;

    let mut total = 0u64;
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !exclusions.is_excluded_name(entry.file_name()));
    for entry in walker.filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            if let Ok(md) = entry.metadata() {
                total += md.len();
            }
        }
    }
    Ok(total)
}
