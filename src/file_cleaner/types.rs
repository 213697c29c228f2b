use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::format::{format_size, megabytes_to_bytes};
use crate::ops::RunState;

/// Files are never auto-deleted above this size unless the rule or mode says otherwise.
pub const DEFAULT_MAX_FILE_MB: u64 = 100;
/// Minimum age floor applied to every rule in Safe mode.
pub const SAFE_MODE_MIN_AGE_DAYS: u32 = 7;
/// Aggressive mode lowers every rule's minimum age to at most this.
pub const AGGRESSIVE_MIN_AGE_DAYS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningCategory {
    Temp,
    Cache,
    Logs,
    Downloads,
    Cookies,
    History,
    Thumbnails,
    RecycleBin,
    BrowserCache,
}

impl CleaningCategory {
    pub fn label(self) -> &'static str {
        match self {
            CleaningCategory::Temp => "Temporary files",
            CleaningCategory::Cache => "Cache",
            CleaningCategory::Logs => "Logs",
            CleaningCategory::Downloads => "Downloads",
            CleaningCategory::Cookies => "Cookies",
            CleaningCategory::History => "History",
            CleaningCategory::Thumbnails => "Thumbnails",
            CleaningCategory::RecycleBin => "Recycle Bin",
            CleaningCategory::BrowserCache => "Browser cache",
        }
    }

    /// Categories handled by dedicated sweeps rather than rule tables.
    pub fn is_builtin_sweep(self) -> bool {
        matches!(self, CleaningCategory::RecycleBin | CleaningCategory::BrowserCache)
    }
}

/// How permissive cleanup is. Each step only relaxes the previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningMode {
    Safe,
    #[default]
    Standard,
    Aggressive,
}

impl CleaningMode {
    pub fn effective_min_age_days(self, rule_min_age_days: u32) -> u32 {
        match self {
            CleaningMode::Safe => rule_min_age_days.max(SAFE_MODE_MIN_AGE_DAYS),
            CleaningMode::Standard => rule_min_age_days,
            CleaningMode::Aggressive => rule_min_age_days.min(AGGRESSIVE_MIN_AGE_DAYS),
        }
    }

    pub fn effective_max_size_bytes(self, rule_max_size_mb: Option<u64>) -> Option<u64> {
        match self {
            CleaningMode::Safe | CleaningMode::Standard => Some(megabytes_to_bytes(
                rule_max_size_mb.unwrap_or(DEFAULT_MAX_FILE_MB),
            )),
            CleaningMode::Aggressive => rule_max_size_mb.map(megabytes_to_bytes),
        }
    }

    pub fn allows_category(self, category: CleaningCategory) -> bool {
        match category {
            CleaningCategory::History | CleaningCategory::Cookies => {
                self == CleaningMode::Aggressive
            }
            _ => true,
        }
    }

    pub fn touches_cookies(self) -> bool {
        self != CleaningMode::Safe
    }
}

/// Outcome of a single deletability check. `reason` is empty when allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: String,
}

impl Verdict {
    pub fn allow() -> Self {
        Verdict {
            allowed: true,
            reason: String::new(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Verdict {
            allowed: false,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    File,
    EmptyDirectory,
    CacheDirectory,
    CookiesExpired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedItem {
    pub path: PathBuf,
    pub size: u64,
    pub kind: ItemKind,
}

/// Per-category outcome. Only ever grows while a run accumulates into it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleaningResult {
    pub files_removed: u64,
    pub size_freed: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub duration: Duration,
    pub details: Vec<CleanedItem>,
}

impl CleaningResult {
    pub(crate) fn record(&mut self, path: &Path, size: u64, kind: ItemKind) {
        if matches!(kind, ItemKind::File | ItemKind::CacheDirectory) {
            self.files_removed += 1;
            self.size_freed += size;
        }
        self.details.push(CleanedItem {
            path: path.to_path_buf(),
            size,
            kind,
        });
    }

    pub(crate) fn record_bulk(&mut self, count: u64, size: u64) {
        self.files_removed += count;
        self.size_freed += size;
    }

    pub fn merge(&mut self, other: CleaningResult) {
        self.files_removed += other.files_removed;
        self.size_freed += other.size_freed;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.duration += other.duration;
        self.details.extend(other.details);
    }

    pub fn file_paths(&self) -> Vec<&Path> {
        self.details
            .iter()
            .filter(|d| d.kind == ItemKind::File)
            .map(|d| d.path.as_path())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReport {
    pub mode: CleaningMode,
    pub dry_run: bool,
    pub state: RunState,
    pub results: BTreeMap<CleaningCategory, CleaningResult>,
}

impl CleanupReport {
    pub fn total_size(&self) -> u64 {
        self.results.values().map(|r| r.size_freed).sum()
    }

    pub fn total_files(&self) -> u64 {
        self.results.values().map(|r| r.files_removed).sum()
    }

    pub fn get(&self, category: CleaningCategory) -> Option<&CleaningResult> {
        self.results.get(&category)
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{} {} in {} items",
            if self.dry_run { "Would free" } else { "Freed" },
            format_size(self.total_size()),
            self.total_files()
        )
    }
}
