use std::collections::HashSet;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{CleanerConfig, DEFAULT_EXCLUSIONS};
use crate::error::{CleanerError, Result};
use crate::format::megabytes_to_bytes;

/// Normalized scan root: absolute, no trailing separator, no `.` components.
/// Used as the size cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanRoot(PathBuf);

impl ScanRoot {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(CleanerError::invalid_root(path, "root path is empty"));
        }
        let absolute = std::path::absolute(path)
            .map_err(|e| CleanerError::invalid_root(path, e.to_string()))?;
        Ok(ScanRoot(absolute.components().collect()))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn cache_key(&self) -> String {
        self.0.to_string_lossy().into_owned()
    }
}

impl fmt::Display for ScanRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Folder names whose subtrees are never descended into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    names: HashSet<String>,
}

impl ExclusionSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExclusionSet {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn defaults() -> Self {
        Self::new(DEFAULT_EXCLUSIONS.iter().copied())
    }

    pub fn from_config(config: &CleanerConfig) -> Self {
        Self::new(config.exclusions.iter().cloned())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn is_excluded_name(&self, name: &OsStr) -> bool {
        name.to_str().map_or(false, |n| self.names.contains(n))
    }

    /// True when any component of `path` is an excluded name.
    pub fn matches(&self, path: &Path) -> bool {
        !self.names.is_empty()
            && path
                .components()
                .any(|component| self.is_excluded_name(component.as_os_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSizeEntry {
    pub path: PathBuf,
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub root: ScanRoot,
    pub threshold_bytes: u64,
    pub exclusions: ExclusionSet,
}

impl ScanRequest {
    pub fn new(root: impl AsRef<Path>, threshold_bytes: u64, exclusions: ExclusionSet) -> Result<Self> {
        Ok(ScanRequest {
            root: ScanRoot::new(root)?,
            threshold_bytes,
            exclusions,
        })
    }

    /// Request with the threshold in megabytes and the configured exclusions.
    pub fn from_config(root: impl AsRef<Path>, threshold_mb: u64, config: &CleanerConfig) -> Result<Self> {
        Self::new(
            root,
            megabytes_to_bytes(threshold_mb),
            ExclusionSet::from_config(config),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Candidate folders considered (phase one count, or cached entry count).
    pub candidates: usize,
    /// Folders emitted as over the threshold.
    pub found: usize,
    pub from_cache: bool,
    pub stopped: bool,
}

/// One step of a scan, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    CandidatesFound { total: usize },
    FolderFound(FolderSizeEntry),
    Progress { percent: f32 },
    Completed(ScanSummary),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_normalized_without_trailing_separator() {
        let dir = tempfile::TempDir::new().unwrap();
        let with_slash = format!("{}/", dir.path().display());
        let a = ScanRoot::new(&with_slash).unwrap();
        let b = ScanRoot::new(dir.path()).unwrap();
        assert_eq!(a, b);
        assert!(a.as_path().is_absolute());
        assert!(!a.cache_key().ends_with('/'));
    }

    #[test]
    fn empty_root_is_rejected() {
        assert!(matches!(
            ScanRoot::new(""),
            Err(CleanerError::InvalidRoot { .. })
        ));
    }

    #[test]
    fn request_from_config_uses_configured_exclusions() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(
            ExclusionSet::from_config(&CleanerConfig::default()),
            ExclusionSet::defaults()
        );

        let config = CleanerConfig {
            exclusions: vec!["node_modules".into(), "target".into()],
            ..CleanerConfig::default()
        };
        let request = ScanRequest::from_config(dir.path(), 100, &config).unwrap();
        assert_eq!(request.threshold_bytes, 104_857_600);
        assert!(request.exclusions.matches(Path::new("/src/app/node_modules/x")));
        assert!(request.exclusions.matches(Path::new("/src/app/target")));
        assert!(!request.exclusions.matches(Path::new("/Users/x/AppData")));
    }

    #[test]
    fn exclusion_matches_any_component() {
        let set = ExclusionSet::new(["node_modules", "AppData"]);
        assert!(set.matches(Path::new("/home/u/project/node_modules/pkg")));
        assert!(set.matches(Path::new("/Users/x/AppData")));
        assert!(!set.matches(Path::new("/home/u/project/src")));
        assert!(!set.matches(Path::new("/home/u/appdata")));
        assert!(!ExclusionSet::empty().matches(Path::new("/anything")));
    }
}
