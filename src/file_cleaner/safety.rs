mod context;
mod protected;

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

use context::PathContext;
pub use protected::{ProtectedSet, PROTECTED_EXTENSIONS, PROTECTED_NAMES, SYSTEM_PROTECTIONS};

use super::types::{CleaningMode, Verdict};

/// Extensions Safe mode will delete. Everything else needs Standard or above.
pub const SAFE_MODE_EXTENSIONS: &[&str] = &[
    "tmp", "temp", "log", "old", "bak", "chk", "dmp", "etl", "cache",
];

/// Decides whether a single path may be removed, independent of any rule.
#[derive(Debug, Clone)]
pub struct SafetyClassifier {
    protections: ProtectedSet,
    safe_extensions: HashSet<String>,
}

impl Default for SafetyClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyClassifier {
    pub fn new() -> Self {
        Self::with_protections(SYSTEM_PROTECTIONS.clone())
    }

    pub fn with_protections(protections: ProtectedSet) -> Self {
        SafetyClassifier {
            protections,
            safe_extensions: SAFE_MODE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Replace the Safe-mode allow-list.
    pub fn with_safe_extensions<'a>(mut self, extensions: impl IntoIterator<Item = &'a str>) -> Self {
        self.safe_extensions = extensions
            .into_iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn protections(&self) -> &ProtectedSet {
        &self.protections
    }

    /// First failing check wins: protected location, protected name,
    /// protected extension, Safe-mode allow-list, then an in-use probe.
    pub fn is_deletable(&self, path: &Path, mode: CleaningMode) -> Verdict {
        let ctx = PathContext::new(path);
        if let Some(reason) = self.location_reason(&ctx) {
            return Verdict::reject(reason);
        }

        let extension = ctx.extension();
        if let Some(ext) = &extension {
            if self.protections.is_protected_extension(ext) {
                return Verdict::reject(format!("protected extension .{}", ext));
            }
        }

        if mode == CleaningMode::Safe {
            match &extension {
                Some(ext) if self.safe_extensions.contains(ext) => {}
                Some(ext) => {
                    return Verdict::reject(format!(
                        "extension .{} is not on the safe mode allow-list",
                        ext
                    ))
                }
                None => {
                    return Verdict::reject(
                        "files without an extension are not on the safe mode allow-list",
                    )
                }
            }
        }

        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_file() => {
                if is_in_use(path) {
                    return Verdict::reject("file is in use");
                }
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Verdict::reject("path no longer exists");
            }
            Err(e) => return Verdict::reject(format!("cannot inspect path: {}", e)),
        }

        Verdict::allow()
    }

    /// Location-only checks, used for rule roots.
    pub fn protected_location(&self, path: &Path) -> Option<String> {
        self.location_reason(&PathContext::new(path))
    }

    /// Location plus extension checks for a directory about to be removed.
    /// No in-use probe or allow-list applies.
    pub fn protected_for_removal(&self, path: &Path) -> Option<String> {
        let ctx = PathContext::new(path);
        if let Some(reason) = self.location_reason(&ctx) {
            return Some(reason);
        }
        ctx.extension()
            .filter(|ext| self.protections.is_protected_extension(ext))
            .map(|ext| format!("protected extension .{}", ext))
    }

    fn location_reason(&self, ctx: &PathContext<'_>) -> Option<String> {
        if let Some(prefix) = self.protections.protected_path(ctx) {
            return Some(format!("inside protected location {}", prefix));
        }
        self.protections
            .protected_name(ctx)
            .map(|name| format!("protected name '{}'", name))
    }
}

/// Exclusive-open probe, released immediately.
#[cfg(windows)]
fn is_in_use(path: &Path) -> bool {
    use std::os::windows::fs::OpenOptionsExt;

    OpenOptions::new()
        .append(true)
        .share_mode(0)
        .open(path)
        .is_err()
}

/// Exclusive-open probe, released immediately.
#[cfg(not(windows))]
fn is_in_use(path: &Path) -> bool {
    use fs2::FileExt;

    match OpenOptions::new().append(true).open(path) {
        Ok(file) => match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        },
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(&path).unwrap();
        path
    }

    #[test]
    fn protected_names_and_extensions_are_rejected_in_every_mode() {
        let dir = TempDir::new().unwrap();
        let classifier = SafetyClassifier::new();
        let report = touch(&dir, "report.docx");
        let nested = touch(&dir, "drivers/scratch.tmp");
        for mode in [CleaningMode::Safe, CleaningMode::Standard, CleaningMode::Aggressive] {
            let v = classifier.is_deletable(&report, mode);
            assert!(!v.allowed);
            assert!(v.reason.contains("extension"), "{}", v.reason);
            let v = classifier.is_deletable(&nested, mode);
            assert!(!v.allowed);
            assert!(v.reason.contains("drivers"), "{}", v.reason);
        }
    }

    #[test]
    fn removal_check_covers_extension_named_directories() {
        let dir = TempDir::new().unwrap();
        let classifier = SafetyClassifier::new();
        let archive = dir.path().join("archive.zip");
        let store = dir.path().join("Store.DB");
        let plain = dir.path().join("scratch");
        for d in [&archive, &store, &plain] {
            fs::create_dir_all(d).unwrap();
        }

        assert!(classifier.protected_location(&archive).is_none());
        let reason = classifier.protected_for_removal(&archive).unwrap();
        assert!(reason.contains(".zip"), "{}", reason);
        assert!(classifier.protected_for_removal(&store).unwrap().contains(".db"));
        assert!(classifier.protected_for_removal(&plain).is_none());
        assert!(classifier.protected_for_removal(&dir.path().join("drivers")).is_some());
    }

    #[test]
    fn safe_mode_enforces_allow_list() {
        let dir = TempDir::new().unwrap();
        let classifier = SafetyClassifier::new();
        let tmp = touch(&dir, "a.tmp");
        let txt = touch(&dir, "notes.txt");
        let bare = touch(&dir, "LOCKFILE");

        assert!(classifier.is_deletable(&tmp, CleaningMode::Safe).allowed);
        let v = classifier.is_deletable(&txt, CleaningMode::Safe);
        assert!(!v.allowed && v.reason.contains("allow-list"));
        assert!(!classifier.is_deletable(&bare, CleaningMode::Safe).allowed);
        assert!(classifier.is_deletable(&txt, CleaningMode::Standard).allowed);
        assert!(classifier.is_deletable(&bare, CleaningMode::Aggressive).allowed);
    }

    #[test]
    fn verdicts_are_repeatable_and_monotonic_in_mode() {
        let dir = TempDir::new().unwrap();
        let classifier = SafetyClassifier::new();
        for name in ["a.tmp", "b.log", "c.txt", "d.exe", "config/e.tmp", "f"] {
            let path = touch(&dir, name);
            let safe = classifier.is_deletable(&path, CleaningMode::Safe);
            assert_eq!(safe, classifier.is_deletable(&path, CleaningMode::Safe));
            let standard = classifier.is_deletable(&path, CleaningMode::Standard);
            let aggressive = classifier.is_deletable(&path, CleaningMode::Aggressive);
            if safe.allowed {
                assert!(standard.allowed, "{}", name);
            }
            if standard.allowed {
                assert!(aggressive.allowed, "{}", name);
            }
        }
    }

    #[test]
    fn custom_protected_path_covers_descendants() {
        let dir = TempDir::new().unwrap();
        let vault = dir.path().join("vault");
        let classifier =
            SafetyClassifier::with_protections(SYSTEM_PROTECTIONS.clone().with_path(&vault));
        let inside = touch(&dir, "vault/old.tmp");
        let outside = touch(&dir, "vault2/old.tmp");
        assert!(!classifier.is_deletable(&inside, CleaningMode::Aggressive).allowed);
        assert!(classifier.protected_location(&vault).is_some());
        assert!(classifier.is_deletable(&outside, CleaningMode::Aggressive).allowed);
    }

    #[test]
    fn missing_file_is_not_deletable() {
        let dir = TempDir::new().unwrap();
        let v = SafetyClassifier::new()
            .is_deletable(&dir.path().join("gone.tmp"), CleaningMode::Aggressive);
        assert!(!v.allowed);
    }

    #[cfg(unix)]
    #[test]
    fn locked_file_is_reported_in_use() {
        use fs2::FileExt;

        let dir = TempDir::new().unwrap();
        let path = touch(&dir, "busy.tmp");
        let holder = File::open(&path).unwrap();
        FileExt::lock_exclusive(&holder).unwrap();
        let v = SafetyClassifier::new().is_deletable(&path, CleaningMode::Standard);
        assert!(!v.allowed);
        assert_eq!(v.reason, "file is in use");
        FileExt::unlock(&holder).unwrap();
        assert!(SafetyClassifier::new()
            .is_deletable(&path, CleaningMode::Standard)
            .allowed);
    }
}
