use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use tempfile::TempDir;

use super::*;
use crate::error::{CleanerError, Result};
use crate::format::megabytes_to_bytes;
use crate::ops::{OperationRegistry, RunState};

const DAY: u64 = 24 * 60 * 60;

fn write_aged(path: &Path, bytes: usize, days_old: u64) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, vec![0u8; bytes]).unwrap();
    let mtime = SystemTime::now() - Duration::from_secs(days_old * DAY + 60);
    filetime::set_file_mtime(path, FileTime::from_system_time(mtime)).unwrap();
    path.to_path_buf()
}

#[derive(Default)]
struct FakeRecycleBin {
    emptied: AtomicBool,
}

impl RecycleBin for FakeRecycleBin {
    fn summary(&self) -> Result<RecycleBinSummary> {
        Ok(RecycleBinSummary {
            items: 3,
            bytes: 300,
        })
    }

    fn empty(&self) -> Result<RecycleBinSummary> {
        self.emptied.store(true, Ordering::SeqCst);
        self.summary()
    }
}

#[derive(Clone, Default)]
struct CountingCookieStore {
    calls: Arc<AtomicU64>,
}

impl CookieStore for CountingCookieStore {
    fn expire_all(&self, _profile: &BrowserProfile) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(12)
    }
}

/// Remembers what it was asked to dispose and moves it aside.
#[derive(Clone)]
struct RecordingDisposal {
    quarantine: Arc<QuarantineDir>,
    seen: Arc<Mutex<Vec<PathBuf>>>,
}

impl RecordingDisposal {
    fn new(dir: &Path) -> Self {
        RecordingDisposal {
            quarantine: Arc::new(QuarantineDir::new(dir).unwrap()),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

impl Disposal for RecordingDisposal {
    fn dispose(&self, path: &Path) -> Result<()> {
        self.seen.lock().unwrap().push(path.to_path_buf());
        self.quarantine.dispose(path)
    }
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Fixture {
            dir: TempDir::new().unwrap(),
        }
    }

    fn root(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::create_dir_all(&path).unwrap();
        path
    }

    fn disposal(&self) -> RecordingDisposal {
        RecordingDisposal::new(&self.dir.path().join("quarantine"))
    }

    fn engine(&self, rules: Vec<CleaningRule>, disposal: RecordingDisposal) -> CleanupEngine {
        CleanupEngine::new(CleaningRuleSet::new(rules).unwrap())
            .with_disposal(disposal)
            .with_recycle_bin(FakeRecycleBin::default())
            .with_browser_profiles(Vec::new())
    }
}

fn files_of(report: &CleanupReport) -> BTreeSet<PathBuf> {
    report
        .results
        .values()
        .flat_map(|r| r.file_paths())
        .map(Path::to_path_buf)
        .collect()
}

#[test]
fn ten_day_old_tmp_file_standard_versus_safe() {
    let fx = Fixture::new();
    let root = fx.root("temp");
    let file = write_aged(&root.join("a.tmp"), 16, 10);
    let rule = CleaningRule::new("Temp", CleaningCategory::Temp, vec![root]).with_min_age_days(7);
    let engine = fx.engine(vec![rule.clone()], fx.disposal());

    assert!(engine.should_clean(&file, &rule, CleaningMode::Standard).allowed);

    let strict = SafetyClassifier::new().with_safe_extensions(["log"]);
    let engine = engine.with_classifier(strict);
    let verdict = engine.should_clean(&file, &rule, CleaningMode::Safe);
    assert!(!verdict.allowed);
    assert!(verdict.reason.contains("extension .tmp"), "{}", verdict.reason);
    assert!(verdict.reason.contains("allow-list"), "{}", verdict.reason);
}

#[test]
fn aggressive_mode_lowers_minimum_age() {
    let fx = Fixture::new();
    let root = fx.root("temp");
    let file = write_aged(&root.join("young.tmp"), 16, 3);
    let rule = CleaningRule::new("Temp", CleaningCategory::Temp, vec![root]).with_min_age_days(7);
    let engine = fx.engine(vec![rule.clone()], fx.disposal());

    let standard = engine.should_clean(&file, &rule, CleaningMode::Standard);
    assert!(!standard.allowed);
    assert!(standard.reason.contains("minimum age is 7"), "{}", standard.reason);
    assert!(!engine.should_clean(&file, &rule, CleaningMode::Safe).allowed);
    assert!(engine.should_clean(&file, &rule, CleaningMode::Aggressive).allowed);
}

#[test]
fn size_caps_follow_rule_then_mode_default() {
    let fx = Fixture::new();
    let root = fx.root("temp");
    let small = write_aged(&root.join("small.tmp"), 2 * 1024 * 1024, 30);
    let capped = CleaningRule::new("Capped", CleaningCategory::Temp, vec![root.clone()])
        .with_max_size_mb(1);
    let engine = fx.engine(vec![capped.clone()], fx.disposal());
    for mode in [CleaningMode::Safe, CleaningMode::Standard, CleaningMode::Aggressive] {
        let verdict = engine.should_clean(&small, &capped, mode);
        assert!(!verdict.allowed && verdict.reason.contains("larger than"));
    }

    let huge = root.join("huge.tmp");
    let file = File::create(&huge).unwrap();
    file.set_len(megabytes_to_bytes(101)).unwrap();
    drop(file);
    let mtime = SystemTime::now() - Duration::from_secs(30 * DAY);
    filetime::set_file_mtime(&huge, FileTime::from_system_time(mtime)).unwrap();
    let uncapped = CleaningRule::new("Uncapped", CleaningCategory::Temp, vec![root]);
    assert!(!engine.should_clean(&huge, &uncapped, CleaningMode::Standard).allowed);
    assert!(engine.should_clean(&huge, &uncapped, CleaningMode::Aggressive).allowed);
}

#[test]
fn rule_filters_extension_and_exclusions() {
    let fx = Fixture::new();
    let root = fx.root("logs");
    let log = write_aged(&root.join("app.log"), 8, 40);
    let txt = write_aged(&root.join("app.txt"), 8, 40);
    let kept = write_aged(&root.join("keep").join("app.log"), 8, 40);
    let rule = CleaningRule::new("Logs", CleaningCategory::Logs, vec![root])
        .with_extensions(["log"])
        .with_excludes(["KEEP"]);
    let engine = fx.engine(vec![rule.clone()], fx.disposal());

    assert!(engine.should_clean(&log, &rule, CleaningMode::Standard).allowed);
    assert!(!engine.should_clean(&txt, &rule, CleaningMode::Standard).allowed);
    let verdict = engine.should_clean(&kept, &rule, CleaningMode::Standard);
    assert!(verdict.reason.contains("keep"), "{}", verdict.reason);
}

#[test]
fn preview_and_execute_agree_on_files() {
    let fx = Fixture::new();
    let temp = fx.root("temp");
    let logs = fx.root("logs");
    write_aged(&temp.join("a.tmp"), 100, 10);
    write_aged(&temp.join("nested").join("b.tmp"), 200, 10);
    write_aged(&temp.join("fresh.tmp"), 50, 0);
    write_aged(&logs.join("x.log"), 300, 40);
    write_aged(&logs.join("y.txt"), 300, 40);

    let rules = vec![
        CleaningRule::new("Temp", CleaningCategory::Temp, vec![temp.clone()]).with_min_age_days(7),
        CleaningRule::new("Logs", CleaningCategory::Logs, vec![logs.clone()])
            .with_extensions(["log"])
            .with_min_age_days(30),
    ];
    let disposal = fx.disposal();
    let engine = fx.engine(rules, disposal.clone());

    let preview = engine.preview(CleaningMode::Standard);
    assert!(preview.dry_run);
    assert_eq!(preview.state, RunState::Completed);
    let previewed = files_of(&preview);
    assert_eq!(previewed.len(), 3);
    assert!(disposal.seen().is_empty());
    assert!(temp.join("a.tmp").exists());

    let executed = engine.execute(CleaningMode::Standard, None, None);
    assert_eq!(executed.state, RunState::Completed);
    assert_eq!(files_of(&executed), previewed);
    assert_eq!(
        preview.get(CleaningCategory::Temp).unwrap().size_freed,
        executed.get(CleaningCategory::Temp).unwrap().size_freed
    );
    assert_eq!(executed.get(CleaningCategory::Temp).unwrap().size_freed, 300);
    assert!(!temp.join("a.tmp").exists());
    assert!(temp.join("fresh.tmp").exists());
    assert!(logs.join("y.txt").exists());
    assert_eq!(
        disposal.seen().into_iter().collect::<BTreeSet<_>>(),
        previewed
    );
}

#[test]
fn protected_files_never_reach_results() {
    let fx = Fixture::new();
    let root = fx.root("junk");
    for name in [
        "report.pdf",
        "cache.sqlite",
        "Thumbs.db",
        "desktop.ini",
        "config/settings.tmp",
        "drivers/x.tmp",
        "ok.tmp",
    ] {
        write_aged(&root.join(name), 10, 60);
    }
    let rule = CleaningRule::new("Junk", CleaningCategory::Temp, vec![root.clone()]);

    for mode in [CleaningMode::Safe, CleaningMode::Standard, CleaningMode::Aggressive] {
        let engine = fx.engine(vec![rule.clone()], fx.disposal());
        let report = engine.preview(mode);
        for path in files_of(&report) {
            let classifier = engine.classifier();
            assert!(classifier.protected_location(&path).is_none(), "{:?}", path);
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            assert!(!PROTECTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
        }
        assert_eq!(files_of(&report), BTreeSet::from([root.join("ok.tmp")]));
    }

    let engine = fx.engine(vec![rule], fx.disposal());
    engine.execute(CleaningMode::Aggressive, None, None);
    assert!(root.join("report.pdf").exists());
    assert!(root.join("config").join("settings.tmp").exists());
    assert!(!root.join("ok.tmp").exists());
}

#[test]
fn overlapping_rules_dispose_each_file_once() {
    let fx = Fixture::new();
    let outer = fx.root("shared");
    let inner = outer.join("inner");
    write_aged(&inner.join("dup.tmp"), 64, 10);
    let rules = vec![
        CleaningRule::new("Outer", CleaningCategory::Temp, vec![outer.clone()]),
        CleaningRule::new("Inner", CleaningCategory::Cache, vec![inner.clone()]),
    ];
    let disposal = fx.disposal();
    let engine = fx.engine(rules, disposal.clone());
    assert_eq!(engine.rules().overlaps().len(), 1);

    let preview = engine.preview(CleaningMode::Standard);
    assert_eq!(preview.get(CleaningCategory::Temp).unwrap().files_removed, 1);
    assert_eq!(preview.get(CleaningCategory::Cache).unwrap().files_removed, 0);

    let report = engine.execute(CleaningMode::Standard, None, None);
    assert_eq!(disposal.seen(), vec![inner.join("dup.tmp")]);
    assert!(report.get(CleaningCategory::Temp).unwrap().errors.is_empty());
    assert!(report.get(CleaningCategory::Cache).unwrap().errors.is_empty());
}

#[test]
fn emptied_directories_are_removed_bottom_up() {
    let fx = Fixture::new();
    let root = fx.root("temp");
    write_aged(&root.join("a").join("b").join("c.tmp"), 8, 10);
    write_aged(&root.join("mixed").join("old.tmp"), 8, 10);
    write_aged(&root.join("mixed").join("new.tmp"), 8, 0);
    fs::create_dir_all(root.join("untouched")).unwrap();
    let rule = CleaningRule::new("Temp", CleaningCategory::Temp, vec![root.clone()])
        .with_min_age_days(7);
    let engine = fx.engine(vec![rule], fx.disposal());

    let report = engine.execute(CleaningMode::Standard, None, None);
    let temp = report.get(CleaningCategory::Temp).unwrap();
    let removed_dirs: Vec<_> = temp
        .details
        .iter()
        .filter(|d| d.kind == ItemKind::EmptyDirectory)
        .map(|d| d.path.clone())
        .collect();
    assert_eq!(removed_dirs, vec![root.join("a").join("b"), root.join("a")]);
    assert!(root.exists());
    assert!(root.join("mixed").exists());
    assert!(root.join("untouched").exists());
    assert_eq!(temp.files_removed, 2);
}

#[test]
fn emptied_directories_with_protected_extensions_are_kept() {
    let fx = Fixture::new();
    let root = fx.root("temp");
    write_aged(&root.join("archive.zip").join("old.tmp"), 8, 10);
    write_aged(&root.join("store.db").join("old.tmp"), 8, 10);
    write_aged(&root.join("plain").join("old.tmp"), 8, 10);
    let rule = CleaningRule::new("Temp", CleaningCategory::Temp, vec![root.clone()]);
    let engine = fx.engine(vec![rule], fx.disposal());

    let report = engine.execute(CleaningMode::Standard, None, None);
    let temp = report.get(CleaningCategory::Temp).unwrap();
    assert_eq!(temp.files_removed, 3);
    let removed_dirs: Vec<_> = temp
        .details
        .iter()
        .filter(|d| d.kind == ItemKind::EmptyDirectory)
        .map(|d| d.path.clone())
        .collect();
    assert_eq!(removed_dirs, vec![root.join("plain")]);
    assert!(root.join("archive.zip").is_dir());
    assert!(root.join("store.db").is_dir());
    for item in &temp.details {
        let ext = item.path.extension().and_then(|e| e.to_str()).unwrap_or("");
        assert!(!PROTECTED_EXTENSIONS.contains(&ext), "{:?}", item.path);
    }
}

/// Refuses the first path it is handed, then defers to the inner disposal.
struct FailFirst {
    inner: RecordingDisposal,
    failed: AtomicBool,
}

impl Disposal for FailFirst {
    fn dispose(&self, path: &Path) -> Result<()> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(CleanerError::Collaborator {
                name: "test disposal",
                message: "access denied".into(),
            });
        }
        self.inner.dispose(path)
    }
}

#[test]
fn failed_disposal_is_recorded_and_the_run_continues() {
    let fx = Fixture::new();
    let root = fx.root("temp");
    write_aged(&root.join("a.tmp"), 10, 10);
    write_aged(&root.join("b.tmp"), 20, 10);
    let logs = fx.root("logs");
    write_aged(&logs.join("c.log"), 40, 10);
    let rules = vec![
        CleaningRule::new("Temp", CleaningCategory::Temp, vec![root.clone()]),
        CleaningRule::new("Logs", CleaningCategory::Logs, vec![logs.clone()]),
    ];
    let inner = fx.disposal();
    let engine = CleanupEngine::new(CleaningRuleSet::new(rules).unwrap())
        .with_disposal(FailFirst {
            inner: inner.clone(),
            failed: AtomicBool::new(false),
        })
        .with_recycle_bin(FakeRecycleBin::default())
        .with_browser_profiles(Vec::new());

    let report = engine.execute(CleaningMode::Standard, None, None);
    assert_eq!(report.state, RunState::Completed);
    let temp = report.get(CleaningCategory::Temp).unwrap();
    assert_eq!(temp.errors.len(), 1);
    assert!(temp.errors[0].starts_with("failed to remove"), "{}", temp.errors[0]);
    assert!(temp.errors[0].contains("access denied"));
    assert_eq!(temp.files_removed, 1);
    assert_eq!(temp.file_paths().len(), 1);
    assert_eq!(report.get(CleaningCategory::Logs).unwrap().files_removed, 1);
    assert_eq!(inner.seen().len(), 2);

    let remaining = [root.join("a.tmp"), root.join("b.tmp")]
        .iter()
        .filter(|p| p.exists())
        .count();
    assert_eq!(remaining, 1);
}

#[cfg(unix)]
#[test]
fn unreadable_root_fails_the_run_but_siblings_still_clean() {
    let fx = Fixture::new();
    let blocker = fx.dir.path().join("not-a-dir.txt");
    fs::write(&blocker, b"x").unwrap();
    let present = fx.root("present");
    write_aged(&present.join("a.tmp"), 8, 10);
    let rules = vec![
        CleaningRule::new("Broken", CleaningCategory::Temp, vec![blocker.join("child")]),
        CleaningRule::new("Here", CleaningCategory::Cache, vec![present.clone()]),
    ];
    let engine = fx.engine(rules, fx.disposal());

    let report = engine.execute(CleaningMode::Standard, None, None);
    assert_eq!(report.state, RunState::Failed);
    assert_eq!(engine.state(), RunState::Failed);
    let broken = report.get(CleaningCategory::Temp).unwrap();
    assert_eq!(broken.warnings.len(), 1);
    assert!(broken.warnings[0].starts_with("Broken: root"), "{}", broken.warnings[0]);
    assert!(broken.warnings[0].contains("unavailable"));
    assert_eq!(report.get(CleaningCategory::Cache).unwrap().files_removed, 1);
    assert!(!present.join("a.tmp").exists());
    assert!(report.get(CleaningCategory::RecycleBin).is_some());
}

#[test]
fn history_rules_wait_for_aggressive_mode() {
    let fx = Fixture::new();
    let root = fx.root("recent");
    write_aged(&root.join("item.lnk"), 8, 40);
    let rule = CleaningRule::new("Recent", CleaningCategory::History, vec![root]);
    let engine = fx.engine(vec![rule], fx.disposal());

    let standard = engine.preview(CleaningMode::Standard);
    let history = standard.get(CleaningCategory::History).unwrap();
    assert_eq!(history.files_removed, 0);
    assert!(history.warnings[0].contains("aggressive"));

    let aggressive = engine.preview(CleaningMode::Aggressive);
    assert_eq!(aggressive.get(CleaningCategory::History).unwrap().files_removed, 1);
}

#[test]
fn missing_root_is_a_warning_not_a_failure() {
    let fx = Fixture::new();
    let present = fx.root("present");
    write_aged(&present.join("a.tmp"), 8, 10);
    let rules = vec![
        CleaningRule::new("Gone", CleaningCategory::Temp, vec![fx.dir.path().join("nope")]),
        CleaningRule::new("Here", CleaningCategory::Cache, vec![present]),
    ];
    let engine = fx.engine(rules, fx.disposal());
    let report = engine.execute(CleaningMode::Standard, None, None);
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(engine.state(), RunState::Completed);
    let temp = report.get(CleaningCategory::Temp).unwrap();
    assert!(temp.warnings[0].contains("not found"));
    assert_eq!(report.get(CleaningCategory::Cache).unwrap().files_removed, 1);
}

#[test]
fn progress_ticks_per_unit_and_counts_categories() {
    let fx = Fixture::new();
    let rules = ["one", "two", "three"]
        .iter()
        .map(|n| CleaningRule::new(*n, CleaningCategory::Temp, vec![fx.root(n)]))
        .collect();
    let engine = fx.engine(rules, fx.disposal());
    let seen = Mutex::new(Vec::new());
    let callback = |message: &str, percent: f32| {
        seen.lock().unwrap().push((message.to_string(), percent));
    };
    let progress: ProgressCallback<'_> = &callback;

    engine.execute(CleaningMode::Standard, None, Some(progress));
    let seen = seen.into_inner().unwrap();
    let percents: Vec<f32> = seen.iter().map(|(_, p)| *p).collect();
    // Three temp rules, the recycle bin and browser caches: three categories.
    assert_eq!(percents, vec![0.0, 0.0, 100.0 / 3.0, 200.0 / 3.0, 100.0]);
    assert_eq!(seen[0].0, "one finished");
    assert_eq!(seen[4].0, "Browser cache finished");
}

#[test]
fn stop_ends_the_run_after_the_current_unit() {
    let fx = Fixture::new();
    let mut rules = Vec::new();
    for (name, category) in [
        ("one", CleaningCategory::Temp),
        ("two", CleaningCategory::Logs),
        ("three", CleaningCategory::Cache),
    ] {
        let root = fx.root(name);
        write_aged(&root.join("x.tmp"), 8, 10);
        rules.push(CleaningRule::new(name, category, vec![root]));
    }
    let engine = fx.engine(rules, fx.disposal());
    let callback = |_: &str, _: f32| engine.stop();
    let progress: ProgressCallback<'_> = &callback;

    let report = engine.execute(CleaningMode::Standard, None, Some(progress));
    assert_eq!(report.state, RunState::Stopped);
    assert_eq!(engine.state(), RunState::Stopped);
    assert_eq!(report.results.len(), 1);
    assert!(fx.dir.path().join("two").join("x.tmp").exists());

    // A stop never leaks into the next run.
    let again = engine.execute(CleaningMode::Standard, None, None);
    assert_eq!(again.state, RunState::Completed);
    assert_eq!(files_of(&again).len(), 2);
}

#[test]
fn selected_categories_limit_the_run() {
    let fx = Fixture::new();
    let temp = fx.root("temp");
    let logs = fx.root("logs");
    write_aged(&temp.join("a.tmp"), 8, 10);
    write_aged(&logs.join("b.log"), 8, 40);
    let bin = Arc::new(FakeRecycleBin::default());
    let rules = vec![
        CleaningRule::new("Temp", CleaningCategory::Temp, vec![temp.clone()]),
        CleaningRule::new("Logs", CleaningCategory::Logs, vec![logs.clone()]),
    ];
    let engine = fx
        .engine(rules, fx.disposal())
        .with_recycle_bin(SharedBin(Arc::clone(&bin)));

    let selected = [CleaningCategory::Logs];
    let report = engine.execute(CleaningMode::Standard, Some(&selected[..]), None);
    assert_eq!(
        report.results.keys().copied().collect::<Vec<_>>(),
        vec![CleaningCategory::Logs]
    );
    assert!(temp.join("a.tmp").exists());
    assert!(!logs.join("b.log").exists());
    assert!(!bin.emptied.load(Ordering::SeqCst));
}

struct SharedBin(Arc<FakeRecycleBin>);

impl RecycleBin for SharedBin {
    fn summary(&self) -> Result<RecycleBinSummary> {
        self.0.summary()
    }

    fn empty(&self) -> Result<RecycleBinSummary> {
        self.0.empty()
    }
}

#[test]
fn recycle_bin_is_summarized_in_preview_and_emptied_on_execute() {
    let fx = Fixture::new();
    let bin = Arc::new(FakeRecycleBin::default());
    let engine = fx
        .engine(Vec::new(), fx.disposal())
        .with_recycle_bin(SharedBin(Arc::clone(&bin)));

    let preview = engine.preview(CleaningMode::Safe);
    let summary = preview.get(CleaningCategory::RecycleBin).unwrap();
    assert_eq!((summary.files_removed, summary.size_freed), (3, 300));
    assert!(summary.details.is_empty());
    assert!(!bin.emptied.load(Ordering::SeqCst));

    let selected = [CleaningCategory::RecycleBin];
    let report = engine.execute(CleaningMode::Safe, Some(&selected[..]), None);
    assert_eq!(report.total_size(), 300);
    assert!(bin.emptied.load(Ordering::SeqCst));
}

#[test]
fn browser_caches_are_swept_and_cookies_follow_mode() {
    let fx = Fixture::new();
    let profile_dir = fx.root("chrome").join("Default");
    fs::create_dir_all(&profile_dir).unwrap();
    let cache_root = fx.root("chrome-cache");
    fs::create_dir_all(cache_root.join("Cache")).unwrap();
    fs::write(cache_root.join("Cache").join("data_0"), vec![1u8; 2048]).unwrap();
    fs::create_dir_all(profile_dir.join("Network")).unwrap();
    fs::write(profile_dir.join("Network").join("Cookies"), b"store").unwrap();
    let profile = BrowserProfile::chromium("Chrome", profile_dir.clone(), &cache_root);

    let cookies = CountingCookieStore::default();
    let engine = fx
        .engine(Vec::new(), fx.disposal())
        .with_browser_profiles(vec![profile.clone()])
        .with_cookie_store(cookies.clone());

    let preview = engine.preview(CleaningMode::Standard);
    let browser = preview.get(CleaningCategory::BrowserCache).unwrap();
    assert_eq!(browser.size_freed, 2048);
    assert_eq!(browser.details[0].kind, ItemKind::CacheDirectory);
    assert_eq!(cookies.calls.load(Ordering::SeqCst), 0);

    let browser_only = [CleaningCategory::BrowserCache];
    let safe = engine.execute(CleaningMode::Safe, Some(&browser_only[..]), None);
    assert_eq!(safe.total_size(), 2048);
    assert!(!cache_root.join("Cache").exists());
    assert_eq!(cookies.calls.load(Ordering::SeqCst), 0);
    assert!(profile_dir.join("Network").join("Cookies").exists());

    let standard = engine.execute(CleaningMode::Standard, Some(&browser_only[..]), None);
    assert_eq!(cookies.calls.load(Ordering::SeqCst), 1);
    let details = &standard.get(CleaningCategory::BrowserCache).unwrap().details;
    assert_eq!(details[0].kind, ItemKind::CookiesExpired);
    assert!(profile_dir.join("Network").join("Cookies").exists());

    let without_store = fx
        .engine(Vec::new(), fx.disposal())
        .with_browser_profiles(vec![profile]);
    let report = without_store.execute(CleaningMode::Aggressive, Some(&browser_only[..]), None);
    let warnings = &report.get(CleaningCategory::BrowserCache).unwrap().warnings;
    assert!(warnings[0].contains("left untouched"));
}

#[tokio::test]
async fn spawned_cleanup_streams_progress_then_report() {
    let fx = Fixture::new();
    let root = fx.root("temp");
    write_aged(&root.join("a.tmp"), 32, 10);
    let rule = CleaningRule::new("Temp", CleaningCategory::Temp, vec![root.clone()]);
    let engine = Arc::new(fx.engine(vec![rule], fx.disposal()));
    let registry = OperationRegistry::new();

    let handle = engine
        .spawn(&registry, CleaningMode::Standard, None, false)
        .unwrap();
    assert!(!handle.operation_id().is_empty());
    let (events, report) = handle.finish().await.unwrap();

    assert!(matches!(events.last(), Some(CleanupEvent::Finished(_))));
    let progress_count = events
        .iter()
        .filter(|e| matches!(e, CleanupEvent::Progress { .. }))
        .count();
    assert_eq!(progress_count, 3);
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.get(CleaningCategory::Temp).unwrap().files_removed, 1);
    assert!(!root.join("a.tmp").exists());
    assert!(registry.active().is_empty());
}
