use std::collections::{BTreeMap, HashSet};
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::browser::{discover_profiles, BrowserProfile, CookieStore};
use super::disposal::{Disposal, SystemTrash};
use super::recycle_bin::{RecycleBin, SystemRecycleBin};
use super::rules::{CleaningRule, CleaningRuleSet};
use super::safety::SafetyClassifier;
use super::types::{
    CleaningCategory, CleaningMode, CleaningResult, CleanupReport, ItemKind, Verdict,
};
use crate::config::CleanerConfig;
use crate::error::{CleanerError, Result};
use crate::folder_scan::{folder_size, ExclusionSet};
use crate::format::format_size;
use crate::ops::{RunState, RunTracker};

/// Receives `(message, percent)` after each rule or sweep completes. The
/// percentage is the share of categories whose units have all finished.
pub type ProgressCallback<'a> = &'a (dyn Fn(&str, f32) + Send + Sync);

/// Why a rule root was not walked. Only `Unreadable` fails the run.
enum RootIssue {
    Missing(String),
    Skipped(String),
    Unreadable(String),
}

/// One step of a run: a rule or a built-in sweep.
enum Unit<'r> {
    Rule(&'r CleaningRule),
    RecycleBin,
    BrowserCache,
}

impl Unit<'_> {
    fn category(&self) -> CleaningCategory {
        match self {
            Unit::Rule(rule) => rule.category,
            Unit::RecycleBin => CleaningCategory::RecycleBin,
            Unit::BrowserCache => CleaningCategory::BrowserCache,
        }
    }

    fn label(&self) -> &str {
        match self {
            Unit::Rule(rule) => &rule.name,
            Unit::RecycleBin => "Recycle Bin",
            Unit::BrowserCache => "Browser cache",
        }
    }
}

/// Applies a rule set under a cleaning mode. Preview and execute share one
/// code path and differ only in whether matches are disposed.
pub struct CleanupEngine {
    rules: CleaningRuleSet,
    classifier: SafetyClassifier,
    disposal: Box<dyn Disposal>,
    recycle_bin: Box<dyn RecycleBin>,
    browsers: Vec<BrowserProfile>,
    cookie_store: Option<Box<dyn CookieStore>>,
    tracker: RunTracker,
}

impl CleanupEngine {
    pub fn new(rules: CleaningRuleSet) -> Self {
        CleanupEngine {
            rules,
            classifier: SafetyClassifier::new(),
            disposal: Box::new(SystemTrash),
            recycle_bin: Box::new(SystemRecycleBin),
            browsers: discover_profiles(),
            cookie_store: None,
            tracker: RunTracker::new(),
        }
    }

    pub fn from_config(config: &CleanerConfig) -> Result<Self> {
        Ok(Self::new(CleaningRuleSet::load(config)?))
    }

    pub fn with_classifier(mut self, classifier: SafetyClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_disposal(mut self, disposal: impl Disposal + 'static) -> Self {
        self.disposal = Box::new(disposal);
        self
    }

    pub fn with_recycle_bin(mut self, recycle_bin: impl RecycleBin + 'static) -> Self {
        self.recycle_bin = Box::new(recycle_bin);
        self
    }

    pub fn with_browser_profiles(mut self, profiles: Vec<BrowserProfile>) -> Self {
        self.browsers = profiles;
        self
    }

    pub fn with_cookie_store(mut self, store: impl CookieStore + 'static) -> Self {
        self.cookie_store = Some(Box::new(store));
        self
    }

    pub fn rules(&self) -> &CleaningRuleSet {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut CleaningRuleSet {
        &mut self.rules
    }

    pub fn classifier(&self) -> &SafetyClassifier {
        &self.classifier
    }

    pub fn browser_profiles(&self) -> &[BrowserProfile] {
        &self.browsers
    }

    pub fn recycle_bin(&self) -> &dyn RecycleBin {
        self.recycle_bin.as_ref()
    }

    pub fn state(&self) -> RunState {
        self.tracker.state()
    }

    /// Cooperative: the current file finishes, then the run ends as `Stopped`.
    pub fn stop(&self) {
        self.tracker.stop();
    }

    /// Rule filters first (extension, age, size, exclusions), then the
    /// classifier.
    pub fn should_clean(&self, path: &Path, rule: &CleaningRule, mode: CleaningMode) -> Verdict {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_file() => self.evaluate(path, &meta, rule, mode, Utc::now()),
            Ok(_) => Verdict::reject("not a regular file"),
            Err(e) => Verdict::reject(format!("cannot read metadata: {}", e)),
        }
    }

    /// Everything `execute` would do for every category, without deleting.
    pub fn preview(&self, mode: CleaningMode) -> CleanupReport {
        self.run(mode, None, None, true, CancellationToken::new())
    }

    pub fn execute(
        &self,
        mode: CleaningMode,
        selected: Option<&[CleaningCategory]>,
        progress: Option<ProgressCallback<'_>>,
    ) -> CleanupReport {
        self.run(mode, selected, progress, false, CancellationToken::new())
    }

    pub(crate) fn run(
        &self,
        mode: CleaningMode,
        selected: Option<&[CleaningCategory]>,
        progress: Option<ProgressCallback<'_>>,
        dry_run: bool,
        token: CancellationToken,
    ) -> CleanupReport {
        self.tracker.begin_with(token.clone());
        let wanted = |category: CleaningCategory| selected.map_or(true, |s| s.contains(&category));

        let mut units: Vec<Unit<'_>> = self
            .rules
            .enabled()
            .filter(|r| wanted(r.category))
            .map(Unit::Rule)
            .collect();
        if wanted(CleaningCategory::RecycleBin) {
            units.push(Unit::RecycleBin);
        }
        if wanted(CleaningCategory::BrowserCache) {
            units.push(Unit::BrowserCache);
        }

        log::info!(
            "Starting {} in {:?} mode with {} units",
            if dry_run { "cleanup preview" } else { "cleanup" },
            mode,
            units.len()
        );

        // Progress counts categories; a category is done once its last unit is.
        let mut pending: BTreeMap<CleaningCategory, usize> = BTreeMap::new();
        for unit in &units {
            *pending.entry(unit.category()).or_default() += 1;
        }
        let total_categories = pending.len();
        let mut finished_categories = 0usize;
        let mut results: BTreeMap<CleaningCategory, CleaningResult> = BTreeMap::new();
        let mut claimed: HashSet<PathBuf> = HashSet::new();
        let mut failed = false;

        for unit in &units {
            if token.is_cancelled() {
                break;
            }
            let started = Instant::now();
            let mut result = CleaningResult::default();
            match unit {
                Unit::Rule(rule) if !mode.allows_category(rule.category) => {
                    result.warnings.push(format!(
                        "{}: {} rules only run in aggressive mode",
                        rule.name,
                        rule.category.label()
                    ));
                }
                Unit::Rule(rule) => {
                    failed |=
                        self.apply_rule(rule, mode, dry_run, &token, &mut claimed, &mut result);
                }
                Unit::RecycleBin => self.sweep_recycle_bin(dry_run, &mut result),
                Unit::BrowserCache => self.sweep_browsers(mode, dry_run, &token, &mut result),
            }
            result.duration = started.elapsed();
            results.entry(unit.category()).or_default().merge(result);

            if let Some(left) = pending.get_mut(&unit.category()) {
                *left -= 1;
                if *left == 0 {
                    finished_categories += 1;
                }
            }
            if let Some(callback) = progress {
                let percent = finished_categories as f32 * 100.0 / total_categories as f32;
                callback(&format!("{} finished", unit.label()), percent);
            }
        }

        let state = if token.is_cancelled() {
            RunState::Stopped
        } else if failed {
            RunState::Failed
        } else {
            RunState::Completed
        };
        self.tracker.finish(state);

        let report = CleanupReport {
            mode,
            dry_run,
            state,
            results,
        };
        log::info!("Cleanup {:?}: {}", state, report.summary_line());
        report
    }

    fn evaluate(
        &self,
        path: &Path,
        meta: &Metadata,
        rule: &CleaningRule,
        mode: CleaningMode,
        now: DateTime<Utc>,
    ) -> Verdict {
        if !rule.matches_extension(path) {
            return Verdict::reject(format!("extension not targeted by rule {}", rule.name));
        }

        let min_age = mode.effective_min_age_days(rule.min_age_days);
        match meta.modified() {
            Ok(modified) => {
                let age = now
                    .signed_duration_since(DateTime::<Utc>::from(modified))
                    .num_days();
                if age < i64::from(min_age) {
                    return Verdict::reject(format!(
                        "modified {} days ago, minimum age is {} days",
                        age, min_age
                    ));
                }
            }
            Err(_) if min_age > 0 => return Verdict::reject("modification time unavailable"),
            Err(_) => {}
        }

        if let Some(max) = mode.effective_max_size_bytes(rule.max_size_mb) {
            if meta.len() > max {
                return Verdict::reject(format!("larger than {}", format_size(max)));
            }
        }

        if let Some(substring) = rule.excluded_by(path) {
            return Verdict::reject(format!("path contains excluded '{}'", substring));
        }

        self.classifier.is_deletable(path, mode)
    }

    /// Returns true when a root could not be enumerated at all.
    fn apply_rule(
        &self,
        rule: &CleaningRule,
        mode: CleaningMode,
        dry_run: bool,
        token: &CancellationToken,
        claimed: &mut HashSet<PathBuf>,
        result: &mut CleaningResult,
    ) -> bool {
        let now = Utc::now();
        let mut failed = false;

        for root in &rule.path_roots {
            if token.is_cancelled() {
                break;
            }
            if let Err(issue) = self.check_root(root) {
                let (message, fatal) = match issue {
                    RootIssue::Missing(m) | RootIssue::Skipped(m) => (m, false),
                    RootIssue::Unreadable(m) => (m, true),
                };
                result.warnings.push(format!("{}: {}", rule.name, message));
                failed |= fatal;
                continue;
            }

            let mut emptied: HashSet<PathBuf> = HashSet::new();
            for entry in WalkDir::new(root).follow_links(false) {
                if token.is_cancelled() {
                    return failed;
                }
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        let at = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                        result.warnings.push(format!("{}: skipped {}: {}", rule.name, at, e));
                        continue;
                    }
                };
                if !entry.file_type().is_file() || claimed.contains(entry.path()) {
                    continue;
                }
                let path = entry.path();
                let meta = match entry.metadata() {
                    Ok(meta) => meta,
                    Err(e) => {
                        result
                            .warnings
                            .push(format!("{}: skipped {}: {}", rule.name, path.display(), e));
                        continue;
                    }
                };

                let verdict = self.evaluate(path, &meta, rule, mode, now);
                if !verdict.allowed {
                    log::trace!("Keeping {}: {}", path.display(), verdict.reason);
                    continue;
                }
                claimed.insert(path.to_path_buf());

                let size = meta.len();
                if dry_run {
                    result.record(path, size, ItemKind::File);
                    continue;
                }
                match self.disposal.dispose(path) {
                    Ok(()) => {
                        result.record(path, size, ItemKind::File);
                        for ancestor in path.ancestors().skip(1) {
                            if ancestor == root.as_path() || !ancestor.starts_with(root) {
                                break;
                            }
                            emptied.insert(ancestor.to_path_buf());
                        }
                    }
                    Err(e) => result
                        .errors
                        .push(format!("failed to remove {}: {}", path.display(), e)),
                }
            }

            if !dry_run {
                self.remove_empty_dirs(emptied, rule, result);
            }
        }
        failed
    }

    fn check_root(&self, root: &Path) -> std::result::Result<(), RootIssue> {
        let meta = fs::metadata(root).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                RootIssue::Missing(format!("root {} not found", root.display()))
            }
            _ => RootIssue::Unreadable(format!("root {} unavailable: {}", root.display(), e)),
        })?;
        if !meta.is_dir() {
            return Err(RootIssue::Missing(format!(
                "root {} is not a directory",
                root.display()
            )));
        }
        if let Some(reason) = self.classifier.protected_location(root) {
            return Err(RootIssue::Skipped(format!(
                "root {} skipped: {}",
                root.display(),
                reason
            )));
        }
        fs::read_dir(root).map(|_| ()).map_err(|e| {
            RootIssue::Unreadable(format!("cannot enumerate {}: {}", root.display(), e))
        })
    }

    /// Deepest first, so a parent emptied by its children goes too.
    fn remove_empty_dirs(
        &self,
        emptied: HashSet<PathBuf>,
        rule: &CleaningRule,
        result: &mut CleaningResult,
    ) {
        let mut dirs: Vec<PathBuf> = emptied.into_iter().collect();
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
        for dir in dirs {
            if rule.excluded_by(&dir).is_some()
                || self.classifier.protected_for_removal(&dir).is_some()
            {
                continue;
            }
            let is_empty = fs::read_dir(&dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty {
                continue;
            }
            match fs::remove_dir(&dir) {
                Ok(()) => result.record(&dir, 0, ItemKind::EmptyDirectory),
                Err(e) => log::debug!("Could not remove empty dir {}: {}", dir.display(), e),
            }
        }
    }

    fn sweep_recycle_bin(&self, dry_run: bool, result: &mut CleaningResult) {
        let outcome = if dry_run {
            self.recycle_bin.summary()
        } else {
            self.recycle_bin.empty()
        };
        match outcome {
            Ok(summary) => result.record_bulk(summary.items, summary.bytes),
            Err(e @ CleanerError::Unsupported(_)) => result.warnings.push(e.to_string()),
            Err(e) => result.errors.push(e.to_string()),
        }
    }

    fn sweep_browsers(
        &self,
        mode: CleaningMode,
        dry_run: bool,
        token: &CancellationToken,
        result: &mut CleaningResult,
    ) {
        for profile in &self.browsers {
            for dir in profile.existing_cache_dirs() {
                if token.is_cancelled() {
                    return;
                }
                if let Some(reason) = self.classifier.protected_for_removal(dir) {
                    result.warnings.push(format!(
                        "{} cache {} skipped: {}",
                        profile.browser,
                        dir.display(),
                        reason
                    ));
                    continue;
                }
                let size = match folder_size(dir, &ExclusionSet::empty()) {
                    Ok(size) => size,
                    Err(e) => {
                        result.warnings.push(format!(
                            "{} cache {} unreadable: {}",
                            profile.browser,
                            dir.display(),
                            e
                        ));
                        continue;
                    }
                };
                if dry_run {
                    result.record(dir, size, ItemKind::CacheDirectory);
                    continue;
                }
                match self.disposal.dispose(dir) {
                    Ok(()) => result.record(dir, size, ItemKind::CacheDirectory),
                    Err(e) => result
                        .errors
                        .push(format!("failed to remove {}: {}", dir.display(), e)),
                }
            }

            if dry_run || !mode.touches_cookies() || !profile.has_cookie_store() {
                continue;
            }
            match &self.cookie_store {
                Some(store) => match store.expire_all(profile) {
                    Ok(expired) => {
                        log::info!("Expired {} {} cookies", expired, profile.browser);
                        result.record(&profile.profile_dir, 0, ItemKind::CookiesExpired);
                    }
                    Err(e) => result
                        .errors
                        .push(format!("{} cookies: {}", profile.browser, e)),
                },
                None => result.warnings.push(format!(
                    "{} cookies left untouched: no cookie store handler configured",
                    profile.browser
                )),
            }
        }
    }
}
