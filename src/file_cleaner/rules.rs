use std::collections::{BTreeSet, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::types::CleaningCategory;
use crate::config::CleanerConfig;
use crate::error::{CleanerError, Result};

/// Points at a JSON rule document that replaces the built-in table.
pub const RULES_OVERRIDE_ENV_VAR: &str = "SKRIPCLEAN_RULES_OVERRIDE";

const BUILTIN_RULES: &str = include_str!("../../rules/cleaner_rules.json");
const RULES_VERSION: u32 = 1;

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"%([A-Za-z0-9_()]+)%").expect("placeholder pattern is valid");
}

#[derive(Debug, Deserialize)]
struct RuleDocument {
    version: u32,
    rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    name: String,
    category: CleaningCategory,
    path_roots: Vec<String>,
    #[serde(default)]
    extensions: Vec<String>,
    #[serde(default)]
    min_age_days: u32,
    #[serde(default)]
    max_size_mb: Option<u64>,
    #[serde(default)]
    exclude_substrings: Vec<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A named policy: which files under which roots may be cleaned.
///
/// Extensions are stored lowercase without the leading dot, exclusion
/// substrings lowercase. Roots are already expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningRule {
    pub name: String,
    pub category: CleaningCategory,
    pub path_roots: Vec<PathBuf>,
    pub extensions: BTreeSet<String>,
    pub min_age_days: u32,
    pub max_size_mb: Option<u64>,
    pub exclude_substrings: Vec<String>,
    pub enabled: bool,
}

impl CleaningRule {
    pub fn new(
        name: impl Into<String>,
        category: CleaningCategory,
        path_roots: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        CleaningRule {
            name: name.into(),
            category,
            path_roots: path_roots.into_iter().collect(),
            extensions: BTreeSet::new(),
            min_age_days: 0,
            max_size_mb: None,
            exclude_substrings: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn with_min_age_days(mut self, days: u32) -> Self {
        self.min_age_days = days;
        self
    }

    pub fn with_max_size_mb(mut self, mb: u64) -> Self {
        self.max_size_mb = Some(mb);
        self
    }

    pub fn with_excludes<I, S>(mut self, substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclude_substrings = substrings
            .into_iter()
            .map(|s| s.as_ref().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// An empty extension set matches every file.
    pub fn matches_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }

    pub fn excluded_by(&self, path: &Path) -> Option<&str> {
        if self.exclude_substrings.is_empty() {
            return None;
        }
        let lower = path.to_string_lossy().to_lowercase();
        self.exclude_substrings
            .iter()
            .find(|s| lower.contains(s.as_str()))
            .map(|s| s.as_str())
    }

    fn from_raw(raw: RawRule) -> Result<Self> {
        if raw.path_roots.iter().any(|r| r.trim().is_empty()) {
            return Err(CleanerError::invalid_rule(&raw.name, "empty path root"));
        }
        let mut rule = CleaningRule::new(
            raw.name,
            raw.category,
            raw.path_roots.iter().map(|r| expand_root(r)),
        )
        .with_extensions(&raw.extensions)
        .with_min_age_days(raw.min_age_days)
        .with_excludes(&raw.exclude_substrings);
        rule.max_size_mb = raw.max_size_mb;
        rule.enabled = raw.enabled;
        Ok(rule)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CleanerError::invalid_rule(&self.name, "name must not be empty"));
        }
        if self.path_roots.is_empty() {
            return Err(CleanerError::invalid_rule(
                &self.name,
                "at least one path root is required",
            ));
        }
        if self.path_roots.iter().any(|r| r.as_os_str().is_empty()) {
            return Err(CleanerError::invalid_rule(&self.name, "empty path root"));
        }
        if self.category.is_builtin_sweep() {
            return Err(CleanerError::invalid_rule(
                &self.name,
                format!(
                    "category {:?} is handled by a dedicated sweep",
                    self.category
                ),
            ));
        }
        Ok(())
    }
}

/// Two enabled rules whose roots nest or coincide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOverlap {
    pub first: String,
    pub second: String,
    pub root: PathBuf,
}

/// Ordered, validated rule table. Names are unique.
#[derive(Debug, Clone, Default)]
pub struct CleaningRuleSet {
    rules: Vec<CleaningRule>,
}

impl CleaningRuleSet {
    pub fn new(rules: Vec<CleaningRule>) -> Result<Self> {
        let mut seen = HashSet::new();
        for rule in &rules {
            rule.validate()?;
            if !seen.insert(rule.name.as_str()) {
                return Err(CleanerError::invalid_rule(&rule.name, "duplicate rule name"));
            }
        }
        Ok(CleaningRuleSet { rules })
    }

    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_RULES)
    }

    /// Override env var first, then the configured file, then the built-in table.
    pub fn load(config: &CleanerConfig) -> Result<Self> {
        if let Ok(path) = env::var(RULES_OVERRIDE_ENV_VAR) {
            if !path.trim().is_empty() {
                log::info!("Loading cleaning rules override from {}", path);
                return Self::from_file(Path::new(&path));
            }
        }
        match &config.rules_file {
            Some(path) => {
                log::info!("Loading cleaning rules from {}", path.display());
                Self::from_file(path)
            }
            None => Self::builtin(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            CleanerError::InvalidConfig(format!("cannot read rules {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let doc: RuleDocument = serde_json::from_str(raw)
            .map_err(|e| CleanerError::InvalidConfig(format!("malformed rule document: {}", e)))?;
        if doc.version != RULES_VERSION {
            return Err(CleanerError::InvalidConfig(format!(
                "unsupported rule document version {}",
                doc.version
            )));
        }
        let rules = doc
            .rules
            .into_iter()
            .map(CleaningRule::from_raw)
            .collect::<Result<Vec<_>>>()?;
        Self::new(rules)
    }

    pub fn rules(&self) -> &[CleaningRule] {
        &self.rules
    }

    pub fn enabled(&self) -> impl Iterator<Item = &CleaningRule> {
        self.rules.iter().filter(|r| r.enabled)
    }

    pub fn get(&self, name: &str) -> Option<&CleaningRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| CleanerError::invalid_rule(name, "no such rule"))?;
        rule.enabled = enabled;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Enabled rules sharing territory. Earlier rules claim shared files first.
    pub fn overlaps(&self) -> Vec<RuleOverlap> {
        let enabled: Vec<&CleaningRule> = self.enabled().collect();
        let mut overlaps = Vec::new();
        for (i, a) in enabled.iter().enumerate() {
            for b in enabled.iter().skip(i + 1) {
                let shared = a.path_roots.iter().find_map(|ra| {
                    b.path_roots.iter().find_map(|rb| {
                        if rb.starts_with(ra) {
                            Some(rb.clone())
                        } else if ra.starts_with(rb) {
                            Some(ra.clone())
                        } else {
                            None
                        }
                    })
                });
                if let Some(root) = shared {
                    overlaps.push(RuleOverlap {
                        first: a.name.clone(),
                        second: b.name.clone(),
                        root,
                    });
                }
            }
        }
        overlaps
    }
}

/// Expand `%VAR%` placeholders and normalize separators for this platform.
/// Unknown variables are left in place so the root simply does not exist.
pub fn expand_root(raw: &str) -> PathBuf {
    let expanded = PLACEHOLDER.replace_all(raw.trim(), |caps: &Captures| {
        lookup_variable(&caps[1]).unwrap_or_else(|| {
            log::debug!("Unresolved placeholder {} in rule root {}", &caps[0], raw);
            caps[0].to_string()
        })
    });
    let normalized: String = expanded
        .chars()
        .map(|c| if c == '/' || c == '\\' { MAIN_SEPARATOR } else { c })
        .collect();
    PathBuf::from(normalized)
}

fn lookup_variable(name: &str) -> Option<String> {
    if let Ok(value) = env::var(name) {
        if !value.is_empty() {
            return Some(value);
        }
    }
    let fallback = match name.to_ascii_uppercase().as_str() {
        "TEMP" | "TMP" => Some(env::temp_dir()),
        "LOCALAPPDATA" => dirs::data_local_dir(),
        "APPDATA" => dirs::data_dir(),
        "USERPROFILE" => dirs::home_dir(),
        _ => None,
    };
    fallback.map(|p| p.to_string_lossy().into_owned())
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}
