mod browser;
mod disposal;
mod engine;
mod handle;
mod recycle_bin;
mod rules;
mod safety;
pub mod types;

#[cfg(test)]
mod tests;

pub use browser::{discover_profiles, BrowserProfile, CookieStore};
pub use disposal::{Disposal, QuarantineDir, SystemTrash};
pub use engine::{CleanupEngine, ProgressCallback};
pub use handle::{CleanupEvent, CleanupHandle};
pub use recycle_bin::{RecycleBin, RecycleBinSummary, SystemRecycleBin};
pub use rules::{expand_root, CleaningRule, CleaningRuleSet, RuleOverlap, RULES_OVERRIDE_ENV_VAR};
pub use safety::{
    ProtectedSet, SafetyClassifier, PROTECTED_EXTENSIONS, PROTECTED_NAMES, SAFE_MODE_EXTENSIONS,
    SYSTEM_PROTECTIONS,
};
pub use types::{
    CleanedItem, CleaningCategory, CleaningMode, CleaningResult, CleanupReport, ItemKind, Verdict,
};
