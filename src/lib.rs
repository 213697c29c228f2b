mod config;
mod error;
pub mod file_cleaner;
pub mod folder_scan;
mod format;
pub mod monitor;
mod ops;

pub use config::{CleanerConfig, CONFIG_ENV_VAR, DEFAULT_EXCLUSIONS};
pub use error::{CleanerError, Result};
pub use format::{format_size, megabytes_to_bytes};
pub use ops::{OpState, Operation, OperationKind, OperationRegistry, RunState, RunTracker};

pub use file_cleaner::{
    CleaningCategory, CleaningMode, CleaningResult, CleaningRule, CleaningRuleSet, CleanupEngine,
    CleanupEvent, CleanupHandle, CleanupReport, SafetyClassifier,
};
pub use folder_scan::{
    ExclusionSet, FolderScanner, FolderSizeEntry, ScanEvent, ScanHandle, ScanRequest, ScanSummary,
    SizeCache,
};
