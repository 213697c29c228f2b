mod cache;
mod handle;
mod scanner;
pub mod types;

pub use cache::SizeCache;
pub use handle::ScanHandle;
pub use scanner::{FolderScanner, ScanPlan};
pub use types::{
    ExclusionSet, FolderSizeEntry, ScanEvent, ScanRequest, ScanRoot, ScanSummary,
};

pub(crate) use scanner::folder_size;
