use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecycleBinSummary {
    pub items: u64,
    pub bytes: u64,
}

/// The OS recycle bin: enumerate, sum, empty.
pub trait RecycleBin: Send + Sync {
    fn summary(&self) -> Result<RecycleBinSummary>;

    /// Purge everything and report what was purged.
    fn empty(&self) -> Result<RecycleBinSummary>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRecycleBin;

#[cfg(any(
    windows,
    all(
        unix,
        not(target_os = "macos"),
        not(target_os = "ios"),
        not(target_os = "android")
    )
))]
mod platform {
    use trash::os_limited;
    use trash::{TrashItem, TrashItemSize};

    use super::RecycleBinSummary;
    use crate::error::{CleanerError, Result};

    fn collaborator(e: trash::Error) -> CleanerError {
        CleanerError::Collaborator {
            name: "recycle bin",
            message: e.to_string(),
        }
    }

    pub(super) fn list() -> Result<(Vec<TrashItem>, RecycleBinSummary)> {
        let items = os_limited::list().map_err(collaborator)?;
        let bytes = items.iter().map(item_size).sum();
        let summary = RecycleBinSummary {
            items: items.len() as u64,
            bytes,
        };
        Ok((items, summary))
    }

    pub(super) fn purge(items: Vec<TrashItem>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        os_limited::purge_all(items).map_err(collaborator)
    }

    fn item_size(item: &TrashItem) -> u64 {
        match os_limited::metadata(item) {
            Ok(meta) => match meta.size {
                TrashItemSize::Bytes(bytes) => bytes,
                TrashItemSize::Entries(_) => 0,
            },
            Err(e) => {
                log::debug!("No size for recycled item {:?}: {}", item.name, e);
                0
            }
        }
    }
}

#[cfg(any(
    windows,
    all(
        unix,
        not(target_os = "macos"),
        not(target_os = "ios"),
        not(target_os = "android")
    )
))]
impl RecycleBin for SystemRecycleBin {
    fn summary(&self) -> Result<RecycleBinSummary> {
        platform::list().map(|(_, summary)| summary)
    }

    fn empty(&self) -> Result<RecycleBinSummary> {
        let (items, summary) = platform::list()?;
        platform::purge(items)?;
        log::info!("Emptied recycle bin: {} items", summary.items);
        Ok(summary)
    }
}

#[cfg(not(any(
    windows,
    all(
        unix,
        not(target_os = "macos"),
        not(target_os = "ios"),
        not(target_os = "android")
    )
)))]
impl RecycleBin for SystemRecycleBin {
    fn summary(&self) -> Result<RecycleBinSummary> {
        Err(crate::error::CleanerError::Unsupported("recycle bin enumeration"))
    }

    fn empty(&self) -> Result<RecycleBinSummary> {
        Err(crate::error::CleanerError::Unsupported("recycle bin purge"))
    }
}
