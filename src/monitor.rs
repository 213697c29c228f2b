use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sysinfo::Disks;

use crate::file_cleaner::{CleaningCategory, CleanupEngine};
use crate::folder_scan::{folder_size, ExclusionSet};
use crate::format::format_size;

/// Volumes at or above this fill ratio are flagged.
pub const DEFAULT_USAGE_THRESHOLD: f64 = 0.85;
/// Disposable data above this total is worth a cleanup.
pub const FOOTPRINT_ALERT_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeUsage {
    pub name: String,
    pub mount_point: PathBuf,
    pub total_space: u64,
    pub available_space: u64,
    pub used_space: u64,
    pub file_system: String,
    pub is_removable: bool,
}

impl VolumeUsage {
    pub fn used_ratio(&self) -> f64 {
        if self.total_space == 0 {
            return 0.0;
        }
        self.used_space as f64 / self.total_space as f64
    }

    pub fn needs_attention(&self, threshold: f64) -> bool {
        self.total_space > 0 && self.used_ratio() >= threshold
    }

    pub fn alert_message(&self) -> String {
        format!(
            "Volume {} is {:.0}% full, {} free",
            self.mount_point.display(),
            self.used_ratio() * 100.0,
            format_size(self.available_space)
        )
    }
}

pub fn collect_volume_usage() -> Vec<VolumeUsage> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .map(|disk| {
            let total_space = disk.total_space();
            let available_space = disk.available_space();
            VolumeUsage {
                name: disk.name().to_string_lossy().to_string(),
                mount_point: disk.mount_point().to_path_buf(),
                total_space,
                available_space,
                used_space: total_space.saturating_sub(available_space),
                file_system: disk.file_system().to_string_lossy().to_string(),
                is_removable: disk.is_removable(),
            }
        })
        .collect()
}

/// Bytes the cleaner could reclaim, by source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footprint {
    pub system_temp: u64,
    pub browser_cache: u64,
    pub recycle_bin: u64,
}

impl Footprint {
    pub fn total(&self) -> u64 {
        self.system_temp + self.browser_cache + self.recycle_bin
    }

    pub fn recommendation(&self) -> Option<String> {
        (self.total() > FOOTPRINT_ALERT_BYTES).then(|| {
            format!(
                "{} of temporary data found, cleanup recommended",
                format_size(self.total())
            )
        })
    }
}

/// Raw sizes of temp roots, browser caches and the recycle bin. No rule
/// filters apply; this is an upper bound on what a cleanup frees.
pub fn disposable_footprint(engine: &CleanupEngine) -> Footprint {
    let temp_roots: BTreeSet<&PathBuf> = engine
        .rules()
        .enabled()
        .filter(|r| r.category == CleaningCategory::Temp)
        .flat_map(|r| r.path_roots.iter())
        .filter(|root| root.is_dir())
        .collect();
    let cache_dirs: BTreeSet<&PathBuf> = engine
        .browser_profiles()
        .iter()
        .flat_map(|p| p.existing_cache_dirs())
        .collect();

    let recycle_bin = match engine.recycle_bin().summary() {
        Ok(summary) => summary.bytes,
        Err(e) => {
            log::debug!("Recycle bin size unavailable: {}", e);
            0
        }
    };

    let footprint = Footprint {
        system_temp: sum_sizes(temp_roots),
        browser_cache: sum_sizes(cache_dirs),
        recycle_bin,
    };
    log::debug!("Disposable footprint: {:?}", footprint);
    footprint
}

fn sum_sizes<'a>(dirs: impl IntoIterator<Item = &'a PathBuf>) -> u64 {
    let none = ExclusionSet::empty();
    dirs.into_iter()
        .map(|dir| match folder_size(dir, &none) {
            Ok(size) => size,
            Err(e) => {
                log::debug!("Skipping {} in footprint: {}", dir.display(), e);
                0
            }
        })
        .sum()
}
