use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

const CHROMIUM_CACHE_DIRS: &[&str] = &["Cache", "Code Cache", "GPUCache"];
const CHROMIUM_COOKIE_FILES: &[&str] = &["Network/Cookies", "Cookies"];
const FIREFOX_CACHE_DIRS: &[&str] = &["cache2", "startupCache"];
const FIREFOX_COOKIE_FILES: &[&str] = &["cookies.sqlite"];

/// One browser profile: where its disposable caches and its cookie store live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserProfile {
    pub browser: String,
    pub profile_dir: PathBuf,
    pub cache_dirs: Vec<PathBuf>,
    pub cookie_files: Vec<PathBuf>,
}

impl BrowserProfile {
    /// Chromium keeps caches either inside the profile (Windows) or in a
    /// parallel tree under the user cache directory.
    pub fn chromium(browser: &str, profile_dir: PathBuf, cache_root: &Path) -> Self {
        BrowserProfile {
            browser: browser.to_string(),
            cache_dirs: join_all(cache_root, CHROMIUM_CACHE_DIRS),
            cookie_files: join_all(&profile_dir, CHROMIUM_COOKIE_FILES),
            profile_dir,
        }
    }

    pub fn firefox(profile_dir: PathBuf, cache_root: &Path) -> Self {
        BrowserProfile {
            browser: "Firefox".to_string(),
            cache_dirs: join_all(cache_root, FIREFOX_CACHE_DIRS),
            cookie_files: join_all(&profile_dir, FIREFOX_COOKIE_FILES),
            profile_dir,
        }
    }

    pub fn existing_cache_dirs(&self) -> impl Iterator<Item = &PathBuf> {
        self.cache_dirs.iter().filter(|d| d.is_dir())
    }

    pub fn has_cookie_store(&self) -> bool {
        self.cookie_files.iter().any(|f| f.is_file())
    }
}

/// Clears cookie expiry in a profile's store. The store file itself is kept.
pub trait CookieStore: Send + Sync {
    /// Returns how many cookies were expired.
    fn expire_all(&self, profile: &BrowserProfile) -> Result<u64>;
}

/// Profiles of the installed Chrome, Edge and Firefox for the current user.
pub fn discover_profiles() -> Vec<BrowserProfile> {
    let mut profiles = Vec::new();
    for (browser, profile_dir, cache_dir) in chromium_locations() {
        if profile_dir.is_dir() {
            profiles.push(BrowserProfile::chromium(browser, profile_dir, &cache_dir));
        }
    }
    if let Some((profiles_root, cache_root)) = firefox_locations() {
        profiles.extend(firefox_profiles(&profiles_root, &cache_root));
    }
    log::debug!("Discovered {} browser profiles", profiles.len());
    profiles
}

fn firefox_profiles(profiles_root: &Path, cache_root: &Path) -> Vec<BrowserProfile> {
    let entries = match fs::read_dir(profiles_root) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.join("prefs.js").is_file())
        .filter_map(|p| {
            let name = p.file_name()?.to_owned();
            Some(BrowserProfile::firefox(p.clone(), &cache_root.join(name)))
        })
        .collect()
}

fn join_all(base: &Path, children: &[&str]) -> Vec<PathBuf> {
    children
        .iter()
        .map(|c| c.split('/').fold(base.to_path_buf(), |acc, part| acc.join(part)))
        .collect()
}

#[cfg(windows)]
fn chromium_locations() -> Vec<(&'static str, PathBuf, PathBuf)> {
    let Some(local) = dirs::data_local_dir() else {
        return Vec::new();
    };
    [
        ("Chrome", local.join("Google").join("Chrome")),
        ("Edge", local.join("Microsoft").join("Edge")),
    ]
    .into_iter()
    .map(|(name, base)| {
        let profile = base.join("User Data").join("Default");
        (name, profile.clone(), profile)
    })
    .collect()
}

#[cfg(target_os = "macos")]
fn chromium_locations() -> Vec<(&'static str, PathBuf, PathBuf)> {
    let (Some(data), Some(cache)) = (dirs::data_dir(), dirs::cache_dir()) else {
        return Vec::new();
    };
    [("Chrome", "Google/Chrome"), ("Edge", "Microsoft Edge")]
        .into_iter()
        .map(|(name, rel)| {
            (
                name,
                data.join(rel).join("Default"),
                cache.join(rel).join("Default"),
            )
        })
        .collect()
}

#[cfg(all(not(windows), not(target_os = "macos")))]
fn chromium_locations() -> Vec<(&'static str, PathBuf, PathBuf)> {
    let (Some(config), Some(cache)) = (dirs::config_dir(), dirs::cache_dir()) else {
        return Vec::new();
    };
    [("Chrome", "google-chrome"), ("Edge", "microsoft-edge")]
        .into_iter()
        .map(|(name, rel)| {
            (
                name,
                config.join(rel).join("Default"),
                cache.join(rel).join("Default"),
            )
        })
        .collect()
}

#[cfg(windows)]
fn firefox_locations() -> Option<(PathBuf, PathBuf)> {
    let rel = Path::new("Mozilla").join("Firefox").join("Profiles");
    Some((dirs::data_dir()?.join(&rel), dirs::data_local_dir()?.join(&rel)))
}

#[cfg(target_os = "macos")]
fn firefox_locations() -> Option<(PathBuf, PathBuf)> {
    let rel = Path::new("Firefox").join("Profiles");
    Some((dirs::data_dir()?.join(&rel), dirs::cache_dir()?.join(&rel)))
}

#[cfg(all(not(windows), not(target_os = "macos")))]
fn firefox_locations() -> Option<(PathBuf, PathBuf)> {
    Some((
        dirs::home_dir()?.join(".mozilla").join("firefox"),
        dirs::cache_dir()?.join("mozilla").join("firefox"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn chromium_profile_layout() {
        let dir = TempDir::new().unwrap();
        let profile = BrowserProfile::chromium("Chrome", dir.path().join("Default"), dir.path());
        assert_eq!(profile.cache_dirs[0], dir.path().join("Cache"));
        assert_eq!(
            profile.cookie_files[0],
            dir.path().join("Default").join("Network").join("Cookies")
        );
        assert_eq!(profile.existing_cache_dirs().count(), 0);
        fs::create_dir_all(dir.path().join("GPUCache")).unwrap();
        assert_eq!(profile.existing_cache_dirs().count(), 1);
    }

    #[test]
    fn firefox_profiles_need_prefs() {
        let dir = TempDir::new().unwrap();
        let roaming = dir.path().join("roaming");
        let local = dir.path().join("local");
        fs::create_dir_all(roaming.join("abcd.default-release")).unwrap();
        fs::write(roaming.join("abcd.default-release").join("prefs.js"), "").unwrap();
        fs::create_dir_all(roaming.join("Crash Reports")).unwrap();

        let profiles = firefox_profiles(&roaming, &local);
        assert_eq!(profiles.len(), 1);
        assert_eq!(
            profiles[0].cache_dirs[0],
            local.join("abcd.default-release").join("cache2")
        );
        assert!(!profiles[0].has_cookie_store());
    }
}
