use std::collections::HashSet;
#[cfg(windows)]
use std::env;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;

use super::context::{normalize, PathContext};

/// File and folder names that are never deleted, wherever they appear.
pub const PROTECTED_NAMES: &[&str] = &[
    "pagefile.sys",
    "hiberfil.sys",
    "swapfile.sys",
    "ntuser.dat",
    "ntuser.ini",
    "desktop.ini",
    "thumbs.db",
    "boot",
    "system32",
    "drivers",
    "config",
    "program files",
    "program files (x86)",
    "programdata",
];

/// Documents, media, executables and databases are never auto-deleted.
pub const PROTECTED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "sys", "ini", "dat", "key", "doc", "docx", "xls", "xlsx", "pdf", "ppt", "pptx",
    "jpg", "jpeg", "png", "gif", "mp3", "mp4", "avi", "zip", "rar", "7z", "iso", "db", "mdb",
    "accdb", "sql", "sqlite",
];

#[cfg(not(windows))]
const UNIX_PROTECTED_PATHS: &[&str] = &[
    "/bin", "/boot", "/dev", "/etc", "/lib", "/lib64", "/proc", "/sbin", "/sys", "/usr",
    "/System", "/Applications",
];

lazy_static! {
    /// Protections for the running system, resolved once per process.
    pub static ref SYSTEM_PROTECTIONS: ProtectedSet = ProtectedSet::system();
}

/// Paths, names and extensions the cleaner must never touch.
#[derive(Debug, Clone, Default)]
pub struct ProtectedSet {
    paths: Vec<String>,
    names: HashSet<String>,
    extensions: HashSet<String>,
}

impl ProtectedSet {
    /// Nothing protected. Only useful as a base for `with_*` builders.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in names and extensions plus this platform's system locations.
    pub fn system() -> Self {
        let mut set = ProtectedSet::empty()
            .with_names(PROTECTED_NAMES.iter().copied())
            .with_extensions(PROTECTED_EXTENSIONS.iter().copied());
        for path in system_paths() {
            set = set.with_path(path);
        }
        set
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        let normalized = normalize(&path.as_ref().to_string_lossy());
        if !normalized.is_empty() && !self.paths.contains(&normalized) {
            self.paths.push(normalized);
        }
        self
    }

    pub fn with_names<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.names
            .extend(names.into_iter().map(|n| n.trim().to_lowercase()));
        self
    }

    pub fn with_extensions<'a>(mut self, extensions: impl IntoIterator<Item = &'a str>) -> Self {
        self.extensions.extend(
            extensions
                .into_iter()
                .map(|e| e.trim().trim_start_matches('.').to_lowercase()),
        );
        self
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub(super) fn protected_path(&self, ctx: &PathContext<'_>) -> Option<&str> {
        self.paths
            .iter()
            .find(|p| ctx.is_under(p))
            .map(|p| p.as_str())
    }

    pub(super) fn protected_name<'c>(&self, ctx: &'c PathContext<'_>) -> Option<&'c str> {
        ctx.segments_lower()
            .iter()
            .find(|s| self.names.contains(s.as_str()))
            .map(|s| s.as_str())
    }

    pub(super) fn is_protected_extension(&self, extension: &str) -> bool {
        self.extensions.contains(extension)
    }
}

#[cfg(windows)]
fn system_paths() -> Vec<PathBuf> {
    let var = |name: &str| env::var_os(name).map(PathBuf::from);
    let mut paths = Vec::new();
    if let Some(windir) = var("SYSTEMROOT").or_else(|| var("WINDIR")) {
        for child in ["System32", "SysWOW64", "WinSxS", "Boot", "Fonts", "Installer"] {
            paths.push(windir.join(child));
        }
    }
    for name in ["PROGRAMFILES", "PROGRAMFILES(X86)", "PROGRAMDATA"] {
        paths.extend(var(name));
    }
    let drive = var("SYSTEMDRIVE").unwrap_or_else(|| PathBuf::from("C:"));
    let drive_root = PathBuf::from(format!("{}\\", drive.to_string_lossy()));
    paths.push(drive_root.join("Recovery"));
    paths.push(drive_root.join("System Volume Information"));
    paths
}

#[cfg(not(windows))]
fn system_paths() -> Vec<PathBuf> {
    UNIX_PROTECTED_PATHS.iter().map(PathBuf::from).collect()
}
