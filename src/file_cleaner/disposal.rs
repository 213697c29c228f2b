use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::{CleanerError, Result};

/// Where accepted files go. Nothing in the cleaner hard-deletes.
pub trait Disposal: Send + Sync {
    fn dispose(&self, path: &Path) -> Result<()>;
}

/// The platform's recoverable trash (Recycle Bin, freedesktop trash, Finder).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTrash;

impl Disposal for SystemTrash {
    fn dispose(&self, path: &Path) -> Result<()> {
        trash::delete(path).map_err(|e| CleanerError::Collaborator {
            name: "system trash",
            message: e.to_string(),
        })
    }
}

/// Moves items into a quarantine directory under unique names.
#[derive(Debug, Clone)]
pub struct QuarantineDir {
    dir: PathBuf,
}

impl QuarantineDir {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(QuarantineDir { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn unique_target(&self, path: &Path) -> Result<PathBuf> {
        let original_name = path.file_name().ok_or_else(|| {
            CleanerError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no file name", path.display()),
            ))
        })?;
        let target = self.dir.join(original_name);
        if !target.exists() {
            return Ok(target);
        }

        let name = original_name.to_string_lossy();
        let (base, ext) = split_name_ext(&name);
        let ts = Local::now().format("%Y%m%d-%H%M%S");
        let mut counter = 1u32;
        loop {
            let candidate = if ext.is_empty() {
                format!("{} ({}-{})", base, ts, counter)
            } else {
                format!("{} ({}-{}).{}", base, ts, counter, ext)
            };
            let target = self.dir.join(candidate);
            if !target.exists() {
                return Ok(target);
            }
            counter += 1;
        }
    }
}

impl Disposal for QuarantineDir {
    fn dispose(&self, path: &Path) -> Result<()> {
        let target = self.unique_target(path)?;
        fs::rename(path, &target)?;
        log::debug!("Quarantined {} as {}", path.display(), target.display());
        Ok(())
    }
}

fn split_name_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx + 1..]),
        _ => (name, ""),
    }
}
