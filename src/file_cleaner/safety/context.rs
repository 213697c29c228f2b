use std::path::Path;

/// Lowercased, separator-normalized view of a path for protection checks.
#[derive(Debug)]
pub(super) struct PathContext<'a> {
    pub(super) path: &'a Path,
    lower: String,
    segments_lower: Vec<String>,
}

impl<'a> PathContext<'a> {
    pub(super) fn new(path: &'a Path) -> Self {
        let lower = normalize(&path.to_string_lossy());
        let segments_lower = path
            .iter()
            .filter_map(|component| component.to_str())
            .map(|segment| segment.trim_end_matches(['\\', '/']).to_lowercase())
            .filter(|segment| !segment.is_empty())
            .collect();

        Self {
            path,
            lower,
            segments_lower,
        }
    }

    pub(super) fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }

    pub(super) fn segments_lower(&self) -> &[String] {
        &self.segments_lower
    }

    /// True when the path equals `prefix` or lies beneath it. `prefix` must
    /// already be normalized.
    pub(super) fn is_under(&self, prefix: &str) -> bool {
        if prefix.is_empty() {
            return false;
        }
        match self.lower.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
            None => false,
        }
    }
}

/// Lowercase with forward slashes and no trailing separator.
pub(super) fn normalize(raw: &str) -> String {
    let mut lower = raw.replace('\\', "/").to_lowercase();
    while lower.len() > 1 && lower.ends_with('/') {
        lower.pop();
    }
    lower
}
