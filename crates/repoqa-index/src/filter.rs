//! Selection of indexable source files from a tree listing.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::source::FileEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Accepted file extensions, without the leading dot.
    pub extensions: Vec<String>,
    /// Extensions that are never indexed, even if listed in `extensions`.
    pub denied_extensions: Vec<String>,
    /// Files must be strictly smaller than this many bytes.
    pub max_file_size: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            extensions: ["py", "js", "ts", "tsx", "go", "java", "cpp", "c", "rs"]
                .map(String::from)
                .to_vec(),
            denied_extensions: ["png", "jpg", "jpeg", "gif", "exe", "dll", "zip"]
                .map(String::from)
                .to_vec(),
            max_file_size: 50_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileFilter {
    extensions: Vec<String>,
    denied: Vec<String>,
    max_file_size: u64,
}

fn normalize(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

impl FileFilter {
    #[must_use]
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            extensions: config.extensions.iter().map(|e| normalize(e)).collect(),
            denied: config.denied_extensions.iter().map(|e| normalize(e)).collect(),
            max_file_size: config.max_file_size,
        }
    }

    #[must_use]
    pub fn accepts(&self, entry: &FileEntry) -> bool {
        let Some(ext) = extension_of(&entry.path) else {
            return false;
        };
        entry.size < self.max_file_size
            && self.extensions.contains(&ext)
            && !self.denied.contains(&ext)
    }

    /// Entries accepted by this filter, in input order.
    #[must_use]
    pub fn select(&self, entries: &[FileEntry]) -> Vec<FileEntry> {
        entries
            .iter()
            .filter(|e| self.accepts(e))
            .cloned()
            .collect()
    }
}

/// Language label recorded with each document, derived from the file extension.
#[must_use]
pub fn content_type(path: &str) -> String {
    let ext = extension_of(path).unwrap_or_default();
    let label = match ext.as_str() {
        "py" => "python",
        "js" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "cpp" | "cc" | "hpp" => "cpp",
        "c" | "h" => "c",
        "rs" => "rust",
        "" => "text",
        other => other,
    };
    label.to_owned()
}
