//! Logical directory paths over a flat key space.
//!
//! All operations are pure: the caller owns the "current path" and the
//! navigator only computes new values from old ones.

use serde::{Deserialize, Serialize};

/// An ordered list of folder names; empty means the bucket root.
///
/// Segments are never empty and never contain the delimiter.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LogicalPath {
    segments: Vec<String>,
}

impl LogicalPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Name of the innermost folder, `None` at the root.
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PathNavigator {
    delimiter: char,
}

impl Default for PathNavigator {
    fn default() -> Self {
        Self::new(crate::DEFAULT_DELIMITER)
    }
}

impl PathNavigator {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Append one folder name.
    ///
    /// A name that is empty or contains the delimiter cannot be a single
    /// segment; the path is returned unchanged in that case.
    pub fn descend(&self, path: &LogicalPath, folder_name: &str) -> LogicalPath {
        if folder_name.is_empty() || folder_name.contains(self.delimiter) {
            return path.clone();
        }
        let mut segments = path.segments.clone();
        segments.push(folder_name.to_string());
        LogicalPath { segments }
    }

    /// Drop the innermost folder. No-op at the root.
    pub fn ascend(&self, path: &LogicalPath) -> LogicalPath {
        let mut segments = path.segments.clone();
        segments.pop();
        LogicalPath { segments }
    }

    /// Listing prefix for `path`: `""` at the root, `a/b/` otherwise.
    pub fn to_prefix(&self, path: &LogicalPath) -> String {
        let mut prefix = String::new();
        for segment in &path.segments {
            prefix.push_str(segment);
            prefix.push(self.delimiter);
        }
        prefix
    }

    /// Inverse of [`to_prefix`](Self::to_prefix). Empty segments (leading,
    /// doubled or trailing delimiters) are dropped.
    pub fn parse(&self, prefix: &str) -> LogicalPath {
        LogicalPath {
            segments: prefix
                .split(self.delimiter)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// `(folder name, prefix)` pairs from the outermost folder to the leaf.
    pub fn breadcrumbs(&self, path: &LogicalPath) -> Vec<(String, String)> {
        let mut crumbs = Vec::with_capacity(path.segments.len());
        let mut prefix = String::new();
        for segment in &path.segments {
            prefix.push_str(segment);
            prefix.push(self.delimiter);
            crumbs.push((segment.clone(), prefix.clone()));
        }
        crumbs
    }

    /// Key an uploaded file named `file_name` gets inside `path`.
    pub fn object_key(&self, path: &LogicalPath, file_name: &str) -> String {
        format!("{}{}", self.to_prefix(path), file_name)
    }
}
