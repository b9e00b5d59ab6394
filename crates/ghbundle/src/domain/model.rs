//! Domain models for repository listings, selection trees, and bundles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a repository listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Dir => "dir",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item of the flat repository listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub kind: EntryKind,
    /// Size in bytes as reported by the host, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl FileEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            size: None,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Dir,
            size: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Final path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Node of the selection tree reconstructed from a flat listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub children: Vec<TreeNode>,
    /// The listing entry this node was created from; `None` for synthesized directories.
    pub source: Option<FileEntry>,
}

impl TreeNode {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    /// Collect every file path at or below this node, in tree order.
    pub fn file_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_files(&mut paths);
        paths
    }

    fn collect_files(&self, out: &mut Vec<String>) {
        match self.kind {
            EntryKind::File => out.push(self.path.clone()),
            EntryKind::Dir => {
                for child in &self.children {
                    child.collect_files(out);
                }
            }
        }
    }

    /// Depth-first search for the node with the given path.
    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        if self.path == path {
            return Some(self);
        }
        if !path.starts_with(&self.path) {
            return None;
        }
        self.children.iter().find_map(|child| child.find(path))
    }
}

/// Identity of the repository being bundled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoInfo {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl RepoInfo {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
        }
    }

    /// `owner/repo` slug.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Default file name offered for the bundle download.
    pub fn bundle_file_name(&self) -> String {
        let branch = self.branch.replace(['/', '\\'], "-");
        format!("{}_{}_{}.txt", self.owner, self.repo, branch)
    }
}

impl fmt::Display for RepoInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)
    }
}

/// Listing returned by the tree-fetch collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoTree {
    pub entries: Vec<FileEntry>,
    /// The host cut the listing short; the entry list is incomplete.
    pub truncated: bool,
}

/// A selected file whose content could not be retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub message: String,
}

/// The generated document together with run metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub text: String,
    pub repo: RepoInfo,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<FileFailure>,
}

impl Bundle {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Generation progress, advanced once per attempted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    pub fn is_done(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_file_name_flattens_branch_separators() {
        let repo = RepoInfo::new("acme", "widgets", "feature/login");
        assert_eq!(repo.bundle_file_name(), "acme_widgets_feature-login.txt");
        assert_eq!(repo.to_string(), "acme/widgets@feature/login");
    }

    #[test]
    fn progress_fraction_handles_empty_runs() {
        assert_eq!(Progress::default().fraction(), 0.0);
        let half = Progress {
            completed: 1,
            total: 2,
        };
        assert!((half.fraction() - 0.5).abs() < f64::EPSILON);
        assert!(!half.is_done());
    }

    #[test]
    fn entry_name_is_last_segment() {
        assert_eq!(FileEntry::file("src/app/main.rs").name(), "main.rs");
        assert_eq!(FileEntry::file("README.md").name(), "README.md");
    }
}
