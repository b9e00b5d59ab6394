//! Managing the set of files chosen for a bundle.

use std::collections::BTreeSet;

use crate::domain::model::{FileEntry, TreeNode};

/// Aggregate selection state of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    NotSelected,
    PartiallySelected,
    FullySelected,
}

/// Tracks the file paths chosen for inclusion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SelectionSet {
    paths: BTreeSet<String>,
}

impl SelectionSet {
    /// Create an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of selected files.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Selected paths in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn insert(&mut self, path: impl Into<String>) -> bool {
        self.paths.insert(path.into())
    }

    pub fn remove(&mut self, path: &str) -> bool {
        self.paths.remove(path)
    }

    /// Flip a single path. Returns `true` when the path is selected afterwards.
    pub fn toggle(&mut self, path: &str) -> bool {
        if self.paths.remove(path) {
            false
        } else {
            self.paths.insert(path.to_string());
            true
        }
    }

    /// Select every file entry.
    pub fn select_all(&mut self, entries: &[FileEntry]) {
        self.paths.extend(
            entries
                .iter()
                .filter(|entry| entry.is_file())
                .map(|entry| entry.path.clone()),
        );
    }

    /// Remove all selections.
    pub fn select_none(&mut self) {
        self.paths.clear();
    }

    /// Toggle a node. Directories select all files below them unless every one of them is
    /// already selected, in which case they are all cleared. Returns the resulting state.
    pub fn toggle_node(&mut self, node: &TreeNode) -> SelectionState {
        if !node.is_dir() {
            return if self.toggle(&node.path) {
                SelectionState::FullySelected
            } else {
                SelectionState::NotSelected
            };
        }

        let files = node.file_paths();
        if files.is_empty() {
            return SelectionState::NotSelected;
        }
        if files.iter().all(|path| self.paths.contains(path)) {
            for path in &files {
                self.paths.remove(path);
            }
            SelectionState::NotSelected
        } else {
            self.paths.extend(files);
            SelectionState::FullySelected
        }
    }

    /// Aggregate state of a node for rendering tri-state checkboxes.
    pub fn state_of(&self, node: &TreeNode) -> SelectionState {
        let files = node.file_paths();
        let selected = files
            .iter()
            .filter(|path| self.paths.contains(path.as_str()))
            .count();
        if selected == 0 {
            SelectionState::NotSelected
        } else if selected == files.len() {
            SelectionState::FullySelected
        } else {
            SelectionState::PartiallySelected
        }
    }

    /// Drop selections that no longer name a file entry. Returns how many were dropped.
    pub fn retain_known(&mut self, entries: &[FileEntry]) -> usize {
        let known: BTreeSet<&str> = entries
            .iter()
            .filter(|entry| entry.is_file())
            .map(|entry| entry.path.as_str())
            .collect();
        let before = self.paths.len();
        self.paths.retain(|path| known.contains(path.as_str()));
        before - self.paths.len()
    }
}

impl<S: Into<String>> FromIterator<S> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().map(Into::into).collect(),
        }
    }
}
