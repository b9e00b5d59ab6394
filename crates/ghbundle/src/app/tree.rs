//! Reconstruction of the selection tree from a flat repository listing.

use std::collections::HashMap;

use crate::domain::model::{EntryKind, FileEntry, TreeNode};

/// A listing entry that disagreed with a node registered earlier for the same path.
///
/// The earlier registration always wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCollision {
    pub path: String,
    pub existing: EntryKind,
    pub requested: EntryKind,
}

/// Result of a tree build including any collisions that were resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeBuild {
    pub roots: Vec<TreeNode>,
    pub collisions: Vec<PathCollision>,
}

/// Build the ordered list of root nodes for the given entries.
pub fn build_tree(entries: &[FileEntry]) -> Vec<TreeNode> {
    build_tree_with_report(entries).roots
}

/// Build the tree and report every path collision encountered.
///
/// Entries are processed in lexicographic path order. Each path prefix gets exactly one
/// node: a file node when it is the last segment of a `File` entry, a directory otherwise.
/// Nodes attach to their parent the first time they are created. Paths that would nest
/// below a file node are dropped and reported.
pub fn build_tree_with_report(entries: &[FileEntry]) -> TreeBuild {
    let mut sorted: Vec<&FileEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut arena = Arena::default();
    let mut collisions = Vec::new();

    for entry in sorted {
        let segments: Vec<&str> = entry.path.split('/').filter(|s| !s.is_empty()).collect();
        let mut prefix = String::with_capacity(entry.path.len());
        let mut parent: Option<usize> = None;

        for (position, segment) in segments.iter().enumerate() {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            let is_last = position + 1 == segments.len();

            if let Some(parent_idx) = parent
                && arena.slots[parent_idx].kind == EntryKind::File
            {
                collisions.push(PathCollision {
                    path: prefix.clone(),
                    existing: EntryKind::File,
                    requested: if is_last { entry.kind } else { EntryKind::Dir },
                });
                break;
            }

            let idx = match arena.registry.get(&prefix).copied() {
                Some(existing) => {
                    if is_last {
                        let slot = &mut arena.slots[existing];
                        if slot.kind != entry.kind {
                            collisions.push(PathCollision {
                                path: prefix.clone(),
                                existing: slot.kind,
                                requested: entry.kind,
                            });
                        } else if slot.source.is_none() {
                            slot.source = Some(entry.clone());
                        }
                    }
                    existing
                }
                None => {
                    let kind = if is_last && entry.kind == EntryKind::File {
                        EntryKind::File
                    } else {
                        EntryKind::Dir
                    };
                    let source = is_last.then(|| entry.clone());
                    arena.insert(segment, &prefix, kind, source, parent)
                }
            };
            parent = Some(idx);
        }
    }

    for collision in &collisions {
        tracing::warn!(
            path = %collision.path,
            existing = %collision.existing,
            requested = %collision.requested,
            "path collision in repository listing; keeping first registration"
        );
    }

    TreeBuild {
        roots: arena.into_roots(),
        collisions,
    }
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    registry: HashMap<String, usize>,
    roots: Vec<usize>,
}

struct Slot {
    name: String,
    path: String,
    kind: EntryKind,
    source: Option<FileEntry>,
    children: Vec<usize>,
}

impl Arena {
    fn insert(
        &mut self,
        name: &str,
        path: &str,
        kind: EntryKind,
        source: Option<FileEntry>,
        parent: Option<usize>,
    ) -> usize {
        let idx = self.slots.len();
        self.slots.push(Slot {
            name: name.to_string(),
            path: path.to_string(),
            kind,
            source,
            children: Vec::new(),
        });
        self.registry.insert(path.to_string(), idx);
        match parent {
            Some(parent_idx) => self.slots[parent_idx].children.push(idx),
            None => self.roots.push(idx),
        }
        idx
    }

    fn into_roots(self) -> Vec<TreeNode> {
        let Arena { slots, roots, .. } = self;
        let mut slots: Vec<Option<Slot>> = slots.into_iter().map(Some).collect();
        roots
            .into_iter()
            .filter_map(|idx| materialize(&mut slots, idx))
            .collect()
    }
}

fn materialize(slots: &mut [Option<Slot>], idx: usize) -> Option<TreeNode> {
    let slot = slots.get_mut(idx)?.take()?;
    let children = slot
        .children
        .into_iter()
        .filter_map(|child| materialize(slots, child))
        .collect();
    Some(TreeNode {
        name: slot.name,
        path: slot.path,
        kind: slot.kind,
        children,
        source: slot.source,
    })
}

/// Render the tree with box-drawing connectors, directories suffixed with `/`.
pub fn render_ascii(label: &str, roots: &[TreeNode]) -> String {
    let mut lines = vec![format!("{label}/")];
    render_level(roots, "", &mut lines);
    lines.join("\n")
}

fn render_level(nodes: &[TreeNode], prefix: &str, lines: &mut Vec<String>) {
    for (idx, node) in nodes.iter().enumerate() {
        let is_last = idx + 1 == nodes.len();
        let connector = if is_last { "└── " } else { "├── " };
        if node.is_dir() {
            lines.push(format!("{prefix}{connector}{}/", node.name));
            let extension = if is_last { "    " } else { "│   " };
            render_level(&node.children, &format!("{prefix}{extension}"), lines);
        } else {
            lines.push(format!("{prefix}{connector}{}", node.name));
        }
    }
}
