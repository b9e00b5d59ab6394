//! Repository tree component with tri-state selection checkboxes.

use std::collections::HashSet;
use std::ops::Range;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use crate::app::selection::{SelectionSet, SelectionState};
use crate::domain::model::{EntryKind, TreeNode};

/// Navigable, filterable view over the selection tree.
#[derive(Debug, Default, Clone)]
pub struct FileTreeState {
    roots: Vec<TreeNode>,
    entries: Vec<TreeEntry>,
    /// File paths in pre-order; every entry owns a contiguous range.
    files: Vec<String>,
    visible: Vec<usize>,
    selected: usize,
    expanded: HashSet<String>,
    filter: String,
    filter_active: bool,
    root_label: String,
}

#[derive(Debug, Clone)]
struct TreeEntry {
    path: String,
    name: String,
    kind: EntryKind,
    depth: usize,
    parent: Option<usize>,
    has_children: bool,
    files: Range<usize>,
}

impl FileTreeState {
    pub fn new(root_label: impl Into<String>, roots: Vec<TreeNode>) -> Self {
        let mut state = Self {
            root_label: root_label.into(),
            ..Self::default()
        };
        state.replace_tree(roots);
        state
    }

    /// Swap in a freshly built tree, keeping the filter.
    pub fn replace_tree(&mut self, roots: Vec<TreeNode>) {
        let mut entries = Vec::new();
        let mut files = Vec::new();
        flatten(&roots, 0, None, &mut entries, &mut files);

        // First level directories start expanded.
        self.expanded = entries
            .iter()
            .filter(|entry| entry.depth == 0 && entry.kind == EntryKind::Dir)
            .map(|entry| entry.path.clone())
            .collect();

        self.roots = roots;
        self.entries = entries;
        self.files = files;
        self.selected = 0;
        self.refresh_visible();
    }

    /// The node under the cursor.
    pub fn selected_node(&self) -> Option<&TreeNode> {
        let entry = self.entries.get(self.selected_entry_index()?)?;
        self.roots.iter().find_map(|root| root.find(&entry.path))
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.visible.len() {
            self.selected += 1;
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Expand the highlighted directory, or step into it when already expanded.
    pub fn expand_or_enter(&mut self) {
        let Some(index) = self.selected_entry_index() else {
            return;
        };
        if self.entries[index].kind != EntryKind::Dir {
            return;
        }
        if self.expanded.insert(self.entries[index].path.clone()) {
            self.refresh_visible();
        } else if let Some(first_child) = self
            .visible
            .iter()
            .position(|idx| self.entries[*idx].parent == Some(index))
        {
            self.selected = first_child;
        }
    }

    /// Collapse the highlighted directory or move to its parent.
    pub fn collapse_or_parent(&mut self) {
        let Some(index) = self.selected_entry_index() else {
            return;
        };
        let entry = &self.entries[index];
        if entry.kind == EntryKind::Dir && self.expanded.remove(&entry.path) {
            self.refresh_visible();
        } else if let Some(parent) = entry.parent
            && let Some(pos) = self.visible.iter().position(|idx| *idx == parent)
        {
            self.selected = pos;
        }
    }

    pub fn begin_filter(&mut self) {
        self.filter_active = true;
    }

    pub fn end_filter(&mut self) {
        self.filter_active = false;
    }

    pub fn is_filter_active(&self) -> bool {
        self.filter_active
    }

    pub fn push_filter_char(&mut self, ch: char) {
        self.filter.push(ch);
        self.refresh_visible();
    }

    pub fn pop_filter_char(&mut self) {
        self.filter.pop();
        self.refresh_visible();
    }

    pub fn set_filter(&mut self, pattern: impl Into<String>) {
        self.filter = pattern.into();
        self.refresh_visible();
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn root_label(&self) -> &str {
        &self.root_label
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    /// Paths of the visible rows, top to bottom.
    pub fn visible_paths(&self) -> Vec<&str> {
        self.visible
            .iter()
            .map(|idx| self.entries[*idx].path.as_str())
            .collect()
    }

    fn selection_state(&self, entry: &TreeEntry, selection: &SelectionSet) -> SelectionState {
        let files = &self.files[entry.files.clone()];
        let selected = files.iter().filter(|path| selection.contains(path)).count();
        if selected == 0 {
            SelectionState::NotSelected
        } else if selected == files.len() {
            SelectionState::FullySelected
        } else {
            SelectionState::PartiallySelected
        }
    }

    fn refresh_visible(&mut self) {
        self.visible.clear();
        let needle = self.filter.to_ascii_lowercase();
        let mut matches = vec![needle.is_empty(); self.entries.len()];

        if !needle.is_empty() {
            for (idx, entry) in self.entries.iter().enumerate() {
                if entry.path.to_ascii_lowercase().contains(&needle) {
                    matches[idx] = true;
                    let mut parent = entry.parent;
                    while let Some(p) = parent {
                        matches[p] = true;
                        parent = self.entries[p].parent;
                    }
                }
            }
        }

        for idx in 0..self.entries.len() {
            if matches[idx] && self.ancestors_open(idx) {
                self.visible.push(idx);
            }
        }

        if self.selected >= self.visible.len() {
            self.selected = self.visible.len().saturating_sub(1);
        }
    }

    /// Filtering opens every matching ancestor regardless of expansion.
    fn ancestors_open(&self, idx: usize) -> bool {
        if !self.filter.is_empty() {
            return true;
        }
        let mut parent = self.entries[idx].parent;
        while let Some(p) = parent {
            if !self.expanded.contains(&self.entries[p].path) {
                return false;
            }
            parent = self.entries[p].parent;
        }
        true
    }

    fn selected_entry_index(&self) -> Option<usize> {
        self.visible.get(self.selected).copied()
    }

    fn selected_index(&self) -> Option<usize> {
        (!self.visible.is_empty()).then_some(self.selected)
    }
}

fn flatten(
    nodes: &[TreeNode],
    depth: usize,
    parent: Option<usize>,
    entries: &mut Vec<TreeEntry>,
    files: &mut Vec<String>,
) {
    for node in nodes {
        let idx = entries.len();
        let start = files.len();
        entries.push(TreeEntry {
            path: node.path.clone(),
            name: node.name.clone(),
            kind: node.kind,
            depth,
            parent,
            has_children: !node.children.is_empty(),
            files: start..start,
        });
        if node.kind == EntryKind::File {
            files.push(node.path.clone());
        }
        flatten(&node.children, depth + 1, Some(idx), entries, files);
        entries[idx].files = start..files.len();
    }
}

/// Ratatui component rendering [`FileTreeState`].
#[derive(Debug, Default)]
pub struct FileTree;

impl FileTree {
    pub fn render(
        &self,
        frame: &mut Frame<'_>,
        area: Rect,
        state: &FileTreeState,
        selection: &SelectionSet,
        has_focus: bool,
    ) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("Repository · {}", state.root_label()));
        frame.render_widget(block.clone(), area);

        let inner = block.inner(area);
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(1)])
            .split(inner);

        let filter_text = if state.filter().is_empty() {
            "⌕ filter (press /)".to_string()
        } else {
            format!("⌕ {}", state.filter())
        };
        let mut filter_style = Style::default().fg(Color::Gray);
        if state.is_filter_active() {
            filter_style = filter_style.add_modifier(Modifier::BOLD).fg(Color::Cyan);
        }
        frame.render_widget(Paragraph::new(filter_text).style(filter_style), layout[0]);

        if state.visible_len() == 0 {
            let placeholder = if state.entries.is_empty() {
                "No eligible files"
            } else {
                "No files match filter"
            };
            frame.render_widget(
                Paragraph::new(placeholder).style(
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                ),
                layout[1],
            );
            return;
        }

        let items: Vec<ListItem> = state
            .visible
            .iter()
            .map(|idx| {
                let entry = &state.entries[*idx];
                let (checkbox, checkbox_style) = match state.selection_state(entry, selection) {
                    SelectionState::FullySelected => ("[x] ", Style::default().fg(Color::Green)),
                    SelectionState::PartiallySelected => {
                        ("[-] ", Style::default().fg(Color::Yellow))
                    }
                    SelectionState::NotSelected => ("[ ] ", Style::default().fg(Color::Gray)),
                };

                let mut spans = vec![
                    Span::raw("  ".repeat(entry.depth)),
                    Span::styled(checkbox, checkbox_style),
                ];
                match entry.kind {
                    EntryKind::Dir => {
                        let symbol = if state.expanded.contains(&entry.path)
                            || !state.filter.is_empty()
                        {
                            "▾ "
                        } else if entry.has_children {
                            "▸ "
                        } else {
                            "· "
                        };
                        spans.push(Span::styled(symbol, Style::default().fg(Color::Yellow)));
                        spans.push(Span::styled(
                            format!("{}/", entry.name),
                            Style::default().add_modifier(Modifier::BOLD),
                        ));
                    }
                    EntryKind::File => spans.push(Span::raw(entry.name.clone())),
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        let mut list_state = ListState::default();
        list_state.select(state.selected_index());

        let highlight_bg = if has_focus { Color::Cyan } else { Color::Gray };
        let list = List::new(items)
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(highlight_bg)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▸ ");

        frame.render_stateful_widget(list, layout[1], &mut list_state);
    }
}
