//! Repository session state and its persistence between runs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::app::bundle::BundleRequest;
use crate::app::filter::InclusionPolicy;
use crate::app::remote::TreeFetcher;
use crate::app::selection::SelectionSet;
use crate::app::tree::{PathCollision, build_tree_with_report};
use crate::domain::errors::DomainError;
use crate::domain::model::{FileEntry, RepoInfo, RepoTree, TreeNode};

const SESSION_DIR: &str = "sessions";

/// A fetched repository: its eligible entries, the selection tree, and the user's picks.
#[derive(Debug, Clone)]
pub struct RepoSession {
    pub repo: RepoInfo,
    pub entries: Vec<FileEntry>,
    pub roots: Vec<TreeNode>,
    /// The host returned an incomplete listing.
    pub truncated: bool,
    pub collisions: Vec<PathCollision>,
    pub selection: SelectionSet,
}

impl RepoSession {
    /// Fetch the tree for `repo` and build a session with an empty selection.
    pub async fn load<T>(
        fetcher: &T,
        repo: RepoInfo,
        policy: &InclusionPolicy,
    ) -> Result<Self, DomainError>
    where
        T: TreeFetcher + ?Sized,
    {
        let listing = fetcher
            .fetch_tree(&repo)
            .await
            .map_err(|source| DomainError::TreeFetch {
                repo: repo.to_string(),
                source,
            })?;
        Ok(Self::from_listing(repo, listing, policy))
    }

    /// Build a session from an already fetched listing.
    pub fn from_listing(repo: RepoInfo, listing: RepoTree, policy: &InclusionPolicy) -> Self {
        if listing.truncated {
            tracing::warn!(%repo, "repository listing was truncated by the host");
        }
        let total = listing.entries.len();
        let entries = policy.apply(listing.entries);
        let build = build_tree_with_report(&entries);
        tracing::info!(%repo, listed = total, eligible = entries.len(), "loaded repository tree");

        Self {
            repo,
            entries,
            roots: build.roots,
            truncated: listing.truncated,
            collisions: build.collisions,
            selection: SelectionSet::new(),
        }
    }

    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_file()).count()
    }

    /// Snapshot of the current selection, ready to hand to the bundle generator.
    pub fn bundle_request(&self) -> BundleRequest {
        BundleRequest {
            repo: self.repo.clone(),
            entries: self.entries.clone(),
            selection: self.selection.clone(),
        }
    }

    pub fn snapshot(&self, filter: Option<String>) -> SessionSnapshot {
        SessionSnapshot {
            reference: self.repo.slug(),
            branch: self.repo.branch.clone(),
            selections: self.selection.iter().map(str::to_owned).collect(),
            filter,
        }
    }

    /// Restore persisted selections that still name a file in this listing.
    /// Returns how many were restored.
    pub fn restore(&mut self, snapshot: &SessionSnapshot) -> usize {
        if snapshot.reference != self.repo.slug() {
            return 0;
        }
        let mut restored: SelectionSet = snapshot.selections.iter().cloned().collect();
        let dropped = restored.retain_known(&self.entries);
        if dropped > 0 {
            tracing::debug!(dropped, "ignoring saved selections missing from the listing");
        }
        let count = restored.len();
        self.selection = restored;
        count
    }
}

/// Persisted selection state for one repository.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// `owner/repo` slug.
    pub reference: String,
    pub branch: String,
    pub selections: Vec<String>,
    /// Active file tree filter.
    #[serde(default)]
    pub filter: Option<String>,
}

/// Stores one JSON snapshot per repository under a root directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at `<data dir>/ghbundle`.
    pub fn default_location() -> Result<Self> {
        let data = dirs_next::data_dir()
            .ok_or_else(|| anyhow!("unable to determine the user data directory"))?;
        Ok(Self::new(data.join(env!("CARGO_PKG_NAME"))))
    }

    /// Location of the snapshot for `repo`.
    pub fn path_for(&self, repo: &RepoInfo) -> PathBuf {
        self.root
            .join(SESSION_DIR)
            .join(format!("{}__{}.json", repo.owner, repo.repo))
    }

    pub fn load(&self, repo: &RepoInfo) -> Result<Option<SessionSnapshot>> {
        let path = self.path_for(repo);
        if !path.exists() {
            return Ok(None);
        }

        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed to read session file at {}", path.display()))?;
        let snapshot = serde_json::from_str(&data)
            .with_context(|| format!("invalid session data in {}", path.display()))?;
        Ok(Some(snapshot))
    }

    /// Persist the snapshot, creating parent directories as needed.
    pub fn save(&self, repo: &RepoInfo, snapshot: &SessionSnapshot) -> Result<PathBuf> {
        let path = self.path_for(repo);
        let dir = path.parent().unwrap_or(Path::new(&self.root));
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create session directory {}", dir.display()))?;

        let data = serde_json::to_string_pretty(snapshot)
            .context("failed to serialize session snapshot")?;
        fs::write(&path, data)
            .with_context(|| format!("failed to write session file to {}", path.display()))?;
        Ok(path)
    }
}
