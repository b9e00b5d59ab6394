//! Seams to the repository host used by the session and the bundle generator.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::FetchError;
use crate::domain::model::{RepoInfo, RepoTree};

/// Lists every entry of a repository at a branch.
#[async_trait]
pub trait TreeFetcher: Send + Sync {
    async fn fetch_tree(&self, repo: &RepoInfo) -> Result<RepoTree, FetchError>;
}

/// Retrieves the text content of one file.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_content(&self, repo: &RepoInfo, path: &str) -> Result<String, FetchError>;
}

#[async_trait]
impl<T: TreeFetcher + ?Sized> TreeFetcher for Arc<T> {
    async fn fetch_tree(&self, repo: &RepoInfo) -> Result<RepoTree, FetchError> {
        (**self).fetch_tree(repo).await
    }
}

#[async_trait]
impl<T: ContentFetcher + ?Sized> ContentFetcher for Arc<T> {
    async fn fetch_content(&self, repo: &RepoInfo, path: &str) -> Result<String, FetchError> {
        (**self).fetch_content(repo, path).await
    }
}
