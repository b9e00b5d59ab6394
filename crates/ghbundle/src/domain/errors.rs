//! Domain-specific errors.

use thiserror::Error;

/// Failure reported by a tree or content fetch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unreadable content: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether the host signalled that requests are being throttled.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::Http { status, .. } if *status == 403 || *status == 429)
    }
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid repository reference '{0}': expected owner/repo or a GitHub URL")]
    InvalidReference(String),
    #[error("failed to fetch file tree for {repo}: {source}")]
    TreeFetch {
        repo: String,
        #[source]
        source: FetchError,
    },
    #[error("no files selected")]
    EmptySelection,
    #[error("bundle generation cancelled after {completed} of {total} files")]
    Cancelled { completed: usize, total: usize },
    #[error("failed to render bundle: {0}")]
    Render(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_detection_matches_throttling_statuses() {
        let forbidden = FetchError::Http {
            status: 403,
            message: "API rate limit exceeded".into(),
        };
        let missing = FetchError::Http {
            status: 404,
            message: "Not Found".into(),
        };
        assert!(forbidden.is_rate_limited());
        assert!(!missing.is_rate_limited());
        assert!(!FetchError::Transport("timeout".into()).is_rate_limited());
    }

    #[test]
    fn tree_fetch_error_names_repository() {
        let err = DomainError::TreeFetch {
            repo: "acme/widgets@main".into(),
            source: FetchError::Http {
                status: 404,
                message: "Not Found".into(),
            },
        };
        assert_eq!(
            err.to_string(),
            "failed to fetch file tree for acme/widgets@main: HTTP 404: Not Found"
        );
    }
}
