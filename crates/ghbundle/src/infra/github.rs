//! GitHub REST API client for listing trees and reading file contents.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;

use crate::app::remote::{ContentFetcher, TreeFetcher};
use crate::domain::errors::FetchError;
use crate::domain::model::{EntryKind, FileEntry, RepoInfo, RepoTree};
use crate::infra::config;

const API_VERSION: &str = "2022-11-28";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";

/// HTTP client bound to one API base URL and an optional access token.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_url: Url,
}

impl GitHubClient {
    /// Build a client from the `[github]` settings. The token, when present, is baked into
    /// the default headers of this client only.
    pub fn new(settings: &config::GitHub) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(API_VERSION),
        );
        if let Some(token) = settings.token() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .context("GitHub token contains characters not allowed in a header")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&settings.user_agent()).context("invalid user agent")?,
        );

        let http = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout())
            .build()
            .context("failed to build HTTP client")?;

        let api_url = Url::parse(&settings.api_url())
            .with_context(|| format!("invalid GitHub API url '{}'", settings.api_url()))?;

        Ok(Self { http, api_url })
    }

    fn tree_url(&self, repo: &RepoInfo) -> Result<Url, FetchError> {
        let mut url = self.endpoint(&["repos", &repo.owner, &repo.repo, "git", "trees", &repo.branch])?;
        url.query_pairs_mut().append_pair("recursive", "1");
        Ok(url)
    }

    fn content_url(&self, repo: &RepoInfo, path: &str) -> Result<Url, FetchError> {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.repo.as_str(), "contents"];
        segments.extend(path.split('/').filter(|segment| !segment.is_empty()));
        let mut url = self.endpoint(&segments)?;
        url.query_pairs_mut().append_pair("ref", &repo.branch);
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Transport(format!("API url '{}' cannot be a base", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl TreeFetcher for GitHubClient {
    async fn fetch_tree(&self, repo: &RepoInfo) -> Result<RepoTree, FetchError> {
        let url = self.tree_url(repo)?;
        tracing::debug!(%url, "fetching repository tree");
        let response = self
            .http
            .get(url)
            .header(ACCEPT, JSON_MEDIA_TYPE)
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response).await?;
        let body = response.text().await.map_err(transport_error)?;
        parse_tree_response(&body)
    }
}

#[async_trait]
impl ContentFetcher for GitHubClient {
    async fn fetch_content(&self, repo: &RepoInfo, path: &str) -> Result<String, FetchError> {
        let url = self.content_url(repo, path)?;
        tracing::debug!(%url, "fetching file content");
        let response = self
            .http
            .get(url)
            .header(ACCEPT, RAW_MEDIA_TYPE)
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        decode_text(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn parse_tree_response(body: &str) -> Result<RepoTree, FetchError> {
    let parsed: TreeResponse = serde_json::from_str(body)
        .map_err(|err| FetchError::Decode(format!("unexpected tree response: {err}")))?;

    let entries = parsed
        .tree
        .into_iter()
        .filter_map(|item| {
            let kind = match item.kind.as_str() {
                "blob" => EntryKind::File,
                "tree" => EntryKind::Dir,
                // Submodule commits have no content in this repository.
                _ => return None,
            };
            Some(FileEntry {
                path: item.path,
                kind,
                size: item.size,
            })
        })
        .collect();

    Ok(RepoTree {
        entries,
        truncated: parsed.truncated,
    })
}

fn decode_text(bytes: Vec<u8>) -> Result<String, FetchError> {
    if bytes.contains(&0) {
        return Err(FetchError::Decode("binary content is not supported".into()));
    }
    String::from_utf8(bytes)
        .map_err(|_| FetchError::Decode("content is not valid UTF-8 text".into()))
}

async fn ensure_success(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(http_error(status, &body))
}

fn http_error(status: StatusCode, body: &str) -> FetchError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|parsed| parsed.message)
        .ok()
        .filter(|message| !message.is_empty())
        .or_else(|| status.canonical_reason().map(str::to_owned))
        .unwrap_or_else(|| "unexpected response".to_owned());
    FetchError::Http {
        status: status.as_u16(),
        message,
    }
}

fn transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Transport("request timed out".into())
    } else {
        FetchError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_url: &str) -> GitHubClient {
        let settings: config::GitHub =
            toml::from_str(&format!("api_url = \"{api_url}\"\ntoken = \"abc\"\n")).unwrap();
        GitHubClient::new(&settings).unwrap()
    }

    #[test]
    fn builds_tree_url() {
        let client = client("https://api.github.com");
        let url = client
            .tree_url(&RepoInfo::new("acme", "widgets", "dev"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/widgets/git/trees/dev?recursive=1"
        );
    }

    #[test]
    fn content_url_encodes_segments_and_ref() {
        let client = client("https://ghe.example.com/api/v3/");
        let url = client
            .content_url(
                &RepoInfo::new("acme", "widgets", "feature/x"),
                "docs/read me.md",
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/acme/widgets/contents/docs/read%20me.md?ref=feature%2Fx"
        );
    }

    #[test]
    fn parses_tree_entries_and_skips_submodules() {
        let body = r#"{
            "sha": "abc",
            "tree": [
                {"path": "src", "type": "tree", "mode": "040000"},
                {"path": "src/main.rs", "type": "blob", "size": 42},
                {"path": "vendor/lib", "type": "commit"}
            ],
            "truncated": true
        }"#;
        let tree = parse_tree_response(body).unwrap();
        assert!(tree.truncated);
        assert_eq!(
            tree.entries,
            vec![
                FileEntry::dir("src"),
                FileEntry {
                    path: "src/main.rs".into(),
                    kind: EntryKind::File,
                    size: Some(42),
                },
            ]
        );
    }

    #[test]
    fn malformed_tree_is_a_decode_error() {
        assert!(matches!(
            parse_tree_response("<html>"),
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn http_error_prefers_api_message() {
        let err = http_error(StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#);
        assert_eq!(
            err,
            FetchError::Http {
                status: 404,
                message: "Not Found".into()
            }
        );
        let err = http_error(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.to_string(), "HTTP 502: Bad Gateway");
    }

    #[test]
    fn rejects_binary_content() {
        assert!(decode_text(vec![0x89, b'P', b'N', b'G', 0]).is_err());
        assert!(decode_text(vec![0xff, 0xfe]).is_err());
        assert_eq!(decode_text(b"fn main() {}".to_vec()).unwrap(), "fn main() {}");
    }
}
