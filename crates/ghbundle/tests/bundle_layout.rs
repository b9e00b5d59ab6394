use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ghbundle::app::bundle::{BundleGenerator, BundleRequest, Pacer};
use ghbundle::app::remote::ContentFetcher;
use ghbundle::domain::errors::{DomainError, FetchError};
use ghbundle::domain::model::{Bundle, FileEntry, Progress, RepoInfo};
use time::OffsetDateTime;
use time::macros::datetime;
use tokio_util::sync::CancellationToken;

struct StaticRepo(HashMap<&'static str, &'static str>);

#[async_trait]
impl ContentFetcher for StaticRepo {
    async fn fetch_content(&self, _repo: &RepoInfo, path: &str) -> Result<String, FetchError> {
        self.0
            .get(path)
            .map(|content| content.to_string())
            .ok_or_else(|| FetchError::Http {
                status: 404,
                message: "Not Found".into(),
            })
    }
}

fn fixed_clock() -> OffsetDateTime {
    datetime!(2024-05-01 12:00:00 UTC)
}

fn widgets() -> StaticRepo {
    StaticRepo(HashMap::from([
        ("README.md", "# Widgets\n"),
        ("docs/guide.md", "Run:\n\n```sh\nls\n```\n"),
        ("src/lib.rs", "pub fn answer() -> u32 {\n    42\n}"),
        ("x.py", "print(1)"),
    ]))
}

fn request(entries: &[&str], selected: &[&str]) -> BundleRequest {
    BundleRequest {
        repo: RepoInfo::new("acme", "widgets", "main"),
        entries: entries.iter().map(|path| FileEntry::file(*path)).collect(),
        selection: selected.iter().copied().collect(),
    }
}

async fn generate(request: &BundleRequest) -> Result<Bundle, DomainError> {
    let generator = BundleGenerator::new(widgets(), Pacer::new(Duration::ZERO, Duration::ZERO))
        .unwrap()
        .with_clock(fixed_clock);
    let mut updates = Vec::new();
    let result = generator
        .generate(
            request,
            &mut |progress: Progress| updates.push(progress),
            &CancellationToken::new(),
        )
        .await;
    if let Ok(bundle) = &result {
        assert_eq!(updates.len(), bundle.attempted + 1);
    }
    result
}

#[tokio::test]
async fn mixed_bundle_layout() {
    let entries = [
        "README.md",
        "docs/guide.md",
        "src/lib.rs",
        "src/missing.rs",
        "x.py",
    ];
    let selected = ["src/missing.rs", "src/lib.rs", "docs/guide.md", "README.md"];
    let bundle = generate(&request(&entries, &selected)).await.unwrap();

    assert_eq!(bundle.attempted, 4);
    assert_eq!(bundle.succeeded, 3);
    assert_eq!(bundle.failures.len(), 1);
    assert_eq!(bundle.failures[0].path, "src/missing.rs");
    insta::assert_snapshot!("mixed_bundle", bundle.text);
}

#[tokio::test]
async fn python_file_gets_python_fence() {
    let bundle = generate(&request(&["x.py"], &["x.py"])).await.unwrap();
    assert!(bundle.text.contains("## x.py\n\n```python\nprint(1)\n```\n"));
    assert!(bundle.text.starts_with("# Repository: acme/widgets\nBranch: main\n"));
}

#[tokio::test]
async fn every_failure_still_yields_a_bundle() {
    let bundle = generate(&request(&["a.rs", "b.rs"], &["a.rs", "b.rs"]))
        .await
        .unwrap();
    assert_eq!(bundle.succeeded, 0);
    assert_eq!(bundle.failures.len(), 2);
    assert_eq!(bundle.text.matches("> Error: HTTP 404: Not Found").count(), 2);
}

#[tokio::test]
async fn selection_outside_listing_is_empty() {
    let err = generate(&request(&["x.py"], &["ghost.rs"])).await.unwrap_err();
    assert!(matches!(err, DomainError::EmptySelection));
}
