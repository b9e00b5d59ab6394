//! Sequential, paced generation of the repository bundle.

use std::time::Duration;

use minijinja::Environment;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;

use crate::app::language::language_tag;
use crate::app::remote::ContentFetcher;
use crate::app::selection::SelectionSet;
use crate::domain::errors::{DomainError, FetchError};
use crate::domain::model::{Bundle, FileEntry, FileFailure, Progress, RepoInfo};
use crate::infra::config;

const HEADER_TEMPLATE: &str = "\
# Repository: {{ owner }}/{{ repo }}
Branch: {{ branch }}
Generated: {{ generated_at }}
Files: {{ count }}

";

const FILE_TEMPLATE: &str = "\
## {{ path }}

{{ fence }}{{ tag }}
{{ content }}{{ fence }}

";

const ERROR_TEMPLATE: &str = "\
## {{ path }}

> Error: {{ message }}

";

/// Everything a generation run needs, owned so it can move onto a spawned task.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub repo: RepoInfo,
    pub entries: Vec<FileEntry>,
    pub selection: SelectionSet,
}

impl BundleRequest {
    /// File entries that are selected, in listing order.
    pub fn selected_files(&self) -> Vec<&FileEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.is_file() && self.selection.contains(&entry.path))
            .collect()
    }
}

#[derive(Serialize)]
struct HeaderContext<'a> {
    owner: &'a str,
    repo: &'a str,
    branch: &'a str,
    generated_at: &'a str,
    count: usize,
}

#[derive(Serialize)]
struct FileContext<'a> {
    path: &'a str,
    fence: String,
    tag: String,
    content: &'a str,
}

#[derive(Serialize)]
struct ErrorContext<'a> {
    path: &'a str,
    message: &'a str,
}

/// Renders the individual parts of the bundle document.
pub struct BundleRenderer {
    env: Environment<'static>,
}

impl BundleRenderer {
    pub fn new() -> Result<Self, DomainError> {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        for (name, source) in [
            ("bundle_header", HEADER_TEMPLATE),
            ("bundle_file", FILE_TEMPLATE),
            ("bundle_error", ERROR_TEMPLATE),
        ] {
            env.add_template(name, source)
                .map_err(|err| DomainError::Render(format!("invalid template '{name}': {err}")))?;
        }
        Ok(Self { env })
    }

    pub fn header(
        &self,
        repo: &RepoInfo,
        generated_at: OffsetDateTime,
        count: usize,
    ) -> Result<String, DomainError> {
        let generated_at = generated_at
            .format(&Rfc3339)
            .map_err(|err| DomainError::Render(format!("failed to format timestamp: {err}")))?;
        self.render(
            "bundle_header",
            HeaderContext {
                owner: &repo.owner,
                repo: &repo.repo,
                branch: &repo.branch,
                generated_at: &generated_at,
                count,
            },
        )
    }

    pub fn file_section(&self, path: &str, content: &str) -> Result<String, DomainError> {
        let content = if content.is_empty() || content.ends_with('\n') {
            content.to_owned()
        } else {
            format!("{content}\n")
        };
        self.render(
            "bundle_file",
            FileContext {
                path,
                fence: fence_for(&content),
                tag: language_tag(path),
                content: &content,
            },
        )
    }

    pub fn error_section(&self, path: &str, message: &str) -> Result<String, DomainError> {
        self.render("bundle_error", ErrorContext { path, message })
    }

    fn render<S: Serialize>(&self, name: &str, context: S) -> Result<String, DomainError> {
        self.env
            .get_template(name)
            .and_then(|template| template.render(context))
            .map_err(|err| DomainError::Render(format!("failed to render '{name}': {err}")))
    }
}

/// Three backticks, or one more than the longest backtick run in the content.
pub fn fence_for(content: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for ch in content.chars() {
        if ch == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

/// Delay between consecutive fetches, doubled while the host reports throttling.
#[derive(Debug, Clone)]
pub struct Pacer {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Pacer {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: base,
        }
    }

    pub fn from_config(fetch: &config::Fetch) -> Self {
        Self::new(fetch.delay(), fetch.max_delay())
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Adjust the delay after a fetch. Throttling doubles it; anything else resets it.
    pub fn observe(&mut self, outcome: Result<(), &FetchError>) {
        match outcome {
            Err(err) if err.is_rate_limited() => {
                self.current = (self.current * 2).min(self.max);
                tracing::debug!(delay_ms = self.current.as_millis() as u64, "backing off");
            }
            _ => self.current = self.base,
        }
    }

    /// Wait out the current delay. Returns `false` when cancelled first.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        if self.current.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.current) => true,
        }
    }
}

/// Fetches every selected file in order and assembles the bundle document.
pub struct BundleGenerator<F> {
    fetcher: F,
    renderer: BundleRenderer,
    pacer: Pacer,
    clock: fn() -> OffsetDateTime,
}

impl<F: ContentFetcher> BundleGenerator<F> {
    pub fn new(fetcher: F, pacer: Pacer) -> Result<Self, DomainError> {
        Ok(Self {
            fetcher,
            renderer: BundleRenderer::new()?,
            pacer,
            clock: OffsetDateTime::now_utc,
        })
    }

    /// Replace the timestamp source used for the header.
    pub fn with_clock(mut self, clock: fn() -> OffsetDateTime) -> Self {
        self.clock = clock;
        self
    }

    /// Run one generation.
    ///
    /// `progress` is called with `0/total` before the first fetch and once after every
    /// attempted file. A cancelled run yields [`DomainError::Cancelled`] and no bundle.
    pub async fn generate<P>(
        &self,
        request: &BundleRequest,
        progress: &mut P,
        cancel: &CancellationToken,
    ) -> Result<Bundle, DomainError>
    where
        P: FnMut(Progress) + Send,
    {
        if request.selection.is_empty() {
            return Err(DomainError::EmptySelection);
        }
        let files = request.selected_files();
        if files.is_empty() {
            return Err(DomainError::EmptySelection);
        }

        let total = files.len();
        let now = (self.clock)();
        let now = now.replace_nanosecond(0).unwrap_or(now);
        let mut text = self.renderer.header(&request.repo, now, total)?;
        let mut failures = Vec::new();
        let mut pacer = self.pacer.clone();

        tracing::info!(repo = %request.repo, files = total, "generating bundle");
        progress(Progress {
            completed: 0,
            total,
        });

        for (index, entry) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DomainError::Cancelled {
                    completed: index,
                    total,
                });
            }

            tracing::debug!(path = %entry.path, "fetching");
            match self.fetcher.fetch_content(&request.repo, &entry.path).await {
                Ok(content) => {
                    text.push_str(&self.renderer.file_section(&entry.path, &content)?);
                    pacer.observe(Ok(()));
                }
                Err(err) => {
                    tracing::warn!(path = %entry.path, error = %err, "failed to fetch file");
                    let message = err.to_string();
                    text.push_str(&self.renderer.error_section(&entry.path, &message)?);
                    pacer.observe(Err(&err));
                    failures.push(FileFailure {
                        path: entry.path.clone(),
                        message,
                    });
                }
            }

            let completed = index + 1;
            progress(Progress { completed, total });

            if completed < total && !pacer.wait(cancel).await {
                return Err(DomainError::Cancelled { completed, total });
            }
        }

        let succeeded = total - failures.len();
        tracing::info!(
            attempted = total,
            succeeded,
            failed = failures.len(),
            "bundle generated"
        );

        Ok(Bundle {
            text,
            repo: request.repo.clone(),
            attempted: total,
            succeeded,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::macros::datetime;
    use tokio::time::Instant;

    use super::*;

    #[derive(Default)]
    struct FakeFetcher {
        contents: HashMap<String, Result<String, FetchError>>,
        calls: Mutex<Vec<(String, Instant)>>,
    }

    impl FakeFetcher {
        fn with(mut self, path: &str, outcome: Result<&str, FetchError>) -> Self {
            self.contents
                .insert(path.to_owned(), outcome.map(str::to_owned));
            self
        }

        fn called_paths(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(path, _)| path.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ContentFetcher for FakeFetcher {
        async fn fetch_content(&self, _repo: &RepoInfo, path: &str) -> Result<String, FetchError> {
            self.calls
                .lock()
                .unwrap()
                .push((path.to_owned(), Instant::now()));
            self.contents
                .get(path)
                .cloned()
                .unwrap_or_else(|| Err(FetchError::Http {
                    status: 404,
                    message: "Not Found".into(),
                }))
        }
    }

    fn fixed_clock() -> OffsetDateTime {
        datetime!(2024-05-01 12:00:00 UTC)
    }

    fn generator(fetcher: FakeFetcher, delay_ms: u64) -> BundleGenerator<FakeFetcher> {
        let delay = Duration::from_millis(delay_ms);
        BundleGenerator::new(fetcher, Pacer::new(delay, delay * 8))
            .unwrap()
            .with_clock(fixed_clock)
    }

    fn request(paths: &[&str], selected: &[&str]) -> BundleRequest {
        BundleRequest {
            repo: RepoInfo::new("acme", "widgets", "main"),
            entries: paths.iter().map(|p| FileEntry::file(*p)).collect(),
            selection: selected.iter().copied().collect(),
        }
    }

    #[tokio::test]
    async fn single_python_file_is_fenced_and_tagged() {
        let generator = generator(FakeFetcher::default().with("x.py", Ok("print(1)")), 0);
        let bundle = generator
            .generate(
                &request(&["x.py"], &["x.py"]),
                &mut |_: Progress| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            bundle.text,
            "# Repository: acme/widgets\nBranch: main\nGenerated: 2024-05-01T12:00:00Z\nFiles: 1\n\n\
             ## x.py\n\n```python\nprint(1)\n```\n\n"
        );
        assert_eq!((bundle.attempted, bundle.succeeded), (1, 1));
        assert!(!bundle.has_failures());
    }

    #[tokio::test]
    async fn failing_file_is_isolated() {
        let fetcher = FakeFetcher::default()
            .with("a.rs", Ok("fn a() {}\n"))
            .with(
                "b.rs",
                Err(FetchError::Transport("connection reset".into())),
            );
        let generator = generator(fetcher, 0);
        let bundle = generator
            .generate(
                &request(&["a.rs", "b.rs"], &["a.rs", "b.rs"]),
                &mut |_: Progress| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(bundle.attempted, 2);
        assert_eq!(bundle.succeeded, 1);
        assert_eq!(
            bundle.failures,
            vec![FileFailure {
                path: "b.rs".into(),
                message: "request failed: connection reset".into(),
            }]
        );
        assert!(bundle.text.contains("## a.rs\n\n```rust\nfn a() {}\n```\n"));
        assert!(
            bundle
                .text
                .contains("## b.rs\n\n> Error: request failed: connection reset\n")
        );
    }

    #[tokio::test]
    async fn empty_selection_fetches_nothing() {
        let generator = generator(FakeFetcher::default(), 0);
        let err = generator
            .generate(&request(&["a.rs"], &[]), &mut |_: Progress| {}, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::EmptySelection));
        assert!(generator.fetcher.called_paths().is_empty());
    }

    #[tokio::test]
    async fn selection_without_file_entries_is_empty() {
        let generator = generator(FakeFetcher::default(), 0);
        let err = generator
            .generate(
                &request(&["a.rs"], &["gone.rs"]),
                &mut |_: Progress| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::EmptySelection));
    }

    #[tokio::test]
    async fn files_follow_listing_order_and_report_progress() {
        let fetcher = FakeFetcher::default()
            .with("b.md", Ok("b"))
            .with("a.md", Ok("a"))
            .with("c.md", Ok("c"));
        let generator = generator(fetcher, 0);
        let mut seen = Vec::new();
        generator
            .generate(
                &request(&["b.md", "a.md", "c.md"], &["c.md", "b.md"]),
                &mut |p: Progress| seen.push((p.completed, p.total)),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(generator.fetcher.called_paths(), vec!["b.md", "c.md"]);
        assert_eq!(seen, vec![(0, 2), (1, 2), (2, 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_are_spaced_by_the_delay() {
        let fetcher = FakeFetcher::default()
            .with("a.txt", Ok("a"))
            .with("b.txt", Ok("b"))
            .with("c.txt", Ok("c"));
        let generator = generator(fetcher, 100);
        let started = Instant::now();
        generator
            .generate(
                &request(&["a.txt", "b.txt", "c.txt"], &["a.txt", "b.txt", "c.txt"]),
                &mut |_: Progress| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let calls = generator.fetcher.calls.lock().unwrap().clone();
        let offsets: Vec<u128> = calls
            .iter()
            .map(|(_, at)| at.duration_since(started).as_millis())
            .collect();
        assert_eq!(offsets, vec![0, 100, 200]);
        // No trailing delay after the last file.
        assert_eq!(started.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_fetch_doubles_the_delay() {
        let fetcher = FakeFetcher::default()
            .with(
                "a.txt",
                Err(FetchError::Http {
                    status: 429,
                    message: "slow down".into(),
                }),
            )
            .with("b.txt", Ok("b"))
            .with("c.txt", Ok("c"));
        let generator = generator(fetcher, 100);
        let started = Instant::now();
        generator
            .generate(
                &request(&["a.txt", "b.txt", "c.txt"], &["a.txt", "b.txt", "c.txt"]),
                &mut |_: Progress| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let calls = generator.fetcher.calls.lock().unwrap().clone();
        let offsets: Vec<u128> = calls
            .iter()
            .map(|(_, at)| at.duration_since(started).as_millis())
            .collect();
        assert_eq!(offsets, vec![0, 200, 300]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_delay_stops_the_run() {
        let fetcher = FakeFetcher::default()
            .with("a.txt", Ok("a"))
            .with("b.txt", Ok("b"));
        let generator = generator(fetcher, 1_000);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut progress = move |p: Progress| {
            if p.completed == 1 {
                trigger.cancel();
            }
        };

        let err = generator
            .generate(
                &request(&["a.txt", "b.txt"], &["a.txt", "b.txt"]),
                &mut progress,
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Cancelled {
                completed: 1,
                total: 2
            }
        ));
        assert_eq!(generator.fetcher.called_paths(), vec!["a.txt"]);
    }

    #[test]
    fn fence_grows_past_backtick_runs() {
        assert_eq!(fence_for("plain"), "```");
        assert_eq!(fence_for("inline `code`"), "```");
        assert_eq!(fence_for("```rust\nfn x() {}\n```\n"), "````");
        assert_eq!(fence_for("`````"), "``````");
    }

    #[test]
    fn renderer_terminates_content_and_handles_untagged_files() {
        let renderer = BundleRenderer::new().unwrap();
        assert_eq!(
            renderer.file_section("Makefile", "all:\n\tcargo build").unwrap(),
            "## Makefile\n\n```\nall:\n\tcargo build\n```\n\n"
        );
        assert_eq!(
            renderer.file_section("notes.weird", "<b>&</b>\n").unwrap(),
            "## notes.weird\n\n```weird\n<b>&</b>\n```\n\n"
        );
    }

    #[test]
    fn pacer_backoff_is_capped() {
        let mut pacer = Pacer::new(Duration::from_millis(100), Duration::from_millis(300));
        let throttled = FetchError::Http {
            status: 403,
            message: "rate limit".into(),
        };
        pacer.observe(Err(&throttled));
        assert_eq!(pacer.current(), Duration::from_millis(200));
        pacer.observe(Err(&throttled));
        assert_eq!(pacer.current(), Duration::from_millis(300));
        pacer.observe(Err(&FetchError::Decode("binary".into())));
        assert_eq!(pacer.current(), Duration::from_millis(100));
    }
}
