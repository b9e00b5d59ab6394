//! Application loop for the interactive selector.

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{Frame, Terminal};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::app::bundle::{BundleGenerator, Pacer};
use crate::app::export::{ExportOptions, Exporter};
use crate::app::filter::InclusionPolicy;
use crate::app::remote::{ContentFetcher, TreeFetcher};
use crate::app::selection::SelectionSet;
use crate::app::session::{RepoSession, SessionStore};
use crate::app::tokens::TokenEstimator;
use crate::domain::errors::DomainError;
use crate::domain::model::{Bundle, Progress, RepoInfo};
use crate::infra::config::Config;
use crate::ui::components::file_tree::{FileTree, FileTreeState};
use crate::ui::components::summary::{RunReport, Summary, SummaryView};

const TICK_RATE: Duration = Duration::from_millis(100);

/// Messages sent from background tasks to the event loop.
#[derive(Debug)]
enum AppEvent {
    TreeLoaded(Result<RepoSession, DomainError>),
    Progress(Progress),
    Finished(Result<Bundle, DomainError>),
}

#[derive(Debug)]
enum Job {
    Loading,
    Generating {
        cancel: CancellationToken,
        progress: Progress,
    },
}

/// Interactive tree selector for one repository.
pub struct UiApp<F> {
    config: Config,
    runtime: Handle,
    fetcher: Arc<F>,
    policy: InclusionPolicy,
    repo: RepoInfo,
    session: Option<RepoSession>,
    tree: FileTreeState,
    store: SessionStore,
    estimator: TokenEstimator,
    exporter: Exporter,
    job: Option<Job>,
    events_tx: Sender<AppEvent>,
    events_rx: Receiver<AppEvent>,
    last_run: Option<RunReport>,
    status: Option<StatusMessage>,
    should_quit: bool,
}

impl<F> UiApp<F>
where
    F: TreeFetcher + ContentFetcher + 'static,
{
    pub fn new(
        config: Config,
        repo: RepoInfo,
        fetcher: Arc<F>,
        store: SessionStore,
        runtime: Handle,
    ) -> Result<Self> {
        let policy = InclusionPolicy::from_config(&config)?;
        let estimator = TokenEstimator::from_config(&config);
        let (events_tx, events_rx) = mpsc::channel();
        Ok(Self {
            tree: FileTreeState::new(repo.slug(), Vec::new()),
            config,
            runtime,
            fetcher,
            policy,
            repo,
            session: None,
            store,
            estimator,
            exporter: Exporter::new(),
            job: None,
            events_tx,
            events_rx,
            last_run: None,
            status: None,
            should_quit: false,
        })
    }

    /// Take over the terminal until the user quits.
    pub fn run(&mut self) -> Result<()> {
        self.start_load();

        enable_raw_mode().context("failed to enable raw mode")?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to initialize terminal")?;
        terminal.hide_cursor().ok();

        let result = self.event_loop(&mut terminal);

        disable_raw_mode().ok();
        let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
        let _ = terminal.show_cursor();

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        while !self.should_quit {
            terminal.draw(|frame| self.render(frame))?;
            self.drain_events();
            self.expire_status();

            if event::poll(TICK_RATE)?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                self.handle_key(key);
            }
        }
        self.cancel_job();
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.job.is_some()
    }

    fn start_load(&mut self) {
        if self.is_busy() {
            return;
        }
        self.job = Some(Job::Loading);
        self.set_status(StatusLevel::Info, format!("Fetching tree for {}", self.repo));

        let fetcher = Arc::clone(&self.fetcher);
        let repo = self.repo.clone();
        let policy = self.policy.clone();
        let tx = self.events_tx.clone();
        self.runtime.spawn(async move {
            let result = RepoSession::load(fetcher.as_ref(), repo, &policy).await;
            let _ = tx.send(AppEvent::TreeLoaded(result));
        });
    }

    fn start_generation(&mut self) {
        if self.is_busy() {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };
        let request = session.bundle_request();
        let pacer = Pacer::from_config(&self.config.fetch);
        let generator = match BundleGenerator::new(Arc::clone(&self.fetcher), pacer) {
            Ok(generator) => generator,
            Err(err) => {
                self.set_status(StatusLevel::Error, err.to_string());
                return;
            }
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let total = request.selected_files().len();
        self.job = Some(Job::Generating {
            cancel,
            progress: Progress {
                completed: 0,
                total,
            },
        });
        self.set_status(StatusLevel::Info, "Generating bundle · esc to cancel");

        let tx = self.events_tx.clone();
        self.runtime.spawn(async move {
            let progress_tx = tx.clone();
            let mut report = move |progress: Progress| {
                let _ = progress_tx.send(AppEvent::Progress(progress));
            };
            let result = generator.generate(&request, &mut report, &token).await;
            let _ = tx.send(AppEvent::Finished(result));
        });
    }

    fn cancel_job(&mut self) {
        if let Some(Job::Generating { cancel, .. }) = &self.job {
            cancel.cancel();
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::TreeLoaded(result) => {
                self.job = None;
                match result {
                    Ok(session) => self.install_session(session),
                    Err(err) => self.set_status(StatusLevel::Error, err.to_string()),
                }
            }
            AppEvent::Progress(update) => {
                if let Some(Job::Generating { progress, .. }) = &mut self.job {
                    *progress = update;
                }
            }
            AppEvent::Finished(result) => {
                self.job = None;
                match result {
                    Ok(bundle) => self.finish_bundle(bundle),
                    Err(err) => {
                        let level = match err {
                            DomainError::Cancelled { .. } => StatusLevel::Info,
                            _ => StatusLevel::Error,
                        };
                        self.set_status(level, err.to_string());
                    }
                }
            }
        }
    }

    fn install_session(&mut self, mut session: RepoSession) {
        let mut filter = None;
        if let Some(previous) = self.session.take() {
            session.selection = previous.selection;
            session.selection.retain_known(&session.entries);
        } else {
            match self.store.load(&session.repo) {
                Ok(Some(snapshot)) => {
                    session.restore(&snapshot);
                    filter = snapshot.filter;
                }
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, "ignoring unreadable session"),
            }
        }

        self.tree.replace_tree(session.roots.clone());
        if let Some(filter) = filter {
            self.tree.set_filter(filter);
        }

        if session.truncated {
            self.set_status(
                StatusLevel::Error,
                "GitHub truncated the listing; some files are missing",
            );
        } else {
            self.set_status(
                StatusLevel::Success,
                format!("Loaded {} eligible files", session.file_count()),
            );
        }
        self.session = Some(session);
    }

    fn finish_bundle(&mut self, bundle: Bundle) {
        let tokens = self.estimator.estimate(&bundle.text);
        let options = ExportOptions::from_config(&self.config, &bundle);
        let (output, status) = match self.exporter.export(&bundle, &options) {
            Ok(result) => {
                let output = result.output_path.map(|path| path.display().to_string());
                let mut text = format!(
                    "Bundled {} of {} files",
                    bundle.succeeded, bundle.attempted
                );
                if let Some(path) = &output {
                    text.push_str(&format!(" → {path}"));
                }
                if let Some(backend) = result.copied_to {
                    text.push_str(&format!(" · copied via {backend}"));
                }
                let level = if bundle.has_failures() {
                    StatusLevel::Error
                } else {
                    StatusLevel::Success
                };
                (output, StatusMessage::new(level, text))
            }
            Err(err) => (
                None,
                StatusMessage::new(StatusLevel::Error, format!("{err:#}")),
            ),
        };
        self.status = Some(status);
        self.last_run = Some(RunReport {
            attempted: bundle.attempted,
            succeeded: bundle.succeeded,
            failures: bundle.failures,
            tokens,
            output,
        });
    }

    fn save_session(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        let filter = (!self.tree.filter().is_empty()).then(|| self.tree.filter().to_string());
        let snapshot = session.snapshot(filter);
        match self.store.save(&session.repo, &snapshot) {
            Ok(path) => self.set_status(
                StatusLevel::Success,
                format!("Session saved to {}", path.display()),
            ),
            Err(err) => self.set_status(StatusLevel::Error, format!("{err:#}")),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if self.tree.is_filter_active() {
            self.handle_filter_input(key);
            return;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') => self.quit(),
                KeyCode::Char('s') => self.save_session(),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Esc => {
                if matches!(self.job, Some(Job::Generating { .. })) {
                    self.cancel_job();
                    self.set_status(StatusLevel::Info, "Cancelling…");
                } else {
                    self.quit();
                }
            }
            KeyCode::Char('q') => self.quit(),
            KeyCode::Char('/') => self.tree.begin_filter(),
            KeyCode::Char('j') | KeyCode::Down => self.tree.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.tree.select_previous(),
            KeyCode::Char('h') | KeyCode::Left => self.tree.collapse_or_parent(),
            KeyCode::Char('l') | KeyCode::Right | KeyCode::Enter => self.tree.expand_or_enter(),
            KeyCode::Char(' ') => self.toggle_current(),
            KeyCode::Char('a') => {
                if let Some(session) = &mut self.session {
                    session.selection.select_all(&session.entries);
                }
            }
            KeyCode::Char('n') => {
                if let Some(session) = &mut self.session {
                    session.selection.select_none();
                }
            }
            KeyCode::Char('g') => {
                if self.session.as_ref().is_some_and(|s| s.selection.is_empty()) {
                    self.set_status(StatusLevel::Error, "Select at least one file first");
                } else {
                    self.start_generation();
                }
            }
            KeyCode::Char('r') => self.start_load(),
            _ => {}
        }
    }

    fn handle_filter_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Enter => self.tree.end_filter(),
            KeyCode::Backspace => self.tree.pop_filter_char(),
            KeyCode::Char(ch)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                self.tree.push_filter_char(ch)
            }
            _ => {}
        }
    }

    fn toggle_current(&mut self) {
        let (Some(session), Some(node)) = (&mut self.session, self.tree.selected_node()) else {
            return;
        };
        session.selection.toggle_node(node);
    }

    fn quit(&mut self) {
        self.cancel_job();
        self.should_quit = true;
    }

    fn render(&self, frame: &mut Frame<'_>) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(1),
                Constraint::Length(2),
            ])
            .split(frame.size());

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(layout[0]);

        let empty = SelectionSet::new();
        let selection = self
            .session
            .as_ref()
            .map(|session| &session.selection)
            .unwrap_or(&empty);
        FileTree.render(frame, columns[0], &self.tree, selection, true);

        let progress = match &self.job {
            Some(Job::Generating { progress, .. }) => Some(*progress),
            _ => None,
        };
        let view = SummaryView {
            repo: Some(&self.repo),
            selected: selection.len(),
            eligible: self
                .session
                .as_ref()
                .map(RepoSession::file_count)
                .unwrap_or(0),
            truncated: self.session.as_ref().is_some_and(|s| s.truncated),
            progress,
            last_run: self.last_run.as_ref(),
        };
        Summary.render(frame, columns[1], &view);

        frame.render_widget(key_hints(), layout[1]);
        self.render_status(frame, layout[2]);
    }

    fn render_status(&self, frame: &mut Frame<'_>, area: Rect) {
        let line = match &self.status {
            Some(status) => {
                let style = match status.level {
                    StatusLevel::Info => Style::default().fg(Color::Gray),
                    StatusLevel::Success => Style::default().fg(Color::Green),
                    StatusLevel::Error => Style::default().fg(Color::Red),
                };
                Line::styled(status.text.clone(), style)
            }
            None if self.is_busy() => {
                Line::styled("Working…", Style::default().fg(Color::DarkGray))
            }
            None => Line::styled("Ready", Style::default().fg(Color::DarkGray)),
        };

        let block = Block::default().borders(Borders::TOP);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Paragraph::new(line), inner);
    }

    fn expire_status(&mut self) {
        if self.status.as_ref().is_some_and(StatusMessage::is_expired) {
            self.status = None;
        }
    }

    fn set_status(&mut self, level: StatusLevel, message: impl Into<String>) {
        self.status = Some(StatusMessage::new(level, message.into()));
    }
}

fn key_hints() -> Paragraph<'static> {
    let key = Style::default().fg(Color::Cyan);
    Paragraph::new(Line::from(vec![
        Span::styled("space", key),
        Span::raw(" toggle · "),
        Span::styled("a/n", key),
        Span::raw(" all/none · "),
        Span::styled("g", key),
        Span::raw(" generate · "),
        Span::styled("/", key),
        Span::raw(" filter · "),
        Span::styled("r", key),
        Span::raw(" refetch · "),
        Span::styled("ctrl+s", key),
        Span::raw(" save · "),
        Span::styled("esc", key),
        Span::raw(" cancel/quit"),
    ]))
    .style(Style::default().fg(Color::Gray))
}

#[derive(Debug)]
struct StatusMessage {
    level: StatusLevel,
    text: String,
    expires_at: Instant,
}

impl StatusMessage {
    fn new(level: StatusLevel, text: String) -> Self {
        Self {
            level,
            text,
            expires_at: Instant::now() + Duration::from_secs(6),
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusLevel {
    Info,
    Success,
    Error,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use async_trait::async_trait;
    use tempfile::{TempDir, tempdir};

    use super::*;
    use crate::domain::errors::FetchError;
    use crate::domain::model::{FileEntry, RepoTree};

    struct FakeRepo {
        files: HashMap<&'static str, &'static str>,
    }

    #[async_trait]
    impl TreeFetcher for FakeRepo {
        async fn fetch_tree(&self, _repo: &RepoInfo) -> Result<RepoTree, FetchError> {
            let mut entries: Vec<FileEntry> =
                self.files.keys().map(|path| FileEntry::file(*path)).collect();
            entries.sort_by(|a, b| a.path.cmp(&b.path));
            Ok(RepoTree {
                entries,
                truncated: false,
            })
        }
    }

    #[async_trait]
    impl ContentFetcher for FakeRepo {
        async fn fetch_content(&self, _repo: &RepoInfo, path: &str) -> Result<String, FetchError> {
            self.files
                .get(path)
                .map(|content| content.to_string())
                .ok_or_else(|| FetchError::Http {
                    status: 404,
                    message: "Not Found".into(),
                })
        }
    }

    fn app(runtime: &tokio::runtime::Runtime) -> (UiApp<FakeRepo>, TempDir) {
        let dir = tempdir().unwrap();
        let config: Config = toml::from_str(&format!(
            "[fetch]\ndelay_ms = 0\n[export]\noutput_dir = {:?}\ncopy_to_clipboard = false\n",
            dir.path().join("out").display().to_string()
        ))
        .unwrap();
        let fetcher = Arc::new(FakeRepo {
            files: HashMap::from([("README.md", "# Widgets"), ("src/lib.rs", "pub fn x() {}")]),
        });
        let app = UiApp::new(
            config,
            RepoInfo::new("acme", "widgets", "main"),
            fetcher,
            SessionStore::new(dir.path().join("state")),
            runtime.handle().clone(),
        )
        .unwrap();
        (app, dir)
    }

    fn press(app: &mut UiApp<FakeRepo>, ch: char) {
        app.handle_key(KeyEvent::new(KeyCode::Char(ch), KeyModifiers::NONE));
    }

    fn wait_idle(app: &mut UiApp<FakeRepo>) {
        while app.is_busy() {
            let event = app
                .events_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("background task reported back");
            app.apply_event(event);
        }
    }

    #[test]
    fn loads_selects_and_generates() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (mut app, dir) = app(&runtime);

        app.start_load();
        wait_idle(&mut app);
        assert_eq!(app.session.as_ref().unwrap().file_count(), 2);

        press(&mut app, 'a');
        assert_eq!(app.session.as_ref().unwrap().selection.len(), 2);

        press(&mut app, 'g');
        assert!(app.is_busy());
        // A second trigger while busy is ignored.
        press(&mut app, 'g');
        wait_idle(&mut app);

        let report = app.last_run.as_ref().unwrap();
        assert_eq!((report.attempted, report.succeeded), (2, 2));
        let written =
            fs::read_to_string(dir.path().join("out/acme_widgets_main.txt")).unwrap();
        assert!(written.contains("## src/lib.rs\n\n```rust\npub fn x() {}\n```"));
    }

    #[test]
    fn toggling_nodes_and_saving_session() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (mut app, dir) = app(&runtime);
        app.start_load();
        wait_idle(&mut app);

        // Rows are README.md, src, src/lib.rs; toggling `src` selects its files.
        press(&mut app, 'j');
        press(&mut app, ' ');
        assert!(app.session.as_ref().unwrap().selection.contains("src/lib.rs"));

        app.handle_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL));
        assert!(dir.path().join("state/sessions/acme__widgets.json").exists());

        press(&mut app, 'n');
        assert!(app.session.as_ref().unwrap().selection.is_empty());
    }

    #[test]
    fn generate_without_selection_reports_status() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (mut app, _dir) = app(&runtime);
        app.start_load();
        wait_idle(&mut app);

        press(&mut app, 'g');
        assert!(!app.is_busy());
        assert_eq!(app.status.as_ref().unwrap().level, StatusLevel::Error);
    }
}
