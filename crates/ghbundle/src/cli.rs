//! Command-line entry point.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use globset::{Glob, GlobSetBuilder};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::app::bundle::{BundleGenerator, Pacer};
use crate::app::export::{ExportOptions, Exporter};
use crate::app::filter::InclusionPolicy;
use crate::app::reference::{DEFAULT_BRANCH, parse_reference_or, resolve_reference};
use crate::app::session::{RepoSession, SessionStore};
use crate::app::tokens::TokenEstimator;
use crate::app::tree::render_ascii;
use crate::domain::model::{Progress, RepoInfo};
use crate::infra::config::Config;
use crate::infra::github::GitHubClient;
use crate::infra::logging;
use crate::ui::app::UiApp;

/// Bundle files of a GitHub repository into one LLM-ready text document
#[derive(Parser)]
#[command(name = "ghbundle", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Additional configuration file layered over the defaults
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tree of eligible files
    Tree(RepoArgs),
    /// Fetch files and write the bundle without the interactive selector
    Bundle(BundleArgs),
    /// Pick files interactively and generate the bundle
    Select(RepoArgs),
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
struct RepoArgs {
    /// `owner/repo` or a github.com URL, optionally with `/tree/<branch>`
    #[arg(value_name = "REF")]
    reference: String,

    /// Branch to read; overrides the branch in the reference
    #[arg(short, long)]
    branch: Option<String>,
}

#[derive(Args)]
struct BundleArgs {
    #[command(flatten)]
    repo: RepoArgs,

    /// Only include eligible files matching this glob (repeatable)
    #[arg(long = "include", value_name = "GLOB")]
    include: Vec<String>,

    /// Write the bundle to this file instead of the configured output directory
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print the bundle to stdout
    #[arg(long)]
    stdout: bool,

    /// Copy the bundle to the clipboard
    #[arg(long)]
    copy: bool,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "ghbundle", &mut io::stdout());
        return Ok(());
    }

    if matches!(cli.command, Commands::Select(_)) {
        logging::init_file(cli.verbose)?;
    } else {
        logging::init_stderr(cli.verbose);
    }

    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");
    let runtime = Runtime::new().context("failed to start async runtime")?;

    match cli.command {
        Commands::Tree(args) => print_tree(&config, &runtime, &args),
        Commands::Bundle(args) => bundle(&config, &runtime, &args),
        Commands::Select(args) => select(config, &runtime, &args),
        Commands::Completions { .. } => Ok(()),
    }
}

/// `--branch` beats a branch in the reference, which beats the configured default.
fn resolve(config: &Config, args: &RepoArgs) -> Result<RepoInfo> {
    if args.branch.is_some() {
        return Ok(resolve_reference(&args.reference, args.branch.as_deref())?);
    }
    let fallback = config.defaults.branch().unwrap_or(DEFAULT_BRANCH);
    Ok(parse_reference_or(&args.reference, fallback)?)
}

fn load_session(config: &Config, runtime: &Runtime, args: &RepoArgs) -> Result<RepoSession> {
    let repo = resolve(config, args)?;
    let client = GitHubClient::new(&config.github)?;
    let policy = InclusionPolicy::from_config(config)?;
    let session = runtime.block_on(RepoSession::load(&client, repo, &policy))?;
    if session.truncated {
        eprintln!(
            "warning: GitHub truncated the listing for {}; some files are missing",
            session.repo
        );
    }
    Ok(session)
}

fn print_tree(config: &Config, runtime: &Runtime, args: &RepoArgs) -> Result<()> {
    let session = load_session(config, runtime, args)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", render_ascii(&session.repo.slug(), &session.roots))?;
    writeln!(
        stdout,
        "\n{} eligible files on {}",
        session.file_count(),
        session.repo.branch
    )?;
    Ok(())
}

fn bundle(config: &Config, runtime: &Runtime, args: &BundleArgs) -> Result<()> {
    let mut session = load_session(config, runtime, &args.repo)?;

    if args.include.is_empty() {
        session.selection.select_all(&session.entries);
    } else {
        let mut builder = GlobSetBuilder::new();
        for pattern in &args.include {
            builder.add(
                Glob::new(pattern).with_context(|| format!("invalid include glob '{pattern}'"))?,
            );
        }
        let includes = builder.build().context("failed to compile include globs")?;
        for entry in session.entries.iter().filter(|entry| entry.is_file()) {
            if includes.is_match(&entry.path) {
                session.selection.insert(entry.path.clone());
            }
        }
    }

    let client = Arc::new(GitHubClient::new(&config.github)?);
    let generator = BundleGenerator::new(client, Pacer::from_config(&config.fetch))?;
    let request = session.bundle_request();

    let bar = ProgressBar::new(request.selected_files().len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    bar.set_message(session.repo.to_string());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut report = |progress: Progress| {
        bar.set_length(progress.total as u64);
        bar.set_position(progress.completed as u64);
    };
    let result = runtime.block_on(generator.generate(&request, &mut report, &cancel));
    bar.finish_and_clear();
    let bundle = result?;

    if args.stdout {
        io::stdout()
            .lock()
            .write_all(bundle.text.as_bytes())
            .context("failed to write bundle to stdout")?;
    }

    let mut options = ExportOptions::from_config(config, &bundle);
    options.output_path = match (&args.output, args.stdout) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => None,
        (None, false) => options.output_path,
    };
    options.copy_to_clipboard |= args.copy;
    let exported = Exporter::new().export(&bundle, &options)?;

    eprintln!(
        "Bundled {} of {} files from {}",
        bundle.succeeded, bundle.attempted, bundle.repo
    );
    if let Some(path) = &exported.output_path {
        eprintln!("Wrote {}", path.display());
    }
    if let Some(backend) = &exported.copied_to {
        eprintln!("Copied to clipboard via {backend}");
    }

    let estimate = TokenEstimator::from_config(config).estimate(&bundle.text);
    eprintln!(
        "Tokens: {} / {} ({}, {:.0}% of budget)",
        estimate.tokens,
        estimate.budget,
        estimate.model,
        estimate.budget_percent()
    );
    if estimate.over_budget {
        eprintln!("warning: bundle exceeds the token budget");
    }
    for failure in &bundle.failures {
        eprintln!("failed: {} ({})", failure.path, failure.message);
    }
    Ok(())
}

fn select(config: Config, runtime: &Runtime, args: &RepoArgs) -> Result<()> {
    let repo = resolve(&config, args)?;
    let client = Arc::new(GitHubClient::new(&config.github)?);
    let store = SessionStore::default_location()?;
    let mut app = UiApp::new(config, repo, client, store, runtime.handle().clone())?;
    app.run()
}
