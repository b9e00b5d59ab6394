use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(author, version, about = "Project automation commands", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the test suite with cargo nextest, falling back to cargo test
    Test {
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        release: bool,
    },
    /// Check formatting and run clippy with warnings denied
    Lint,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Test { profile, release } => run_tests(profile, release)?,
        Commands::Lint => run_lint()?,
    }
    Ok(())
}

fn nextest_available() -> bool {
    Command::new("cargo")
        .args(["nextest", "--version"])
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn run_tests(profile: Option<String>, release: bool) -> Result<()> {
    let mut cmd = Command::new("cargo");
    if nextest_available() {
        cmd.args(["nextest", "run", "--workspace"]);
        if let Some(profile) = profile {
            cmd.arg("--profile").arg(profile);
        }
    } else {
        eprintln!("cargo-nextest not found, using cargo test");
        cmd.args(["test", "--workspace"]);
    }
    if release {
        cmd.arg("--release");
    }
    run(cmd, "tests")
}

fn run_lint() -> Result<()> {
    let mut fmt = Command::new("cargo");
    fmt.args(["fmt", "--all", "--", "--check"]);
    run(fmt, "cargo fmt")?;

    let mut clippy = Command::new("cargo");
    clippy.args(["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"]);
    run(clippy, "cargo clippy")
}

fn run(mut cmd: Command, what: &str) -> Result<()> {
    let status = cmd.status()?;
    if !status.success() {
        anyhow::bail!("{what} failed");
    }
    Ok(())
}
