//! Copying finished bundles to the system clipboard.

use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};

/// Where a copy ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardBackend {
    Native,
    Command(String),
}

impl fmt::Display for ClipboardBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipboardBackend::Native => f.write_str("system clipboard"),
            ClipboardBackend::Command(program) => write!(f, "{program}"),
        }
    }
}

/// System clipboard with shell utility fallbacks for headless sessions.
pub struct Clipboard {
    native: Option<arboard::Clipboard>,
    fallbacks: &'static [&'static [&'static str]],
}

impl Clipboard {
    pub fn new() -> Self {
        let native = match arboard::Clipboard::new() {
            Ok(clipboard) => Some(clipboard),
            Err(err) => {
                tracing::debug!(%err, "native clipboard unavailable");
                None
            }
        };
        Self {
            native,
            fallbacks: fallback_commands(),
        }
    }

    /// Copy a bundle, trying the native clipboard first.
    pub fn copy(&mut self, text: &str) -> Result<ClipboardBackend> {
        if let Some(native) = self.native.as_mut() {
            match native.set_text(text.to_owned()) {
                Ok(()) => return Ok(ClipboardBackend::Native),
                Err(err) => {
                    tracing::debug!(%err, "native clipboard rejected text");
                    self.native = None;
                }
            }
        }

        for command in self.fallbacks {
            match pipe_to_command(command, text) {
                Ok(()) => return Ok(ClipboardBackend::Command(command[0].to_owned())),
                Err(err) => tracing::debug!(error = %err, "clipboard fallback failed"),
            }
        }

        bail!("no clipboard backend accepted the bundle")
    }
}

impl Default for Clipboard {
    fn default() -> Self {
        Self::new()
    }
}

fn pipe_to_command(command: &[&str], text: &str) -> Result<()> {
    let (program, args) = command
        .split_first()
        .context("clipboard command missing program")?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(text.as_bytes())
            .with_context(|| format!("failed to write to {program}"))?;
    }

    let status = child
        .wait()
        .with_context(|| format!("{program} did not exit cleanly"))?;
    if !status.success() {
        bail!("{program} exited with {status}");
    }
    Ok(())
}

#[cfg(target_os = "macos")]
fn fallback_commands() -> &'static [&'static [&'static str]] {
    &[&["pbcopy"]]
}

#[cfg(all(unix, not(target_os = "macos")))]
fn fallback_commands() -> &'static [&'static [&'static str]] {
    &[
        &["wl-copy"],
        &["xclip", "-selection", "clipboard"],
        &["xsel", "--clipboard", "--input"],
    ]
}

#[cfg(target_os = "windows")]
fn fallback_commands() -> &'static [&'static [&'static str]] {
    &[&["clip.exe"]]
}

#[cfg(not(any(unix, target_os = "windows")))]
fn fallback_commands() -> &'static [&'static [&'static str]] {
    &[]
}
