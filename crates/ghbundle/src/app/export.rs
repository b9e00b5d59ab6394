//! Writing finished bundles to disk and the clipboard.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::domain::model::Bundle;
use crate::infra::clipboard::{Clipboard, ClipboardBackend};
use crate::infra::config::Config;

/// Destinations for a finished bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportOptions {
    pub output_path: Option<PathBuf>,
    pub copy_to_clipboard: bool,
}

impl ExportOptions {
    /// Write `{owner}_{repo}_{branch}.txt` into the configured output directory.
    pub fn from_config(config: &Config, bundle: &Bundle) -> Self {
        Self {
            output_path: Some(
                config
                    .export
                    .output_dir()
                    .join(bundle.repo.bundle_file_name()),
            ),
            copy_to_clipboard: config.export.copy_to_clipboard(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportResult {
    pub output_path: Option<PathBuf>,
    pub copied_to: Option<ClipboardBackend>,
}

/// Persists bundles; the clipboard is opened on first use.
#[derive(Default)]
pub struct Exporter {
    clipboard: Option<Clipboard>,
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn export(&mut self, bundle: &Bundle, options: &ExportOptions) -> Result<ExportResult> {
        let mut result = ExportResult::default();

        if let Some(path) = &options.output_path {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create output directory {}", parent.display())
                })?;
            }
            fs::write(path, &bundle.text)
                .with_context(|| format!("failed to write bundle to {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = bundle.text.len(), "wrote bundle");
            result.output_path = Some(path.clone());
        }

        if options.copy_to_clipboard {
            let backend = self
                .clipboard
                .get_or_insert_with(Clipboard::new)
                .copy(&bundle.text)
                .context("failed to copy bundle to clipboard")?;
            result.copied_to = Some(backend);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::domain::model::RepoInfo;

    fn bundle() -> Bundle {
        Bundle {
            text: "# Repository: acme/widgets\n".into(),
            repo: RepoInfo::new("acme", "widgets", "release/1.0"),
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
        }
    }

    #[test]
    fn options_follow_export_config() {
        let config: Config = toml::from_str(
            r#"
            [export]
            output_dir = "out/bundles"
            copy_to_clipboard = true
            "#,
        )
        .unwrap();
        let options = ExportOptions::from_config(&config, &bundle());
        assert_eq!(
            options.output_path,
            Some(PathBuf::from("out/bundles/acme_widgets_release-1.0.txt"))
        );
        assert!(options.copy_to_clipboard);
    }

    #[test]
    fn writes_bundle_creating_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/out.txt");
        let result = Exporter::new()
            .export(
                &bundle(),
                &ExportOptions {
                    output_path: Some(path.clone()),
                    copy_to_clipboard: false,
                },
            )
            .unwrap();
        assert_eq!(result.output_path, Some(path.clone()));
        assert!(result.copied_to.is_none());
        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "# Repository: acme/widgets\n"
        );
    }
}
