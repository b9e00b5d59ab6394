//! Inclusion policy deciding which listing entries are offered for selection.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::domain::model::FileEntry;
use crate::infra::config::Config;

/// Extensions treated as readable text.
const TEXT_EXTENSIONS: &[&str] = &[
    "astro", "bash", "bat", "c", "cc", "cfg", "clj", "cljs", "cmake", "conf", "cpp", "cs", "css",
    "csv", "cxx", "dart", "elm", "erl", "ex", "exs", "fish", "fs", "go", "gradle", "graphql",
    "groovy", "h", "hcl", "hh", "hpp", "hrl", "hs", "html", "ini", "ipynb", "java", "jl", "js",
    "json", "jsx", "kt", "kts", "less", "lua", "m", "md", "mdx", "mjs", "cjs", "ml", "mli", "nim",
    "nix", "php", "pl", "pm", "proto", "ps1", "py", "pyi", "r", "rb", "rs", "rst", "sass", "scala",
    "scss", "sh", "sol", "sql", "svelte", "swift", "tex", "tf", "toml", "ts", "tsx", "txt", "vim",
    "vue", "xml", "yaml", "yml", "zig", "zsh",
];

/// Extensionless or dot-file names treated as readable text.
const TEXT_BASENAMES: &[&str] = &[
    ".dockerignore",
    ".editorconfig",
    ".env.example",
    ".gitattributes",
    ".gitignore",
    ".prettierrc",
    "Brewfile",
    "CODEOWNERS",
    "Dockerfile",
    "Gemfile",
    "Justfile",
    "LICENSE",
    "Makefile",
    "Procfile",
    "Rakefile",
    "README",
    "Vagrantfile",
];

/// Dependency, build output, VCS metadata, lockfile, and log patterns.
const EXCLUDE_PATTERNS: &[&str] = &[
    "**/node_modules/**",
    "**/bower_components/**",
    "**/vendor/**",
    "**/.git/**",
    "**/.svn/**",
    "**/.hg/**",
    "**/dist/**",
    "**/build/**",
    "**/out/**",
    "**/target/**",
    "**/.next/**",
    "**/.nuxt/**",
    "**/coverage/**",
    "**/__pycache__/**",
    "**/.venv/**",
    "**/venv/**",
    "**/.tox/**",
    "**/.idea/**",
    "**/.vscode/**",
    "**/*.lock",
    "**/package-lock.json",
    "**/pnpm-lock.yaml",
    "**/npm-shrinkwrap.json",
    "**/go.sum",
    "**/*.log",
    "**/*.min.js",
    "**/*.min.css",
    "**/*.map",
];

/// Static allow-list/deny-list policy, optionally extended from configuration.
#[derive(Debug, Clone)]
pub struct InclusionPolicy {
    extensions: BTreeSet<String>,
    basenames: BTreeSet<String>,
    excludes: GlobSet,
}

impl InclusionPolicy {
    /// Policy built from the fixed lists only.
    pub fn builtin() -> Result<Self> {
        Self::with_extras(&[], &[])
    }

    /// Policy built from the fixed lists plus `[filter]` configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_extras(
            &config.filter.extra_extensions(),
            &config.filter.extra_exclude(),
        )
    }

    fn with_extras(extra_extensions: &[String], extra_exclude: &[String]) -> Result<Self> {
        let mut extensions: BTreeSet<String> =
            TEXT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect();
        extensions.extend(
            extra_extensions
                .iter()
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty()),
        );

        let basenames = TEXT_BASENAMES.iter().map(|name| name.to_string()).collect();

        let mut builder = GlobSetBuilder::new();
        for pattern in EXCLUDE_PATTERNS
            .iter()
            .copied()
            .chain(extra_exclude.iter().map(String::as_str))
        {
            let glob =
                Glob::new(pattern).with_context(|| format!("invalid exclude glob '{pattern}'"))?;
            builder.add(glob);
        }
        let excludes = builder
            .build()
            .context("failed to compile exclude patterns")?;

        Ok(Self {
            extensions,
            basenames,
            excludes,
        })
    }

    /// Whether a file path is offered for selection.
    pub fn is_eligible(&self, path: &str) -> bool {
        !self.is_excluded(path) && self.is_text_like(path)
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.excludes.is_match(path)
    }

    fn is_text_like(&self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);
        if self.basenames.contains(name) {
            return true;
        }
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                self.extensions.contains(&ext.to_ascii_lowercase())
            }
            _ => false,
        }
    }

    /// Keep the eligible file entries, preserving order. Directory entries are dropped;
    /// the tree builder synthesizes the directories that still contain eligible files.
    pub fn apply(&self, entries: Vec<FileEntry>) -> Vec<FileEntry> {
        let before = entries.len();
        let kept: Vec<FileEntry> = entries
            .into_iter()
            .filter(|entry| entry.is_file() && self.is_eligible(&entry.path))
            .collect();
        tracing::debug!(before, kept = kept.len(), "applied inclusion policy");
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_text_sources_and_known_basenames() {
        let policy = InclusionPolicy::builtin().unwrap();
        assert!(policy.is_eligible("src/main.rs"));
        assert!(policy.is_eligible("README.md"));
        assert!(policy.is_eligible("docker/Dockerfile"));
        assert!(policy.is_eligible("web/App.TSX"));
        assert!(policy.is_eligible(".gitignore"));
    }

    #[test]
    fn rejects_binary_and_unknown_files() {
        let policy = InclusionPolicy::builtin().unwrap();
        assert!(!policy.is_eligible("assets/logo.png"));
        assert!(!policy.is_eligible("bin/tool"));
        assert!(!policy.is_eligible(".env"));
    }

    #[test]
    fn rejects_denied_locations_and_lockfiles() {
        let policy = InclusionPolicy::builtin().unwrap();
        assert!(!policy.is_eligible("node_modules/react/index.js"));
        assert!(!policy.is_eligible("web/node_modules/react/index.js"));
        assert!(!policy.is_eligible("dist/app.js"));
        assert!(!policy.is_eligible("target/debug/build.rs"));
        assert!(!policy.is_eligible(".git/config"));
        assert!(!policy.is_eligible("Cargo.lock"));
        assert!(!policy.is_eligible("web/package-lock.json"));
        assert!(!policy.is_eligible("logs/server.log"));
    }

    #[test]
    fn config_extends_both_lists() {
        let config: Config = toml::from_str(
            r#"
            [filter]
            extra_extensions = [".prisma"]
            extra_exclude = ["docs/**"]
            "#,
        )
        .unwrap();
        let policy = InclusionPolicy::from_config(&config).unwrap();
        assert!(policy.is_eligible("db/schema.prisma"));
        assert!(!policy.is_eligible("docs/guide.md"));
        assert!(policy.is_eligible("src/guide.md"));
    }

    #[test]
    fn apply_keeps_order_and_drops_directories() {
        let policy = InclusionPolicy::builtin().unwrap();
        let kept = policy.apply(vec![
            FileEntry::file("src/b.rs"),
            FileEntry::dir("src"),
            FileEntry::file("logo.png"),
            FileEntry::file("src/a.rs"),
        ]);
        let paths: Vec<&str> = kept.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["src/b.rs", "src/a.rs"]);
    }

    #[test]
    fn invalid_extra_glob_is_reported() {
        let result = InclusionPolicy::with_extras(&[], &["src/[".to_string()]);
        assert!(result.is_err());
    }
}
