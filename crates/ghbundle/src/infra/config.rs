//! Configuration management utilities.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dirs_next::config_dir;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".ghbundle/config.toml";

/// Layered configuration loaded from defaults, user, workspace, explicit file, and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub github: GitHub,
    #[serde(default)]
    pub fetch: Fetch,
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub export: Export,
    #[serde(default)]
    pub defaults: Defaults,
}

/// Connection settings for the GitHub REST API.
///
/// The token is carried here and handed to the client explicitly; nothing stores it
/// process-wide.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GitHub {
    #[serde(default)]
    api_url: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user_agent: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl std::fmt::Debug for GitHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHub")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl GitHub {
    pub fn api_url(&self) -> String {
        self.api_url
            .clone()
            .unwrap_or_else(|| "https://api.github.com".to_owned())
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.trim().is_empty())
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(|| {
            concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_owned()
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(30))
    }
}

/// Pacing of sequential content fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Fetch {
    #[serde(default)]
    delay_ms: Option<u64>,
    #[serde(default)]
    max_delay_ms: Option<u64>,
}

impl Fetch {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.unwrap_or(100))
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.unwrap_or(5_000)).max(self.delay())
    }
}

/// Extensions to the built-in inclusion policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Filter {
    #[serde(default)]
    extra_extensions: Vec<String>,
    #[serde(default)]
    extra_exclude: Vec<String>,
}

impl Filter {
    pub fn extra_extensions(&self) -> Vec<String> {
        self.extra_extensions.clone()
    }

    pub fn extra_exclude(&self) -> Vec<String> {
        self.extra_exclude.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Export {
    #[serde(default)]
    output_dir: Option<PathBuf>,
    #[serde(default)]
    copy_to_clipboard: Option<bool>,
}

impl Export {
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn copy_to_clipboard(&self) -> bool {
        self.copy_to_clipboard.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Defaults {
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    token_budget: Option<u32>,
}

impl Defaults {
    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| "openai:gpt-4o-mini".to_owned())
    }

    pub fn token_budget(&self) -> u32 {
        self.token_budget.unwrap_or(120_000)
    }
}

/// Environment overrides for critical settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    token: Option<String>,
    api_url: Option<String>,
    model: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            token: env::var("GHBUNDLE_GITHUB_TOKEN")
                .or_else(|_| env::var("GITHUB_TOKEN"))
                .ok(),
            api_url: env::var("GHBUNDLE_API_URL").ok(),
            model: env::var("GHBUNDLE_MODEL").ok(),
        }
    }

    #[cfg(test)]
    fn for_tests(token: &str, model: &str) -> Self {
        Self {
            token: Some(token.to_owned()),
            api_url: None,
            model: Some(model.to_owned()),
        }
    }
}

impl Config {
    /// Load configuration from defaults, user/global config, workspace config, an optional
    /// explicit file, and env overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = workspace_config_path()?;
        let explicit = match explicit {
            Some(path) if !path.exists() => {
                anyhow::bail!("config file not found: {}", path.display())
            }
            other => other.map(Path::to_path_buf),
        };
        Self::load_with_layers(global, workspace, explicit, env)
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        explicit: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG)?);

        for path in [global, workspace, explicit].into_iter().flatten() {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading config layer");
                layers.push(Self::from_file(&path)?);
            }
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        Ok(apply_env_overrides(merged, env_overrides))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            github: merge_github(self.github, other.github),
            fetch: merge_fetch(self.fetch, other.fetch),
            filter: merge_filter(self.filter, other.filter),
            export: merge_export(self.export, other.export),
            defaults: merge_defaults(self.defaults, other.defaults),
        }
    }
}

fn merge_github(base: GitHub, overlay: GitHub) -> GitHub {
    GitHub {
        api_url: overlay.api_url.or(base.api_url),
        token: overlay.token.or(base.token),
        user_agent: overlay.user_agent.or(base.user_agent),
        timeout_secs: overlay.timeout_secs.or(base.timeout_secs),
    }
}

fn merge_fetch(base: Fetch, overlay: Fetch) -> Fetch {
    Fetch {
        delay_ms: overlay.delay_ms.or(base.delay_ms),
        max_delay_ms: overlay.max_delay_ms.or(base.max_delay_ms),
    }
}

fn merge_filter(mut base: Filter, overlay: Filter) -> Filter {
    for ext in overlay.extra_extensions {
        if !base.extra_extensions.contains(&ext) {
            base.extra_extensions.push(ext);
        }
    }
    for glob in overlay.extra_exclude {
        if !base.extra_exclude.contains(&glob) {
            base.extra_exclude.push(glob);
        }
    }
    base
}

fn merge_export(base: Export, overlay: Export) -> Export {
    Export {
        output_dir: overlay.output_dir.or(base.output_dir),
        copy_to_clipboard: overlay.copy_to_clipboard.or(base.copy_to_clipboard),
    }
}

fn merge_defaults(base: Defaults, overlay: Defaults) -> Defaults {
    Defaults {
        branch: overlay.branch.or(base.branch),
        model: overlay.model.or(base.model),
        token_budget: overlay.token_budget.or(base.token_budget),
    }
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("ghbundle/config.toml"))
}

fn workspace_config_path() -> Result<Option<PathBuf>> {
    let cwd = env::current_dir()?;
    Ok(Some(cwd.join(DEFAULT_WORKSPACE_CONFIG_PATH)))
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Config {
    if let Some(token) = env.token {
        config.github.token = Some(token);
    }
    if let Some(api_url) = env.api_url {
        config.github.api_url = Some(api_url);
    }
    if let Some(model) = env.model {
        config.defaults.model = Some(model);
    }
    config
}
