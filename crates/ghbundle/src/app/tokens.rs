//! Token estimation for generated bundles.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use serde::Serialize;
use tiktoken_rs::{CoreBPE, cl100k_base, o200k_base};

use crate::infra::config::Config;

/// Models the estimator knows how to count for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "String")]
pub enum TokenModel {
    OpenAiGpt4o,
    #[default]
    OpenAiGpt4oMini,
    AnthropicClaude3Haiku,
    AnthropicClaude35Sonnet,
    /// Character/word heuristic only.
    CharacterFallback,
}

impl TokenModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenModel::OpenAiGpt4o => "openai:gpt-4o",
            TokenModel::OpenAiGpt4oMini => "openai:gpt-4o-mini",
            TokenModel::AnthropicClaude3Haiku => "anthropic:claude-3-haiku",
            TokenModel::AnthropicClaude35Sonnet => "anthropic:claude-3.5-sonnet",
            TokenModel::CharacterFallback => "fallback:characters",
        }
    }

    fn is_anthropic(&self) -> bool {
        matches!(
            self,
            TokenModel::AnthropicClaude3Haiku | TokenModel::AnthropicClaude35Sonnet
        )
    }
}

impl fmt::Display for TokenModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TokenModel> for String {
    fn from(value: TokenModel) -> Self {
        value.as_str().to_owned()
    }
}

impl FromStr for TokenModel {
    type Err = TokenModelParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai:gpt-4o" | "gpt-4o" => Ok(TokenModel::OpenAiGpt4o),
            "openai:gpt-4o-mini" | "gpt-4o-mini" => Ok(TokenModel::OpenAiGpt4oMini),
            "anthropic:claude-3-haiku" => Ok(TokenModel::AnthropicClaude3Haiku),
            "anthropic:claude-3.5-sonnet" => Ok(TokenModel::AnthropicClaude35Sonnet),
            "fallback:characters" | "heuristic" | "fallback" => Ok(TokenModel::CharacterFallback),
            other => Err(TokenModelParseError::UnknownModel(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TokenModelParseError {
    #[error("unknown token model '{0}'")]
    UnknownModel(String),
}

/// Token count of one text compared against the configured budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenEstimate {
    pub model: TokenModel,
    pub tokens: usize,
    pub characters: usize,
    pub budget: u32,
    pub over_budget: bool,
}

impl TokenEstimate {
    /// Share of the budget used, as a percentage.
    pub fn budget_percent(&self) -> f64 {
        if self.budget == 0 {
            return 0.0;
        }
        self.tokens as f64 * 100.0 / self.budget as f64
    }
}

#[derive(Debug, Clone)]
pub struct TokenEstimator {
    model: TokenModel,
    budget: u32,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(TokenModel::default(), 120_000)
    }
}

impl TokenEstimator {
    pub fn new(model: TokenModel, budget: u32) -> Self {
        Self { model, budget }
    }

    /// Model and budget from `[defaults]`; unknown model names fall back to the default model.
    pub fn from_config(config: &Config) -> Self {
        let configured = config.defaults.model();
        let model = configured.parse().unwrap_or_else(|err| {
            tracing::warn!(%err, "using {}", TokenModel::default());
            TokenModel::default()
        });
        Self::new(model, config.defaults.token_budget())
    }

    pub fn model(&self) -> TokenModel {
        self.model
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub fn estimate(&self, text: &str) -> TokenEstimate {
        let tokens = count_tokens(self.model, text);
        TokenEstimate {
            model: self.model,
            tokens,
            characters: text.chars().count(),
            budget: self.budget,
            over_budget: tokens > self.budget as usize,
        }
    }
}

static O200K: Lazy<Option<Mutex<CoreBPE>>> = Lazy::new(|| match o200k_base() {
    Ok(bpe) => Some(Mutex::new(bpe)),
    Err(err) => {
        tracing::warn!(%err, "o200k tokenizer unavailable; using heuristic");
        None
    }
});

static CL100K: Lazy<Option<Mutex<CoreBPE>>> = Lazy::new(|| match cl100k_base() {
    Ok(bpe) => Some(Mutex::new(bpe)),
    Err(err) => {
        tracing::warn!(%err, "cl100k tokenizer unavailable; using heuristic");
        None
    }
});

fn count_tokens(model: TokenModel, text: &str) -> usize {
    if text.trim().is_empty() {
        return 0;
    }
    let tokenizer = match model {
        TokenModel::OpenAiGpt4o | TokenModel::OpenAiGpt4oMini => O200K.as_ref(),
        TokenModel::AnthropicClaude3Haiku | TokenModel::AnthropicClaude35Sonnet => {
            CL100K.as_ref()
        }
        TokenModel::CharacterFallback => None,
    };
    match tokenizer.and_then(|bpe| bpe.lock().ok()) {
        Some(bpe) => bpe.encode_ordinary(text).len(),
        None => heuristic_tokens(model, text),
    }
}

/// The larger of a characters-per-token and a one-token-per-word estimate.
fn heuristic_tokens(model: TokenModel, text: &str) -> usize {
    let chars_per_token = if model.is_anthropic() { 3.2 } else { 4.0 };
    let by_chars = (text.chars().count() as f64 / chars_per_token).ceil() as usize;
    let by_words = text.split_whitespace().count();
    by_chars.max(by_words).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_models_from_strings() {
        assert_eq!(
            TokenModel::from_str("OPENAI:GPT-4O-MINI").unwrap(),
            TokenModel::OpenAiGpt4oMini
        );
        assert_eq!(
            TokenModel::from_str("anthropic:claude-3-haiku").unwrap(),
            TokenModel::AnthropicClaude3Haiku
        );
        assert!(TokenModel::from_str("unknown").is_err());
    }

    #[test]
    fn counts_with_openai_tokenizer() {
        let estimate = TokenEstimator::new(TokenModel::OpenAiGpt4o, 2).estimate("Hello world!");
        assert_eq!(estimate.tokens, 3);
        assert_eq!(estimate.characters, 12);
        assert!(estimate.over_budget);
    }

    #[test]
    fn blank_text_has_no_tokens() {
        let estimate = TokenEstimator::default().estimate("  \n");
        assert_eq!(estimate.tokens, 0);
        assert!(!estimate.over_budget);
    }

    #[test]
    fn heuristic_uses_characters_and_words() {
        let estimate = TokenEstimator::new(TokenModel::CharacterFallback, 100)
            .estimate("Approximate counting is good enough.");
        // 36 characters / 4 beats 5 words.
        assert_eq!(estimate.tokens, 9);
        assert!((estimate.budget_percent() - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn estimator_respects_config_defaults() {
        let config: Config = toml::from_str(
            r#"
            [defaults]
            model = "anthropic:claude-3-haiku"
            token_budget = 42000
            "#,
        )
        .unwrap();
        let estimator = TokenEstimator::from_config(&config);
        assert_eq!(estimator.model(), TokenModel::AnthropicClaude3Haiku);
        assert_eq!(estimator.budget(), 42_000);
    }
}
