//! Parsing of user supplied repository references.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::errors::DomainError;
use crate::domain::model::RepoInfo;

pub const DEFAULT_BRANCH: &str = "main";

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:www\.)?github\.com/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+?)(?:\.git)?(?:/tree/([^/?#]+))?(?:[/?#].*)?$",
    )
    .expect("valid repository URL pattern")
});

static SHORTHAND_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)$").expect("valid shorthand pattern")
});

/// Parse `https://github.com/owner/repo[/tree/branch]` or `owner/repo`.
///
/// The branch defaults to [`DEFAULT_BRANCH`] when the reference does not carry one.
pub fn parse_reference(input: &str) -> Result<RepoInfo, DomainError> {
    parse_reference_or(input, DEFAULT_BRANCH)
}

/// Like [`parse_reference`], with `fallback` used when the reference names no branch.
pub fn parse_reference_or(input: &str, fallback: &str) -> Result<RepoInfo, DomainError> {
    let trimmed = input.trim();

    if let Some(caps) = URL_PATTERN.captures(trimmed) {
        let branch = caps
            .get(3)
            .map(|m| m.as_str())
            .unwrap_or(fallback);
        return Ok(RepoInfo::new(&caps[1], &caps[2], branch));
    }

    if let Some(caps) = SHORTHAND_PATTERN.captures(trimmed) {
        return Ok(RepoInfo::new(&caps[1], &caps[2], fallback));
    }

    Err(DomainError::InvalidReference(input.to_string()))
}

/// Parse a reference and apply an explicit branch override when given.
pub fn resolve_reference(input: &str, branch: Option<&str>) -> Result<RepoInfo, DomainError> {
    let mut info = parse_reference(input)?;
    if let Some(branch) = branch.map(str::trim).filter(|b| !b.is_empty()) {
        info.branch = branch.to_string();
    }
    Ok(info)
}
