//! Adapters for the outside world: GitHub, config files, logs and the clipboard.

pub mod clipboard;
pub mod config;
pub mod github;
pub mod logging;
