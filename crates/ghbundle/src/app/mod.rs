//! Application layer orchestrating domain logic and infrastructure.

pub mod bundle;
pub mod export;
pub mod filter;
pub mod language;
pub mod reference;
pub mod remote;
pub mod selection;
pub mod session;
pub mod tokens;
pub mod tree;
