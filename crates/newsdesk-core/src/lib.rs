//! Core domain + application logic for the newsdesk bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the git publish
//! sink live behind ports (traits) implemented in adapter crates.

pub mod article;
pub mod audit;
pub mod clock;
pub mod config;
pub mod conversation;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod media;
pub mod messaging;
pub mod publish;
pub mod security;
pub mod site;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
