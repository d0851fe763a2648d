//! # Textgen Common
//!
//! Shared types, traits, and utilities for the textgen workspace.
//! Every crate reports errors through [`TextgenError`], validates its
//! configuration through [`ValidatedConfig`], and initialises logging
//! through [`logging::init_tracing`].

pub mod config;
pub mod error;
pub mod logging;

pub use config::ValidatedConfig;
pub use error::{ErrorCategory, TextgenError};
