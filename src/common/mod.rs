//! Common types and utilities shared across seqsetdb.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`TreeConfig`]
//! - Error types
//! - Block identifiers ([`Rbn`])

pub mod config;
pub mod error;
mod rbn;

pub use config::{BlockLayout, TreeConfig};
pub use error::{Error, Result};
pub use rbn::Rbn;
