//! Arbor Common - Shared types and utilities
//!
//! This crate provides the materialized path type, tree node types, error
//! definitions, and configuration used across all Arbor components.

pub mod config;
pub mod error;
pub mod mpath;
pub mod types;

pub use config::{CacheConfig, Config, IndexConfig, LoggingConfig};
pub use error::{Error, Result};
pub use mpath::{MPath, MPathError};
pub use types::*;
