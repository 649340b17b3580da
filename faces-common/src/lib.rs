//! # Faces Common Library
//!
//! Shared code for the faces quiz player crates:
//! - Error types
//! - Configuration loading (root folder, TOML config, quiz credentials)
//! - Logging initialisation

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
