//! # Biobooth Common Library
//!
//! Shared code for the biobooth exhibit engine:
//! - Error types
//! - Configuration loading and session timing presets
//! - Stable wire payload contracts for the visualization channels

pub mod config;
pub mod error;
pub mod payload;

pub use error::{Error, Result};
