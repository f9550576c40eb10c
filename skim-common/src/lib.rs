//! # Skim Common Library
//!
//! Shared code for the Skim player:
//! - Numeric/analysis utilities (range extraction, interval partitioning,
//!   window kernels)
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod math;

pub use config::PlayerConfig;
pub use error::{Error, Result};
