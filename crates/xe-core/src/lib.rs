//! Shared infrastructure for the Xenon JIT workspace
//!
//! Configuration, error types and logging used by the memory, PPU and
//! runner crates.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{JitError, MemoryError, Result, XenonError};
