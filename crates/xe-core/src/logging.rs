//! Logging setup and component log macros
//!
//! Everything logs through `tracing`. JIT and MMU messages use the `jit` and
//! `mmu` targets so they can be filtered with `RUST_LOG=jit=trace`.

use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, LogLevel};

/// Filter level for a configured verbosity, `None` when logging is off
pub fn filter_level(level: LogLevel) -> Option<Level> {
    match level {
        LogLevel::Off => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Trace => Some(Level::TRACE),
    }
}

/// Install the global subscriber described by `config`
///
/// Returns false when logging is disabled or a subscriber was already set.
pub fn init(config: &Config) -> bool {
    let Some(level) = filter_level(config.debug.log_level) else {
        return false;
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let console = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);
    let subscriber = tracing_subscriber::registry().with(filter).with(console);

    if !config.debug.log_to_file {
        return subscriber.try_init().is_ok();
    }

    match std::fs::File::create(&config.debug.log_path) {
        Ok(file) => {
            let file_layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false);
            subscriber.with(file_layer).try_init().is_ok()
        }
        Err(err) => {
            let installed = subscriber.try_init().is_ok();
            tracing::warn!(
                "Could not open log file {}: {}",
                config.debug.log_path.display(),
                err
            );
            installed
        }
    }
}

/// Initialize logging with default settings (for tests and quick starts)
pub fn init_default() {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}

// Convenience macros for component-specific logging

/// Log a JIT trace message
#[macro_export]
macro_rules! jit_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "jit", $($arg)*)
    };
}

/// Log a JIT debug message
#[macro_export]
macro_rules! jit_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "jit", $($arg)*)
    };
}

/// Log an MMU trace message
#[macro_export]
macro_rules! mmu_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "mmu", $($arg)*)
    };
}

/// Log an MMU debug message
#[macro_export]
macro_rules! mmu_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "mmu", $($arg)*)
    };
}
