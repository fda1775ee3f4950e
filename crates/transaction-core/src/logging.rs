//! Subscriber setup for binaries and tests.
//!
//! The library itself only emits `tracing` events; nothing here runs unless
//! the embedding application calls [`init_logging`].

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Whether to include the event target
    pub with_target: bool,
    /// Whether to include thread IDs
    pub with_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
            with_thread_ids: false,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Filter for this config; `RUST_LOG` wins when set.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Installs a global `fmt` subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .with_ansi(config.ansi)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to install tracing subscriber: {}", e)))
}
