//! Tool configuration
//!
//! Values come from an optional TOML file; command-line flags override them.
//!
//! ```toml
//! log_level = "debug"
//!
//! [index]
//! cache_blocks = 1024
//! sync_on_commit = true
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::Level;

use bindex_engine::IndexOptions;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Options for every index the tool opens
    pub index: IndexOptions,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "warn".to_string(),
            index: IndexOptions::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or the defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::parse(&content).with_context(|| format!("parsing config {}", path.display()))
            }
            None => Ok(Config::default()),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, log_level: Option<String>, cache_blocks: Option<usize>) -> Self {
        if let Some(level) = log_level {
            self.log_level = level;
        }
        if let Some(blocks) = cache_blocks {
            self.index.cache_blocks = blocks;
        }
        self
    }

    /// Tracing level for the configured name, defaulting to WARN
    pub fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        }
    }
}
