//! `jser-dump` configuration file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use jser_stream::StreamOptions;

/// Top-level TOML document; every table is optional.
///
/// ```toml
/// [stream]
/// max_depth = 64
/// max_string_len = 1048576
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    pub stream: StreamOptions,
}

impl DumpConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }
}
