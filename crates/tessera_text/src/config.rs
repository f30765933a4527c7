//! Font system configuration (`tessera.toml`)
//!
//! ```toml
//! worker_threads = 4
//!
//! [atlas]
//! extent = 1024
//! glyph_padding = 1
//!
//! [layout]
//! default_language = "en"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to start worker pool: {0}")]
    Runtime(std::io::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FontSystemConfig {
    #[serde(default)]
    pub atlas: AtlasConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    /// Worker pool size, 0 for one per core
    #[serde(default)]
    pub worker_threads: usize,
}

/// Glyph atlas settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct AtlasConfig {
    /// Side of each square atlas layer in pixels, a multiple of 64.
    /// Grown when a single glyph would not fit.
    #[serde(default = "default_extent")]
    pub extent: u32,
    /// Empty pixels around each glyph
    #[serde(default = "default_glyph_padding")]
    pub glyph_padding: u32,
}

fn default_extent() -> u32 {
    512
}

fn default_glyph_padding() -> u32 {
    1
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            extent: default_extent(),
            glyph_padding: default_glyph_padding(),
        }
    }
}

/// Layout defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LayoutConfig {
    /// BCP-47 language used when a text block doesn't name one
    #[serde(default)]
    pub default_language: Option<String>,
}

impl FontSystemConfig {
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: FontSystemConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.atlas.extent == 0 || self.atlas.extent % 64 != 0 {
            return Err(ConfigError::Invalid(format!(
                "atlas.extent must be a non-zero multiple of 64, got {}",
                self.atlas.extent
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FontSystemConfig::from_toml("").unwrap();
        assert_eq!(config.atlas.extent, 512);
        assert_eq!(config.atlas.glyph_padding, 1);
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.layout.default_language, None);
        assert_eq!(config, FontSystemConfig::default());
    }

    #[test]
    fn test_parse() {
        let config = FontSystemConfig::from_toml(
            r#"
            worker_threads = 2

            [atlas]
            extent = 1024

            [layout]
            default_language = "ar"
            "#,
        )
        .unwrap();

        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.atlas.extent, 1024);
        assert_eq!(config.atlas.glyph_padding, 1);
        assert_eq!(config.layout.default_language.as_deref(), Some("ar"));
    }

    #[test]
    fn test_invalid_extent() {
        let result = FontSystemConfig::from_toml("[atlas]\nextent = 100\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = FontSystemConfig::from_toml("[atlas]\nextent = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_parse_error() {
        let result = FontSystemConfig::from_toml("worker_threads = \"many\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
