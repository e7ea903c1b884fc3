//! Installer configuration
//!
//! Read from a TOML file, from `FFIBIND_*` environment variables, or left at
//! defaults:
//!
//! ```toml
//! arena_size = 8192
//! log_level = "debug"
//!
//! [libraries]
//! LibM = "/opt/musl/lib/libm.so"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::interop::DEFAULT_FRAME_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindConfig {
    /// Arena bytes for calls that copy strings into their frame
    #[serde(default = "default_arena_size")]
    pub arena_size: usize,

    #[serde(default)]
    pub log_level: Option<String>,

    /// Header name to library filename, taking precedence over the
    /// header's own platform table
    #[serde(default)]
    pub libraries: HashMap<String, String>,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            arena_size: DEFAULT_FRAME_SIZE,
            log_level: None,
            libraries: HashMap::new(),
        }
    }
}

fn default_arena_size() -> usize {
    DEFAULT_FRAME_SIZE
}

impl BindConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Configuration from the environment
    ///
    /// `FFIBIND_CONFIG` names a TOML file to start from; `FFIBIND_ARENA_SIZE`
    /// and `FFIBIND_LOG_LEVEL` override individual keys.
    pub fn from_env() -> Result<Self, String> {
        let mut config = match std::env::var("FFIBIND_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Ok(size) = std::env::var("FFIBIND_ARENA_SIZE") {
            config.arena_size = size
                .trim()
                .parse()
                .map_err(|e| format!("Invalid FFIBIND_ARENA_SIZE {:?}: {}", size, e))?;
        }

        if let Ok(level) = std::env::var("FFIBIND_LOG_LEVEL") {
            config.log_level = Some(level);
        }

        Ok(config)
    }

    pub fn with_arena_size(mut self, bytes: usize) -> Self {
        self.arena_size = bytes;
        self
    }

    /// Route a header to a specific library file
    pub fn with_library(mut self, header: impl Into<String>, filename: impl Into<String>) -> Self {
        self.libraries.insert(header.into(), filename.into());
        self
    }

    /// Configured filename for a header, if any
    pub fn library_for(&self, header: &str) -> Option<&str> {
        self.libraries.get(header).map(String::as_str).filter(|f| !f.is_empty())
    }

    /// Logging configuration derived from this config and the environment
    pub fn log_config(&self) -> crate::logging::LogConfig {
        let mut log = crate::logging::LogConfig::from_env();
        if let Some(level) = self.log_level.as_deref().and_then(crate::logging::parse_level) {
            log.level = level;
        }
        log
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BindConfig::default();
        assert_eq!(config.arena_size, 4096);
        assert!(config.libraries.is_empty());
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
arena_size = 512
log_level = "debug"

[libraries]
LibM = "libm.so.6"
Empty = ""
"#;

        let config = BindConfig::parse(toml).unwrap();
        assert_eq!(config.arena_size, 512);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.library_for("LibM"), Some("libm.so.6"));
        assert_eq!(config.library_for("Empty"), None);
        assert_eq!(config.library_for("LibC"), None);
    }

    #[test]
    fn test_parse_partial_config() {
        let config = BindConfig::parse("log_level = \"warn\"").unwrap();
        assert_eq!(config.arena_size, DEFAULT_FRAME_SIZE);
        assert_eq!(config.log_config().level, tracing::Level::WARN);
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        let err = BindConfig::parse("arena_size = \"big\"").unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffibind.toml");

        let config = BindConfig::default().with_arena_size(1024).with_library("LibC", "libc.so.6");
        config.save(&path).unwrap();

        let loaded = BindConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_generate_default_parses() {
        let text = BindConfig::generate_default();
        assert_eq!(BindConfig::parse(&text).unwrap(), BindConfig::default());
    }
}
