//! Configuration schema.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the Armature toolchain.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmatureConfig {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Build pipeline settings.
    pub builder: BuilderConfig,
    /// Metadata discovery settings.
    pub metadata: MetadataConfig,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when the CLI does not override it
    /// (off, error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Build pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Deadline for the readiness phase, in milliseconds. Absent means wait
    /// indefinitely.
    pub ready_timeout_ms: Option<u64>,
    /// Maximum accepted group nesting depth.
    pub max_depth: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: None,
            max_depth: 8,
        }
    }
}

impl BuilderConfig {
    /// Readiness deadline as a [`Duration`].
    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_ms.map(Duration::from_millis)
    }
}

/// Metadata discovery settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Directories searched for form files given by bare name.
    pub search_paths: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ArmatureConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.builder.max_depth, 8);
        assert!(config.builder.ready_timeout().is_none());
        assert!(config.metadata.search_paths.is_empty());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: ArmatureConfig = toml::from_str(
            r#"
            [builder]
            ready_timeout_ms = 2500
            "#,
        )
        .unwrap();
        assert_eq!(config.builder.ready_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.builder.max_depth, 8);
        assert_eq!(config.logging.level, "info");
    }
}
