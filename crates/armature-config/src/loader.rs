//! Configuration file loading.

use crate::settings::ArmatureConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read config file '{path}'")]
    Io {
        /// The offending path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Document was not valid TOML.
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Document was not valid YAML.
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File extension is not a supported config format.
    #[error("unsupported config format '{extension}' (expected toml, yaml or yml)")]
    UnsupportedFormat {
        /// The rejected extension.
        extension: String,
    },
}

/// Loads [`ArmatureConfig`] documents from disk.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from an explicit file, dispatching on extension.
    pub async fn load_from_file(path: &Path) -> Result<ArmatureConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;

        let config = match extension.as_str() {
            "toml" => toml::from_str(&content)?,
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            other => {
                return Err(ConfigError::UnsupportedFormat {
                    extension: other.to_string(),
                })
            }
        };

        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load from the platform config directory, falling back to defaults
    /// when no config file exists.
    ///
    /// Probes `<config_dir>/armature/config.toml`, then `config.yaml`.
    pub async fn load_default() -> Result<ArmatureConfig, ConfigError> {
        for path in Self::default_paths() {
            if path.exists() {
                return Self::load_from_file(&path).await;
            }
        }
        tracing::debug!("no config file found, using defaults");
        Ok(ArmatureConfig::default())
    }

    /// Candidate default config paths, in probe order.
    pub fn default_paths() -> Vec<PathBuf> {
        let Some(base) = dirs::config_dir() else {
            return Vec::new();
        };
        let dir = base.join("armature");
        vec![dir.join("config.toml"), dir.join("config.yaml")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [logging]
            level = "debug"

            [builder]
            ready_timeout_ms = 1000
            "#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).await.unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.builder.ready_timeout_ms, Some(1000));
    }

    #[tokio::test]
    async fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
logging:
  level: warn
metadata:
  search_paths:
    - /srv/forms
"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).await.unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.metadata.search_paths.len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "x").unwrap();

        let err = ConfigLoader::load_from_file(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = ConfigLoader::load_from_file(Path::new("/nope/config.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
