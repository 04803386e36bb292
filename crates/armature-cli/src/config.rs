//! CLI-side configuration: file settings merged with command-line overrides.

use anyhow::{Context, Result};
use armature_config::{ArmatureConfig, ConfigLoader};
use armature_core::BuildOptions;
use std::path::{Path, PathBuf};

/// Resolved configuration for one CLI invocation.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// File-backed settings.
    pub settings: ArmatureConfig,
}

impl CliConfig {
    /// Load configuration, applying CLI overrides.
    ///
    /// An explicit `--config` path must load; without one, the platform
    /// default locations are probed and missing files fall back to defaults.
    pub async fn load(
        config_path: Option<PathBuf>,
        ready_timeout_ms: Option<u64>,
    ) -> Result<Self> {
        let mut settings = match &config_path {
            Some(path) => ConfigLoader::load_from_file(path)
                .await
                .with_context(|| format!("failed to load config from '{}'", path.display()))?,
            None => ConfigLoader::load_default()
                .await
                .context("failed to load default configuration")?,
        };

        if let Some(ms) = ready_timeout_ms {
            settings.builder.ready_timeout_ms = Some(ms);
        }

        Ok(Self { settings })
    }

    /// Build options derived from the settings.
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            ready_timeout: self.settings.builder.ready_timeout(),
        }
    }

    /// Resolve a form file argument against the configured search paths.
    ///
    /// Existing or absolute paths are used as-is; bare names are probed
    /// under each `metadata.search_paths` entry.
    pub fn resolve_form_path(&self, input: &Path) -> PathBuf {
        if input.is_absolute() || input.exists() {
            return input.to_path_buf();
        }
        for dir in &self.settings.metadata.search_paths {
            let candidate = dir.join(input);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "form resolved via search path");
                return candidate;
            }
        }
        input.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cli_override_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[builder]\nready_timeout_ms = 9000\n").unwrap();

        let config = CliConfig::load(Some(path), Some(250)).await.unwrap();
        assert_eq!(config.settings.builder.ready_timeout_ms, Some(250));
        assert_eq!(
            config.build_options().ready_timeout,
            Some(std::time::Duration::from_millis(250))
        );
    }

    #[tokio::test]
    async fn test_resolve_form_path_probes_search_paths() {
        let dir = tempfile::tempdir().unwrap();
        let forms = dir.path().join("forms");
        std::fs::create_dir(&forms).unwrap();
        std::fs::write(forms.join("login.yaml"), "name: login\n").unwrap();

        let mut settings = ArmatureConfig::default();
        settings.metadata.search_paths.push(forms.clone());
        let config = CliConfig { settings };

        let resolved = config.resolve_form_path(Path::new("login.yaml"));
        assert_eq!(resolved, forms.join("login.yaml"));

        // Unknown names pass through unchanged.
        let missing = config.resolve_form_path(Path::new("missing.yaml"));
        assert_eq!(missing, PathBuf::from("missing.yaml"));
    }
}
