//! # Armature configuration
//!
//! Type-safe configuration loading for the Armature toolchain: TOML and YAML
//! documents, partial files filled with defaults, platform config-directory
//! discovery.
//!
//! ```rust,no_run
//! use armature_config::ConfigLoader;
//!
//! # async fn load() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load_default().await?;
//! println!("log level: {}", config.logging.level);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod loader;
mod settings;

pub use loader::{ConfigError, ConfigLoader};
pub use settings::{ArmatureConfig, BuilderConfig, LoggingConfig, MetadataConfig};
