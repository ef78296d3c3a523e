use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for the phase sequencer
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SequencerConfig {
    /// Where phase definitions are kept
    pub storage: StorageConfig,
    /// Database settings (sqlite backend only)
    pub database: Option<DatabaseConfig>,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local; nothing survives exit
    Memory,
    /// JSON document on disk
    File,
    /// SQLite database (requires the `database` feature)
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Phase table path for the file backend
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON log lines instead of compact text
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            json_logs: false,
        }
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::File,
                path: PathBuf::from(".bmr-sequencer/phases.json"),
            },
            database: Some(DatabaseConfig {
                url: "sqlite://.bmr-sequencer/phases.db".to_string(),
                max_connections: 5,
                auto_migrate: true,
            }),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl SequencerConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (bmr-sequencer.toml, or `path` when given)
    /// 3. Environment variables (BMR_SEQUENCER_STORAGE__PATH and friends)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path));
            }
            None => {
                if Path::new("bmr-sequencer.toml").exists() {
                    builder = builder.add_source(File::with_name("bmr-sequencer"));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("BMR_SEQUENCER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<SequencerConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = SequencerConfig::load_env_file();
        SequencerConfig::load(None)
    });

/// Get the global configuration
pub fn config() -> Result<&'static SequencerConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_use_file_backend() {
        let config = SequencerConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.observability.log_level, "warn");
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[storage]\nbackend = \"memory\"\npath = \"elsewhere.json\"\n",
        )
        .unwrap();

        let config = SequencerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.path, PathBuf::from("elsewhere.json"));
        assert_eq!(config.observability.log_level, "warn");
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("saved.toml");
        let mut config = SequencerConfig::default();
        config.observability.json_logs = true;
        config.save_to_file(&path).unwrap();

        let reloaded = SequencerConfig::load(Some(&path)).unwrap();
        assert!(reloaded.observability.json_logs);
    }
}
