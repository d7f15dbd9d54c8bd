//! Configuration loading.
//!
//! Settings come from `config/config.toml` (optional) overlaid by
//! `ROWKEEPER__SECTION__KEY` environment variables, e.g.
//! `ROWKEEPER__MODEL__BUFFERING=false`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "ROWKEEPER";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct RowkeeperConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub operations: OperationConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// `sqlite::memory:` or `sqlite://path/to/file.db`
    #[serde(default = "default_db_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct ModelConfig {
    /// Defer model writes until an id is needed or the model is dropped
    #[serde(default = "default_buffering")]
    pub buffering: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            buffering: default_buffering(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
pub struct OperationConfig {
    /// Fail with `NotRevertible` instead of silently dropping `can_revert`
    #[serde(default)]
    pub strict_revert: bool,
}

fn default_db_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_buffering() -> bool {
    true
}

impl RowkeeperConfig {
    /// Load the configuration from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!(
                        "failed to load {}, falling back to env: {}",
                        CONFIG_FILE,
                        err
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        settings.try_deserialize::<RowkeeperConfig>()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize::<RowkeeperConfig>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RowkeeperConfig::default();
        assert_eq!(cfg.database.url, "sqlite::memory:");
        assert!(cfg.model.buffering);
        assert!(!cfg.operations.strict_revert);
    }

    #[test]
    fn test_from_toml_partial() {
        let cfg = RowkeeperConfig::from_toml(
            r#"
            [model]
            buffering = false

            [operations]
            strict_revert = true
            "#,
        )
        .expect("parse");
        assert!(!cfg.model.buffering);
        assert!(cfg.operations.strict_revert);
        assert_eq!(cfg.database.url, "sqlite::memory:");
    }
}
