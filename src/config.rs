//! ORM configuration.
//!
//! [`OrmConfig::load`] reads the `[orm]` section of `config/keystone.toml`
//! (optional) and `KEYSTONE__ORM__*` environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config/keystone.toml";
const ENV_PREFIX: &str = "KEYSTONE";

/// SQL dialect statements are rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    #[serde(alias = "postgresql")]
    Postgres,
    Sqlite,
    #[serde(alias = "mariadb")]
    Mysql,
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            other => Err(format!("unsupported dialect: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrmConfig {
    #[serde(default)]
    pub dialect: Dialect,
    /// Reject scalar values whose type does not match the column
    #[serde(default = "default_strict_types")]
    pub strict_types: bool,
    /// Joins the relation name and the target key column in default FK column names
    #[serde(default = "default_fk_column_separator")]
    pub fk_column_separator: String,
    /// JSON file with entity descriptions, used by the CLI
    #[serde(default)]
    pub entities_file: Option<PathBuf>,
}

fn default_strict_types() -> bool {
    true
}

fn default_fk_column_separator() -> String {
    "_".to_string()
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            strict_types: default_strict_types(),
            fk_column_separator: default_fk_column_separator(),
            entities_file: None,
        }
    }
}

impl OrmConfig {
    /// Load from `config/keystone.toml`, falling back to env vars
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load from the given TOML file (optional) and the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let builder = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if path.exists() {
                    log::warn!(
                        "failed to load {}, falling back to env: {err}",
                        path.display()
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        match settings.get::<OrmConfig>("orm") {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "ORM configuration could not be loaded from file or environment: {e}"
            ))),
        }
    }
}
