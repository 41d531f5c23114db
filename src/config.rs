use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

const ENV_PREFIX: &str = "ALERTING_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertingConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub log_dir: String,
    pub log_filter: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialAlertingConfig {
    database_url: Option<String>,
    max_connections: Option<u32>,
    log_dir: Option<String>,
    log_filter: Option<String>,
}

fn default_max_connections() -> u32 {
    5
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_filter() -> String {
    "info,sqlx::query=warn".to_string()
}

impl AlertingConfig {
    /// Loads `.env`, then the optional TOML file, then `ALERTING_*` variables.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::load_with_env(config_path, std::env::vars())
    }

    /// Same layering as [`AlertingConfig::load`], reading variables from `vars`
    /// instead of the process environment.
    pub fn load_with_env<I>(config_path: Option<&str>, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        // 1. Load from file (optional)
        let file_config = match config_path {
            Some(path_str) if Path::new(path_str).exists() => {
                let contents = fs::read_to_string(path_str).map_err(|source| ConfigError::Read {
                    path: path_str.to_string(),
                    source,
                })?;
                toml::from_str::<PartialAlertingConfig>(&contents).map_err(|source| {
                    ConfigError::Parse {
                        path: path_str.to_string(),
                        source,
                    }
                })?
            }
            _ => PartialAlertingConfig::default(),
        };

        // 2. Load from environment variables
        let env_config: PartialAlertingConfig =
            envy::prefixed(ENV_PREFIX).from_iter(vars.into_iter())?;

        // 3. Merge: environment overrides file
        Ok(AlertingConfig {
            database_url: env_config
                .database_url
                .or(file_config.database_url)
                .ok_or(ConfigError::Missing("ALERTING_DATABASE_URL"))?,
            max_connections: env_config
                .max_connections
                .or(file_config.max_connections)
                .unwrap_or_else(default_max_connections),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            log_filter: env_config
                .log_filter
                .or(file_config.log_filter)
                .unwrap_or_else(default_log_filter),
        })
    }

    /// A private in-memory database on a single connection. The data lives as
    /// long as the pool does.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            log_dir: default_log_dir(),
            log_filter: default_log_filter(),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}
