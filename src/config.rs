use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL. Falls back to POSTGRES_* env vars.
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 50,
            acquire_timeout_ms: 5000,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Retry budget for store conflicts (serialization failure, deadlock)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TransferConfig {
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 20,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("No database configured: set DATABASE_URL, postgres_url or POSTGRES_* variables")]
    MissingDatabase,
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Resolve the PostgreSQL URL
    ///
    /// Precedence: `DATABASE_URL`, then `postgres_url` from the config file,
    /// then a URL assembled from `POSTGRES_USER`, `POSTGRES_PASSWORD`,
    /// `POSTGRES_HOST` (default `db`), `POSTGRES_PORT` and `POSTGRES_DB`.
    pub fn database_url(&self) -> Result<String, ConfigError> {
        self.database_url_from(|key| std::env::var(key).ok())
    }

    fn database_url_from(
        &self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ConfigError> {
        if let Some(url) = var("DATABASE_URL") {
            return Ok(url);
        }
        if let Some(url) = &self.postgres_url {
            return Ok(url.clone());
        }

        let user = var("POSTGRES_USER").ok_or(ConfigError::MissingDatabase)?;
        let password = var("POSTGRES_PASSWORD").unwrap_or_default();
        let db = var("POSTGRES_DB").ok_or(ConfigError::MissingDatabase)?;
        let host = var("POSTGRES_HOST").unwrap_or_else(|| "db".to_string());
        let port = var("POSTGRES_PORT").unwrap_or_else(|| "5432".to_string());

        Ok(format!(
            "postgresql://{}:{}@{}:{}/{}?sslmode=disable",
            user, password, host, port, db
        ))
    }
}
