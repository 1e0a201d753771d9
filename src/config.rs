use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::fs;
use std::time::Duration;

pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_BLOAT_LIMIT: f64 = 30.0;
pub const DEFAULT_REMAINING_PERCENTAGE: f64 = 10.0;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Failed to read config file: {}", source))]
    FileRead { source: std::io::Error },

    #[snafu(display("Failed to parse YAML config: {}", source))]
    YamlParse { source: serde_yaml::Error },
}

/// Connection parameters and thresholds for one health-check session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Schema every check inspects; `public` when unset or empty
    #[serde(default)]
    pub schema_name: Option<String>,
    /// Minimum estimated bloat, in percent, reported by the bloat checks
    #[serde(default = "default_bloat_limit")]
    pub bloat_limit: f64,
    /// Sequences with less remaining capacity than this, in percent, are reported
    #[serde(default = "default_remaining_percentage")]
    pub remaining_percentage_threshold: f64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_bloat_limit() -> f64 {
    DEFAULT_BLOAT_LIMIT
}

fn default_remaining_percentage() -> f64 {
    DEFAULT_REMAINING_PERCENTAGE
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_acquire_timeout_secs() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_SECS
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
            schema_name: None,
            bloat_limit: DEFAULT_BLOAT_LIMIT,
            remaining_percentage_threshold: DEFAULT_REMAINING_PERCENTAGE,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

type Result<T, E = ConfigError> = std::result::Result<T, E>;

impl CheckerConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn from_connection_params(
        host: String,
        port: u16,
        database: String,
        username: String,
        password: String,
        schema_name: Option<String>,
        bloat_limit: f64,
        remaining_percentage_threshold: f64,
    ) -> Self {
        Self {
            host,
            port,
            database,
            username,
            password,
            schema_name,
            bloat_limit,
            remaining_percentage_threshold,
            ..Self::default()
        }
    }

    /// Loads a YAML list of databases to check.
    pub fn from_config_file(path: &str) -> Result<Vec<Self>> {
        let content = fs::read_to_string(path).context(FileReadSnafu)?;
        let configs: Vec<CheckerConfig> =
            serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        Ok(configs)
    }

    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    pub fn schema_name(&self) -> &str {
        self.schema_name
            .as_deref()
            .filter(|schema| !schema.is_empty())
            .unwrap_or(DEFAULT_SCHEMA)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}
