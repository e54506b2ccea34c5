//! Configuration for the SQL gateway
//!
//! Loaded once at startup from a TOML file (optional) and then overridden by
//! `SQL_GATEWAY_*` environment variables. Validation is eager: a config that
//! cannot produce a [`ConnectionDescriptor`] stops the process before it
//! starts serving.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::PgSslMode;
use thiserror::Error;

/// Env var naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "SQL_GATEWAY_CONFIG_PATH";

const ENV_PREFIX: &str = "SQL_GATEWAY_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Top-level gateway configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Database connection settings
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Host name or address of the database server
    pub server: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    pub database: Option<String>,

    pub username: Option<String>,

    pub password: Option<String>,

    /// One of disable, allow, prefer, require, verify-ca, verify-full
    pub ssl_mode: Option<String>,

    /// Extra server runtime parameters sent at connection startup
    #[serde(default)]
    pub options: BTreeMap<String, String>,

    /// Start every session with `default_transaction_read_only = on`
    #[serde(default = "default_true")]
    pub read_only_session: bool,
}

fn default_port() -> u16 {
    5432
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: default_port(),
            database: None,
            username: None,
            password: None,
            ssl_mode: None,
            options: BTreeMap::new(),
            read_only_session: true,
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssl_mode", &self.ssl_mode)
            .field("options", &self.options)
            .field("read_only_session", &self.read_only_session)
            .finish()
    }
}

/// Timeouts applied to each request
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Deadline for one request when the caller gives none
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Hard cap on caller-supplied deadlines
    #[serde(default = "default_max_timeout")]
    pub max_timeout_secs: u64,

    /// Deadline for establishing the connection alone
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

fn default_max_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_timeout_secs: default_max_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl LimitsConfig {
    /// Resolve a caller deadline, falling back to the default and clamping to the cap
    pub fn deadline(&self, requested_secs: Option<u64>) -> Duration {
        let secs = requested_secs
            .filter(|s| *s > 0)
            .unwrap_or(self.timeout_secs)
            .min(self.max_timeout_secs);
        Duration::from_secs(secs)
    }
}

/// Everything the connector needs to open one connection
#[derive(Clone)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Option<String>,
    pub ssl_mode: PgSslMode,
    pub options: BTreeMap<String, String>,
    pub read_only_session: bool,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("ssl_mode", &self.ssl_mode)
            .field("options", &self.options)
            .field("read_only_session", &self.read_only_session)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Loading
// ============================================================================

impl GatewayConfig {
    /// Load configuration from file and environment
    ///
    /// The file is searched in order:
    /// 1. `explicit` (the `--config` flag)
    /// 2. `SQL_GATEWAY_CONFIG_PATH` env var
    /// 3. `~/.binks/sql-gateway.toml`, if it exists
    ///
    /// A file named by 1 or 2 must exist. Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let mut config = match named {
            Some(path) => Self::from_file(&path)?,
            None => match dirs::home_dir()
                .map(|home| home.join(".binks").join("sql-gateway.toml"))
                .filter(|path| path.exists())
            {
                Some(path) => Self::from_file(&path)?,
                None => {
                    tracing::debug!("No config file found, using environment only");
                    Self::default()
                }
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Overlay `SQL_GATEWAY_*` variables resolved through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let db = &mut self.database;

        if let Some(server) = var("SERVER") {
            db.server = Some(server);
        }
        if let Some(port) = var("PORT") {
            db.port = port.trim().parse().map_err(|_| ConfigError::Invalid {
                field: "port",
                reason: format!("'{}' is not a port number", port),
            })?;
        }
        if let Some(database) = var("DATABASE") {
            db.database = Some(database);
        }
        if let Some(username) = var("USERNAME") {
            db.username = Some(username);
        }
        if let Some(password) = var("PASSWORD") {
            db.password = Some(password);
        }
        if let Some(ssl_mode) = var("SSL_MODE") {
            db.ssl_mode = Some(ssl_mode);
        }
        if let Some(options) = var("OPTIONS") {
            db.options.extend(parse_options(&options)?);
        }

        Ok(())
    }

    /// Check every setting and produce the connection descriptor
    pub fn validate(&self) -> Result<ConnectionDescriptor, ConfigError> {
        let db = &self.database;

        let host = required(&db.server, "database.server")?;
        let database = required(&db.database, "database.database")?;
        let username = required(&db.username, "database.username")?;

        if db.port == 0 {
            return Err(ConfigError::Invalid {
                field: "port",
                reason: "must be non-zero".to_string(),
            });
        }

        let ssl_mode = match db.ssl_mode.as_deref() {
            Some(mode) => PgSslMode::from_str(mode).map_err(|e| ConfigError::Invalid {
                field: "ssl_mode",
                reason: e.to_string(),
            })?,
            None => PgSslMode::Prefer,
        };

        let limits = &self.limits;
        if limits.timeout_secs == 0 || limits.max_timeout_secs == 0 || limits.connect_timeout_secs == 0
        {
            return Err(ConfigError::Invalid {
                field: "limits",
                reason: "timeouts must be non-zero".to_string(),
            });
        }
        if limits.timeout_secs > limits.max_timeout_secs {
            return Err(ConfigError::Invalid {
                field: "limits.timeout_secs",
                reason: format!(
                    "{} exceeds max_timeout_secs {}",
                    limits.timeout_secs, limits.max_timeout_secs
                ),
            });
        }

        Ok(ConnectionDescriptor {
            host,
            port: db.port,
            database,
            username,
            password: db.password.clone(),
            ssl_mode,
            options: db.options.clone(),
            read_only_session: db.read_only_session,
            connect_timeout: Duration::from_secs(limits.connect_timeout_secs),
        })
    }
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ConfigError::Missing(field))
}

/// Parse `key=value,key=value`
fn parse_options(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(ConfigError::Invalid {
                field: "options",
                reason: format!("expected key=value, got '{}'", pair),
            }),
        })
        .collect()
}
