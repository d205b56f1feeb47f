//! Configuration loading from environment variables.

use std::time::Duration;

/// Connection settings for a Snowflake account.
#[derive(Debug, Clone)]
pub struct SnowflakeSettings {
    /// Account identifier, e.g. `"xy12345.us-east-1"`.
    pub account: String,
    /// Snowflake user name.
    pub user: String,
    /// Password (optional — not required for `externalbrowser`/PAT auth).
    pub password: Option<String>,
    /// Warehouse to run statements against.
    pub warehouse: Option<String>,
    /// Role to assume for all statements.
    pub role: Option<String>,
    /// Authenticator mode.
    pub authenticator: Authenticator,
}

/// Authentication mode for a Snowflake connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authenticator {
    /// Username/password authentication.
    Snowflake,
    /// Browser-based SSO authentication.
    ExternalBrowser,
}

impl Authenticator {
    fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "SNOWFLAKE" => Ok(Self::Snowflake),
            "externalbrowser" => Ok(Self::ExternalBrowser),
            other => Err(ConfigError::Invalid {
                var: "SNOWFLAKE_MCP_AUTHENTICATOR",
                reason: format!(
                    "must be 'SNOWFLAKE' or 'externalbrowser', got '{other}'"
                ),
            }),
        }
    }
}

/// Registry-wide defaults applied when a query doesn't override them.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Default interval between status-check polls.
    pub poll_interval: Duration,
    /// Default cap on rows retained in memory for paging.
    pub max_inline_rows: usize,
    /// How long a terminal record survives before `prune_expired` removes it.
    pub ttl: Duration,
    /// Upper bound a caller may request for `query_timeout`.
    pub max_query_timeout: Duration,
}

/// Process-wide configuration for the registry and its Snowflake connection.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Snowflake account connection settings.
    pub snowflake: SnowflakeSettings,
    /// Registry defaults (poll interval, inline row cap, TTL, timeout cap).
    pub registry: RegistrySettings,
}

impl RegistryConfig {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `SNOWFLAKE_MCP_ACCOUNT`
    /// - `SNOWFLAKE_MCP_USER`
    ///
    /// Optional (with defaults):
    /// - `SNOWFLAKE_MCP_PASSWORD`, `SNOWFLAKE_MCP_WAREHOUSE`, `SNOWFLAKE_MCP_ROLE`
    /// - `SNOWFLAKE_MCP_AUTHENTICATOR` (default `SNOWFLAKE`)
    /// - `SNOWFLAKE_MCP_POLL_INTERVAL_MS` (default `1000`)
    /// - `SNOWFLAKE_MCP_MAX_INLINE_ROWS` (default `1000`)
    /// - `SNOWFLAKE_MCP_TTL_SECS` (default `86400`)
    /// - `SNOWFLAKE_MCP_MAX_QUERY_TIMEOUT_SECS` (default `3600`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let account = required("SNOWFLAKE_MCP_ACCOUNT")?;
        let user = required("SNOWFLAKE_MCP_USER")?;
        let password = optional_string("SNOWFLAKE_MCP_PASSWORD");
        let warehouse = optional_string("SNOWFLAKE_MCP_WAREHOUSE");
        let role = optional_string("SNOWFLAKE_MCP_ROLE");
        let authenticator = match optional_string("SNOWFLAKE_MCP_AUTHENTICATOR") {
            Some(s) => Authenticator::parse(&s)?,
            None => Authenticator::Snowflake,
        };

        let poll_interval_ms: u64 = parse_optional(
            "SNOWFLAKE_MCP_POLL_INTERVAL_MS",
            1000,
            "must be a positive integer number of milliseconds",
        )?;
        let max_inline_rows: usize = parse_optional(
            "SNOWFLAKE_MCP_MAX_INLINE_ROWS",
            1000,
            "must be a non-negative integer",
        )?;
        let ttl_secs: u64 = parse_optional(
            "SNOWFLAKE_MCP_TTL_SECS",
            86_400,
            "must be a positive integer number of seconds",
        )?;
        let max_query_timeout_secs: u64 = parse_optional(
            "SNOWFLAKE_MCP_MAX_QUERY_TIMEOUT_SECS",
            3_600,
            "must be a positive integer number of seconds",
        )?;

        Ok(Self {
            snowflake: SnowflakeSettings {
                account,
                user,
                password,
                warehouse,
                role,
                authenticator,
            },
            registry: RegistrySettings {
                poll_interval: Duration::from_millis(poll_interval_ms),
                max_inline_rows,
                ttl: Duration::from_secs(ttl_secs),
                max_query_timeout: Duration::from_secs(max_query_timeout_secs),
            },
        })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::Missing(var))
}

fn optional_string(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|s| !s.is_empty())
}

fn parse_optional<T: std::str::FromStr>(
    var: &'static str,
    default: T,
    reason: &'static str,
) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(s) => s.parse().map_err(|_| ConfigError::Invalid {
            var,
            reason: reason.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {var}: {reason}")]
    Invalid {
        /// The offending variable name.
        var: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}
