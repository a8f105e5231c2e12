//! Environment-driven configuration
//!
//! All process configuration is read once, in one place, into [`Settings`].
//! The binary calls [`Settings::from_env`] at startup and hands the result to
//! every component that needs it.

use std::fmt;
use std::str::FromStr;

pub const DATABASE_PROVIDER: &str = "DATABASE_PROVIDER";
pub const DATABASE_HOST: &str = "DATABASE_HOST";
pub const DATABASE_PORT: &str = "DATABASE_PORT";
pub const DATABASE_USER: &str = "DATABASE_USER";
pub const DATABASE_PASSWORD: &str = "DATABASE_PASSWORD";
pub const DATABASE_NAME: &str = "DATABASE_NAME";
pub const DATABASE_MIN_POOL_SIZE: &str = "DATABASE_MIN_POOL_SIZE";
pub const DATABASE_MAX_POOL_SIZE: &str = "DATABASE_MAX_POOL_SIZE";
pub const DATABASE_READ_ONLY: &str = "DATABASE_READ_ONLY";
pub const HTTP_HOST: &str = "HTTP_HOST";
pub const HTTP_PORT: &str = "HTTP_PORT";
pub const MCP_TRANSPORT: &str = "MCP_TRANSPORT";

const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
const DEFAULT_HTTP_PORT: u16 = 8080;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// How the MCP server talks to its clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Transport {
    /// Streamable HTTP on `HTTP_HOST:HTTP_PORT`
    #[default]
    Http,
    /// JSON-RPC over stdin/stdout
    Stdio,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "streamable-http" => Ok(Transport::Http),
            "stdio" => Ok(Transport::Stdio),
            other => Err(format!("expected `http` or `stdio`, got `{}`", other)),
        }
    }
}

/// Immutable process configuration.
///
/// Database values are kept exactly as they appear in the environment;
/// numeric fields are interpreted by the component that uses them.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_provider: String,
    pub db_host: String,
    pub db_port: String,
    pub db_user: String,
    pub db_password: Option<String>,
    pub db_name: String,
    pub db_min_pool_size: String,
    pub db_max_pool_size: String,
    pub http_host: Option<String>,
    pub http_port: Option<String>,
    pub read_only: bool,
    pub transport: Transport,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    ///
    /// Required variables that are absent or empty fail with
    /// [`ConfigError::Missing`]; the first one missing (in declaration order)
    /// is reported.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let optional = |name: &'static str| lookup(name).filter(|v| !v.is_empty());

        let db_provider = required(DATABASE_PROVIDER)?;
        let db_host = required(DATABASE_HOST)?;
        let db_port = required(DATABASE_PORT)?;
        let db_user = required(DATABASE_USER)?;
        let db_password = optional(DATABASE_PASSWORD);
        let db_name = required(DATABASE_NAME)?;
        let db_min_pool_size = required(DATABASE_MIN_POOL_SIZE)?;
        let db_max_pool_size = required(DATABASE_MAX_POOL_SIZE)?;

        let transport = match optional(MCP_TRANSPORT) {
            Some(value) => value.parse::<Transport>().map_err(|reason| ConfigError::Invalid {
                name: MCP_TRANSPORT,
                value,
                reason,
            })?,
            None => Transport::default(),
        };

        Ok(Self {
            db_provider,
            db_host,
            db_port,
            db_user,
            db_password,
            db_name,
            db_min_pool_size,
            db_max_pool_size,
            http_host: optional(HTTP_HOST),
            http_port: optional(HTTP_PORT),
            read_only: optional(DATABASE_READ_ONLY)
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
            transport,
        })
    }

    pub fn listen_host(&self) -> &str {
        self.http_host.as_deref().unwrap_or(DEFAULT_HTTP_HOST)
    }

    pub fn listen_port(&self) -> Result<u16, ConfigError> {
        match &self.http_port {
            Some(port) => parse_var(HTTP_PORT, port),
            None => Ok(DEFAULT_HTTP_PORT),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("db_provider", &self.db_provider)
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_user", &self.db_user)
            .field("db_password", &self.db_password.as_ref().map(|_| "***"))
            .field("db_name", &self.db_name)
            .field("db_min_pool_size", &self.db_min_pool_size)
            .field("db_max_pool_size", &self.db_max_pool_size)
            .field("http_host", &self.http_host)
            .field("http_port", &self.http_port)
            .field("read_only", &self.read_only)
            .field("transport", &self.transport)
            .finish()
    }
}

/// Parse a configuration value, naming the variable on failure
pub(crate) fn parse_var<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
