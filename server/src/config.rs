//! Configuration management for the server.

use std::env;

/// Default upper bound for `GET /documents?limit=N`.
pub const DEFAULT_MAX_LIST_LIMIT: usize = 10;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL. Without one, documents live in memory.
    pub database_url: Option<String>,
    /// When set, every request must carry a bearer token
    pub auth_secret: Option<String>,
    /// Largest page a list request may ask for
    pub max_list_limit: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let auth_secret = env::var("AUTH_SECRET").ok().filter(|s| !s.is_empty());

        let max_list_limit = match env::var("MAX_LIST_LIMIT") {
            Ok(value) => value
                .parse()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or(ConfigError::InvalidListLimit)?,
            Err(_) => DEFAULT_MAX_LIST_LIMIT,
        };

        Ok(Self {
            host,
            port,
            database_url,
            auth_secret,
            max_list_limit,
        })
    }

    /// Socket address to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            auth_secret: None,
            max_list_limit: DEFAULT_MAX_LIST_LIMIT,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("MAX_LIST_LIMIT must be a positive integer")]
    InvalidListLimit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_select_memory_backend() {
        let config = Config::default();
        assert!(config.database_url.is_none());
        assert!(config.auth_secret.is_none());
        assert_eq!(config.max_list_limit, 10);
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
    }
}
