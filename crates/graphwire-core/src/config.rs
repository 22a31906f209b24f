//! Connection configuration for graphwire sessions.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (GRAPHWIRE__ prefix, `__` separator)
//! 2. Config file (`<prefix>.toml`, `[connection]` table)
//! 3. Defaults

use serde::Deserialize;

use crate::error::{GraphError, Result};
use crate::types::WrapLevel;

/// Settings handed to a session by the embedding application.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Server URL. The scheme selects the backend (http/https or bolt/neo4j).
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    /// Default result wrapping for queries run through the session.
    #[serde(default)]
    pub wrap_level: WrapLevel,

    /// Request timeout applied by the HTTP transport.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Connection pool size for the Bolt backend.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Records fetched per Bolt pull.
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

/// Wire protocol used to reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Http,
    Bolt,
}

fn default_url() -> String {
    "http://localhost:7474".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "neo4j".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            user: default_user(),
            password: default_password(),
            wrap_level: WrapLevel::default(),
            timeout_secs: default_timeout(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl ConnectionConfig {
    /// Load configuration from `<file_prefix>.toml` and `GRAPHWIRE__*` variables.
    ///
    /// A missing file or missing `[connection]` table yields the defaults.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("GRAPHWIRE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded = match cfg.get::<ConnectionConfig>("connection") {
            Ok(c) => c,
            Err(config::ConfigError::NotFound(_)) => Self::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(
            url = %loaded.url,
            wrap_level = ?loaded.wrap_level,
            "Loaded connection config"
        );
        Ok(loaded)
    }

    /// Select the backend from the URL scheme.
    pub fn backend(&self) -> Result<Backend> {
        let scheme = self
            .url
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or_else(|| GraphError::Config(format!("Invalid URL: {:?}", self.url)))?;

        match scheme.as_str() {
            "http" | "https" => Ok(Backend::Http),
            "bolt" | "bolt+s" | "bolt+ssc" | "neo4j" | "neo4j+s" | "neo4j+ssc" => Ok(Backend::Bolt),
            _ => Err(GraphError::Config(format!("Invalid URL: {:?}", self.url))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.url, "http://localhost:7474");
        assert_eq!(config.user, "neo4j");
        assert_eq!(config.wrap_level, WrapLevel::Entity);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.backend().unwrap(), Backend::Http);
    }

    #[test]
    fn test_backend_from_scheme() {
        let mut config = ConnectionConfig {
            url: "bolt://db:7687".to_string(),
            ..Default::default()
        };
        assert_eq!(config.backend().unwrap(), Backend::Bolt);

        config.url = "neo4j+s://db.example.com".to_string();
        assert_eq!(config.backend().unwrap(), Backend::Bolt);

        config.url = "ftp://db".to_string();
        assert!(matches!(config.backend(), Err(GraphError::Config(_))));

        config.url = "localhost:7474".to_string();
        assert!(matches!(config.backend(), Err(GraphError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphwire.toml");
        fs::write(
            &path,
            "[connection]\nurl = \"https://graph.internal:7473\"\nuser = \"reader\"\nwrap_level = \"none\"\n",
        )
        .unwrap();

        let prefix = dir.path().join("graphwire");
        let config = ConnectionConfig::load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.url, "https://graph.internal:7473");
        assert_eq!(config.user, "reader");
        assert_eq!(config.password, "neo4j");
        assert_eq!(config.wrap_level, WrapLevel::None);
        assert_eq!(config.fetch_size, 256);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("absent");
        let config = ConnectionConfig::load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.url, "http://localhost:7474");
    }
}
