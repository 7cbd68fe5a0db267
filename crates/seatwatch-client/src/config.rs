//! Client configuration.
//!
//! Loaded from a TOML file; every field has a default so a missing file
//! or a partial file both work.
//!
//! ```toml
//! api_host = "tracker.example.com"
//! api_prefix = "/api/"
//! client_name = "seatwatch"
//! reconnect_delay_secs = 5
//!
//! [credentials]
//! identity = "user@example.com"
//! checking_code = "abc123"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding `api_host`.
pub const API_HOST_ENV: &str = "SEATWATCH_API_HOST";

/// Reconnect delay after a socket closes.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Login credentials for the tracking session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Credentials {
    pub identity: String,
    pub checking_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host[:port]` of the tracking server.
    pub api_host: String,

    /// Path prefix of the API, with leading and trailing slash.
    pub api_prefix: String,

    /// Name sent with `login`.
    pub client_name: String,

    pub reconnect_delay_secs: u64,

    /// Login is skipped without credentials.
    pub credentials: Option<Credentials>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_host: "localhost:8080".to_string(),
            api_prefix: "/".to_string(),
            client_name: "seatwatch".to_string(),
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            credentials: None,
        }
    }
}

impl ClientConfig {
    /// `~/.config/seatwatch/config.toml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("seatwatch").join("config.toml"))
    }

    /// Loads the configuration.
    ///
    /// An explicit path must exist. Without one the default path is tried
    /// and defaults are used when it is missing. The environment override
    /// is applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        Ok(config.with_env_override(std::env::var(API_HOST_ENV).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    fn with_env_override(mut self, api_host: Option<String>) -> Self {
        if let Some(host) = api_host.filter(|host| !host.is_empty()) {
            self.api_host = host;
        }
        self
    }

    /// `ws://<api_host><api_prefix>ws`
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}ws", self.api_host, self.api_prefix)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.ws_url(), "ws://localhost:8080/ws");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert!(config.credentials.is_none());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
api_host = "rzd.example.com"
api_prefix = "/api/"

[credentials]
identity = "user@example.com"
checking_code = "abc123"
"#
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.ws_url(), "ws://rzd.example.com/api/ws");
        assert_eq!(config.client_name, "seatwatch");
        assert_eq!(
            config.credentials,
            Some(Credentials {
                identity: "user@example.com".to_string(),
                checking_code: "abc123".to_string(),
            })
        );
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ClientConfig::load(Some(&dir.path().join("nope.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "reconnect_delay_secs = \"soon\"").unwrap();

        let result = ClientConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_override() {
        let config = ClientConfig::default().with_env_override(Some("10.0.0.1:9000".to_string()));
        assert_eq!(config.api_host, "10.0.0.1:9000");

        let config = ClientConfig::default().with_env_override(Some(String::new()));
        assert_eq!(config.api_host, "localhost:8080");
    }
}
