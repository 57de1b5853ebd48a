use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::RegistryConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Lifetime of a satellite bootstrap token. `None` means tokens never expire.
    pub token_ttl_secs: Option<u64>,
    /// Upper bound on waiting for the storage transaction lock.
    pub lock_timeout_ms: u64,
    pub registry: RegistryConfig,
}

impl ServerConfig {
    /// Loads a TOML config file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("groundctl.db")
    }

    #[must_use]
    pub fn admin_token_path(&self) -> PathBuf {
        self.data_dir.join(".admin_token")
    }

    #[must_use]
    pub fn token_ttl(&self) -> Option<chrono::Duration> {
        self.token_ttl_secs
            .and_then(|secs| chrono::Duration::try_seconds(i64::try_from(secs).ok()?))
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            token_ttl_secs: Some(7 * 24 * 60 * 60),
            lock_timeout_ms: 10_000,
            registry: RegistryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("groundctl.toml");
        std::fs::write(
            &path,
            r#"
port = 9090

[registry]
url = "https://reg.example.com"
username = "admin"
"#,
        )
        .unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.registry.url, "https://reg.example.com");
        assert_eq!(config.registry.username, "admin");
        assert_eq!(config.registry.state_namespace, "satellite");
        assert_eq!(config.db_path(), PathBuf::from("./data/groundctl.db"));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        assert!(matches!(ServerConfig::from_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_token_ttl_disabled() {
        let config = ServerConfig {
            token_ttl_secs: None,
            ..ServerConfig::default()
        };
        assert!(config.token_ttl().is_none());
        assert_eq!(
            ServerConfig::default().token_ttl(),
            chrono::Duration::try_days(7)
        );
    }
}
