use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_TOKEN_TTL_HOURS: i64 = 7 * 24;
const MAX_TOKEN_TTL_HOURS: i64 = 10 * 365 * 24;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Lifetime of credentials issued at login.
    pub token_ttl_hours: i64,
    /// Upper bound on a single multipart upload body.
    pub max_upload_bytes: usize,
}

/// On-disk TOML configuration. Every field is optional; missing values keep
/// the defaults and CLI flags take precedence over anything set here.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub token_ttl_hours: Option<i64>,
    pub max_upload_bytes: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid config file: {e}")))
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("trackvault.db")
    }

    #[must_use]
    pub fn secret_path(&self) -> PathBuf {
        self.data_dir.join(".secret_key")
    }

    pub fn token_ttl(&self) -> Result<Duration> {
        Duration::try_hours(self.token_ttl_hours).ok_or_else(|| {
            Error::Config(format!(
                "token_ttl_hours out of range: {}",
                self.token_ttl_hours
            ))
        })
    }

    /// Overlays values from a config file onto this config.
    pub fn merge(mut self, file: FileConfig) -> Result<Self> {
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(data_dir) = file.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(ttl) = file.token_ttl_hours {
            if !(1..=MAX_TOKEN_TTL_HOURS).contains(&ttl) {
                return Err(Error::Config(format!(
                    "token_ttl_hours must be between 1 and {MAX_TOKEN_TTL_HOURS}"
                )));
            }
            self.token_ttl_hours = ttl;
        }
        if let Some(max) = file.max_upload_bytes {
            if max == 0 {
                return Err(Error::Config("max_upload_bytes must be positive".to_string()));
            }
            self.max_upload_bytes = max;
        }
        Ok(self)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3003,
            data_dir: PathBuf::from("./data"),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr().unwrap().port(), 3003);
        assert_eq!(config.db_path(), PathBuf::from("./data/trackvault.db"));
        assert_eq!(config.token_ttl().unwrap(), Duration::days(7));
    }

    #[test]
    fn test_merge_file_values() {
        let file = FileConfig::parse(
            r#"
            port = 9000
            data_dir = "/var/lib/trackvault"
            max_upload_bytes = 2048
            "#,
        )
        .unwrap();

        let config = ServerConfig::default().merge(file).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/trackvault"));
        assert_eq!(config.max_upload_bytes, 2048);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            FileConfig::parse("colour = \"blue\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        let file = FileConfig::parse("token_ttl_hours = 0").unwrap();
        assert!(ServerConfig::default().merge(file).is_err());
    }

    #[test]
    fn test_oversized_ttl_rejected() {
        let file = FileConfig::parse("token_ttl_hours = 3000000000").unwrap();
        assert!(matches!(
            ServerConfig::default().merge(file),
            Err(Error::Config(_))
        ));

        let file = FileConfig::parse("token_ttl_hours = 87600").unwrap();
        let config = ServerConfig::default().merge(file).unwrap();
        assert_eq!(config.token_ttl().unwrap(), Duration::days(3650));
    }

    #[test]
    fn test_unrepresentable_ttl_is_an_error() {
        let config = ServerConfig {
            token_ttl_hours: i64::MAX,
            ..ServerConfig::default()
        };
        assert!(matches!(config.token_ttl(), Err(Error::Config(_))));
    }
}
