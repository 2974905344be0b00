//! Runtime configuration: compiled-in defaults layered with an optional TOML
//! file and then `NORMLITE_*` environment variable overrides.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

use crate::error::{NormliteError, NormliteResult};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NormliteConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ClientConfig {
    /// `"memory"` or `"file"`.
    pub backend: String,
    /// Required when `backend = "file"`.
    pub store_path: Option<String>,
    /// How many times a caller's client-driven retry loop should re-attempt
    /// a lock acquisition that failed with `AcquireLockFailed` before giving
    /// up; the lock manager itself never retries.
    pub lock_retry_count: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for NormliteConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig { host: "127.0.0.1".to_string(), port: 8080 },
            client: ClientConfig { backend: "memory".to_string(), store_path: None, lock_retry_count: 3 },
            logging: LoggingConfig { level: "info".to_string() },
        }
    }
}

impl NormliteConfig {
    /// Loads configuration from `NORMLITE_CONFIG` (a TOML file path, if
    /// set and present) layered under compiled-in defaults, then applies
    /// `NORMLITE_*` environment variable overrides, then validates.
    pub fn load() -> NormliteResult<Self> {
        let mut config = Self::default();

        let config_path = env::var("NORMLITE_CONFIG").unwrap_or_else(|_| "config/normlite.toml".to_string());
        if let Ok(contents) = fs::read_to_string(&config_path) {
            config = toml::from_str(&contents)
                .map_err(|e| NormliteError::invalid_request(format!("malformed config file {config_path:?}: {e}")))?;
        }

        if let Ok(host) = env::var("NORMLITE_SERVER__HOST") {
            config.server.host = host;
        }
        if let Ok(port) = env::var("NORMLITE_SERVER__PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| NormliteError::invalid_request(format!("NORMLITE_SERVER__PORT is not a valid port: {port:?}")))?;
        }
        if let Ok(backend) = env::var("NORMLITE_CLIENT__BACKEND") {
            config.client.backend = backend;
        }
        if let Ok(store_path) = env::var("NORMLITE_CLIENT__STORE_PATH") {
            config.client.store_path = Some(store_path);
        }
        if let Ok(count) = env::var("NORMLITE_CLIENT__LOCK_RETRY_COUNT") {
            config.client.lock_retry_count = count.parse().map_err(|_| {
                NormliteError::invalid_request(format!("NORMLITE_CLIENT__LOCK_RETRY_COUNT is not a number: {count:?}"))
            })?;
        }
        if let Ok(level) = env::var("NORMLITE_LOGGING__LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> NormliteResult<()> {
        if self.server.host.trim().is_empty() {
            return Err(NormliteError::invalid_request("server.host must not be empty"));
        }
        match self.client.backend.as_str() {
            "memory" => {}
            "file" => {
                if self.client.store_path.is_none() {
                    return Err(NormliteError::invalid_request("client.backend = \"file\" requires client.store_path"));
                }
            }
            other => {
                return Err(NormliteError::invalid_request(format!(
                    "client.backend must be \"memory\" or \"file\", got {other:?}"
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        NormliteConfig::default().validate().unwrap();
    }

    #[test]
    fn file_backend_without_store_path_fails_validation() {
        let mut config = NormliteConfig::default();
        config.client.backend = "file".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, NormliteError::InvalidRequest { .. }));
    }

    #[test]
    fn unknown_backend_fails_validation() {
        let mut config = NormliteConfig::default();
        config.client.backend = "postgres".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_host_fails_validation() {
        let mut config = NormliteConfig::default();
        config.server.host = String::new();
        assert!(config.validate().is_err());
    }
}
