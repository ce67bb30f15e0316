//! Configuration structures for AirLog

use crate::{AirLogError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server settings
    pub server: ServerSettings,
    /// Storage configuration
    pub storage: StorageSettings,
}

/// Core server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Address to bind the TCP listener to
    pub bind_address: String,
    /// Listening port
    pub port: u16,
    /// Maximum concurrent client sessions (capacity tokens)
    pub max_clients: usize,
}

/// Shared log storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Path of the append-only CSV log
    pub log_path: PathBuf,
    /// Reference timezone for server-assigned timestamps
    pub timezone: Tz,
    /// Timestamp format string (chrono strftime syntax)
    pub timestamp_format: String,
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server address to connect to, `host:port`
    pub server_address: String,
    /// Connection timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "0.0.0.0".to_string(),
                port: 5000,
                max_clients: 4,
            },
            storage: StorageSettings {
                log_path: PathBuf::from("submissions_server.csv"),
                timezone: chrono_tz::Europe::London,
                timestamp_format: "%d-%m-%y %H:%M:%S".to_string(),
            },
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:5000".to_string(),
            timeout_seconds: 5,
        }
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AirLogError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ServerConfig = toml::from_str(&content)
            .map_err(|e| AirLogError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.is_empty() {
            return Err(AirLogError::Config("Bind address cannot be empty".to_string()));
        }
        if self.server.max_clients == 0 {
            return Err(AirLogError::Config("max_clients must be at least 1".to_string()));
        }
        if self.storage.log_path.as_os_str().is_empty() {
            return Err(AirLogError::Config("Log path cannot be empty".to_string()));
        }
        if self.storage.timestamp_format.is_empty() {
            return Err(AirLogError::Config("Timestamp format cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Full listen address, `bind_address:port`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}

impl ClientConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server_address.is_empty() {
            return Err(AirLogError::Config("Server address cannot be empty".to_string()));
        }
        Ok(())
    }
}
