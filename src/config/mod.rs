//! Configuration management for AirLog

pub mod settings;

pub use settings::{ClientConfig, ServerConfig, ServerSettings, StorageSettings};
