//! # AirLog - Centralized CO2 Submission Hub
//!
//! AirLog collects timestamped environmental readings (user id, postcode,
//! CO2 concentration) from multiple remote clients into a single shared
//! append-only CSV log, and pushes the full updated log back to every
//! connected client after each successful submission.
//!
//! ## Features
//!
//! - **Bounded Concurrency**: a fixed number of simultaneous sessions;
//!   excess connections are rejected immediately with `SERVER_FULL`
//! - **Serialized Writes**: all appends go through one exclusion region,
//!   so the log never contains interleaved or half-written records
//! - **Live Fanout**: every successful append is followed by a framed
//!   broadcast of the full log to all registered sessions
//! - **Async I/O**: Tokio task per session, non-blocking accept loop
//!
//! ## Quick Start
//!
//! ### Server
//! ```no_run
//! use airlog::config::ServerConfig;
//! use airlog::server::HubServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::from_file("config/server.toml")?;
//!     let server = HubServer::new(config).await?;
//!     server.start().await?;
//!     Ok(())
//! }
//! ```
//!
//! ### Client
//! ```no_run
//! use airlog::client::SubmissionClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = SubmissionClient::connect("127.0.0.1:5000").await?;
//!     let timestamp = client.submit("u1", "AB12", "450").await?;
//!     println!("recorded at {}", timestamp);
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod protocol;
pub mod server;
pub mod types;

/// Common error types used throughout AirLog
pub mod error {
    use std::fmt;

    /// AirLog error types
    #[derive(Debug)]
    pub enum AirLogError {
        /// I/O operation failed
        Io(std::io::Error),
        /// Configuration error
        Config(String),
        /// Server error
        Server(String),
        /// Client error
        Client(String),
        /// Connection error
        Connection(String),
        /// Wire protocol violation
        Protocol(String),
    }

    impl fmt::Display for AirLogError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                AirLogError::Io(e) => write!(f, "I/O error: {}", e),
                AirLogError::Config(e) => write!(f, "Configuration error: {}", e),
                AirLogError::Server(e) => write!(f, "Server error: {}", e),
                AirLogError::Client(e) => write!(f, "Client error: {}", e),
                AirLogError::Connection(e) => write!(f, "Connection error: {}", e),
                AirLogError::Protocol(e) => write!(f, "Protocol error: {}", e),
            }
        }
    }

    impl std::error::Error for AirLogError {}

    impl From<std::io::Error> for AirLogError {
        fn from(err: std::io::Error) -> Self {
            AirLogError::Io(err)
        }
    }

    /// Result type alias for AirLog operations
    pub type Result<T> = std::result::Result<T, AirLogError>;
}

pub use error::{AirLogError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::SubmissionClient;
    pub use crate::config::{ClientConfig, ServerConfig};
    pub use crate::server::HubServer;
    pub use crate::types::Record;
    pub use crate::{AirLogError, Result};
}
