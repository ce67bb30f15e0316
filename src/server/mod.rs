//! AirLog hub server implementation

pub mod listener;
pub mod registry;
pub mod session;
pub mod store;

use crate::config::ServerConfig;
use crate::{AirLogError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

pub use listener::AcceptLoop;
pub use registry::{Outbound, SessionId, SessionRegistry};
pub use store::CsvStore;

/// Main hub server that owns the shared log, the session registry, and
/// the bound listener. No ambient state: every session task receives
/// handles to these components.
pub struct HubServer {
    config: ServerConfig,
    store: Arc<CsvStore>,
    registry: Arc<SessionRegistry>,
    listener: TcpListener,
    shutdown_tx: broadcast::Sender<()>,
}

impl HubServer {
    /// Validate the configuration, initialize the log (header row written
    /// if absent), and bind the listener. A bind failure is fatal.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(CsvStore::new(&config.storage));
        store.initialize().await?;

        let listener = TcpListener::bind(config.listen_addr()).await.map_err(|e| {
            AirLogError::Server(format!("Failed to bind {}: {}", config.listen_addr(), e))
        })?;

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            store,
            registry: Arc::new(SessionRegistry::new()),
            listener,
            shutdown_tx,
        })
    }

    /// The bound listen address. Useful when the configured port is 0.
    ///
    /// # Errors
    /// Fails if the socket's local address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(AirLogError::Io)
    }

    /// Handle for signalling graceful shutdown to the accept loop.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run the accept loop until shutdown or a listener failure.
    pub async fn start(self) -> Result<()> {
        info!(
            "Server started on port {}. Listening for clients...",
            self.local_addr()?.port()
        );

        let accept_loop = AcceptLoop::new(
            self.listener,
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            self.config.server.max_clients,
            self.shutdown_tx.subscribe(),
        );

        accept_loop.start().await
    }
}
