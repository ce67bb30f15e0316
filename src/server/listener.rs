//! Accept loop with connection admission

use crate::protocol::SERVER_FULL;
use crate::server::registry::SessionRegistry;
use crate::server::session;
use crate::server::store::CsvStore;
use crate::{AirLogError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, info};

/// Accepts connections, applies the admission limit, and spawns one
/// session task per granted connection.
pub struct AcceptLoop {
    listener: TcpListener,
    store: Arc<CsvStore>,
    registry: Arc<SessionRegistry>,
    slots: Arc<Semaphore>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl AcceptLoop {
    /// Build the loop over an already-bound listener with `max_clients`
    /// capacity tokens.
    pub fn new(
        listener: TcpListener,
        store: Arc<CsvStore>,
        registry: Arc<SessionRegistry>,
        max_clients: usize,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            listener,
            store,
            registry,
            slots: Arc::new(Semaphore::new(max_clients)),
            shutdown_rx,
        }
    }

    /// Run until shutdown is signalled. An accept failure is fatal: no
    /// further sessions can be served, so it propagates to the caller.
    pub async fn start(self) -> Result<()> {
        let Self {
            listener,
            store,
            registry,
            slots,
            mut shutdown_rx,
        } = self;
        let next_session_id = AtomicU64::new(1);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer) = result.map_err(|e| {
                        AirLogError::Server(format!("Failed to accept connection: {}", e))
                    })?;
                    debug!("Incoming connection from {}", peer);
                    dispatch(stream, &store, &registry, &slots, &next_session_id);
                }
                _ = shutdown_rx.recv() => {
                    info!("Accept loop stopping");
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Admission decision. `try_acquire` never blocks the accept loop; a
/// denied connection gets `SERVER_FULL` and is closed without ever
/// becoming a session.
fn dispatch(
    stream: TcpStream,
    store: &Arc<CsvStore>,
    registry: &Arc<SessionRegistry>,
    slots: &Arc<Semaphore>,
    next_session_id: &AtomicU64,
) {
    match Arc::clone(slots).try_acquire_owned() {
        Ok(permit) => {
            let session_id = next_session_id.fetch_add(1, Ordering::Relaxed);
            let store = Arc::clone(store);
            let registry = Arc::clone(registry);
            tokio::spawn(session::run(stream, session_id, store, registry, permit));
        }
        Err(_) => {
            info!("Connection rejected: server at capacity");
            tokio::spawn(reject(stream));
        }
    }
}

async fn reject(mut stream: TcpStream) {
    let _ = stream.write_all(SERVER_FULL.as_bytes()).await;
    let _ = stream.write_all(b"\n").await;
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;
}
