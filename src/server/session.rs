//! Per-connection protocol loop

use crate::protocol::{self, CONNECTED, DATA_END, DATA_START, DISCONNECT, INVALID_FORMAT};
use crate::server::registry::{Outbound, SessionId, SessionRegistry};
use crate::server::store::CsvStore;
use crate::types::Record;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, error, info};

/// Drive one accepted connection from registration to cleanup.
///
/// Cleanup (unregister, writer shutdown, permit release) runs exactly
/// once on every exit path; the capacity token is the permit, released
/// when it drops at the end of this function.
pub(crate) async fn run(
    stream: TcpStream,
    session_id: SessionId,
    store: Arc<CsvStore>,
    registry: Arc<SessionRegistry>,
    permit: OwnedSemaphorePermit,
) {
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();

    let writer = tokio::spawn(write_loop(write_half, rx));

    registry.register(session_id, tx.clone());
    info!("Client {} connected.", session_id);

    if let Err(e) = serve(read_half, &tx, &store, &registry, session_id).await {
        debug!("Client {} session ended: {}", session_id, e);
    }

    registry.unregister(session_id);
    drop(tx);
    let _ = writer.await;
    drop(permit);
    info!("Client {} slot released.", session_id);
}

/// The session's single writer task. Owning the write half here means
/// replies and snapshot frames are serialized and never interleave.
async fn write_loop(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(message) = rx.recv().await {
        let result = match message {
            Outbound::Line(line) => write_line(&mut write_half, &line).await,
            Outbound::Snapshot(lines) => write_frame(&mut write_half, &lines).await,
        };
        if result.is_err() {
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

async fn write_line(write_half: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    write_half.write_all(line.as_bytes()).await?;
    write_half.write_all(b"\n").await?;
    write_half.flush().await
}

async fn write_frame(write_half: &mut OwnedWriteHalf, lines: &[String]) -> std::io::Result<()> {
    let mut frame = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum::<usize>() + 24);
    frame.push_str(DATA_START);
    frame.push('\n');
    for line in lines {
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push_str(DATA_END);
    frame.push('\n');
    write_half.write_all(frame.as_bytes()).await?;
    write_half.flush().await
}

/// The registered part of the session: acknowledgment, targeted snapshot,
/// then the submission loop until sentinel, EOF, or error.
async fn serve(
    read_half: OwnedReadHalf,
    tx: &mpsc::UnboundedSender<Outbound>,
    store: &CsvStore,
    registry: &SessionRegistry,
    session_id: SessionId,
) -> crate::Result<()> {
    send(tx, Outbound::Line(CONNECTED.to_string()))?;

    // Targeted snapshot for the new session, not a broadcast. Queued
    // under the store lock so a concurrent submission cannot slip a
    // fresher broadcast frame ahead of this older one.
    match store
        .with_snapshot(|lines| send(tx, Outbound::Snapshot(Arc::new(lines))))
        .await
    {
        Ok(sent) => sent?,
        Err(e) => {
            error!("Client {}: failed to read log for greeting: {}", session_id, e);
            // the error still travels inside a frame
            send(
                tx,
                Outbound::Snapshot(Arc::new(vec![protocol::error_reply(
                    "Failed to read server log",
                )])),
            )?;
        }
    }

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("Client {} closed the connection.", session_id);
                break;
            }
            Ok(_) => {
                let input = line.trim_end_matches(['\r', '\n']);
                if input == DISCONNECT {
                    info!("Client {} disconnected.", session_id);
                    break;
                }
                handle_submission(input, tx, store, registry, session_id).await?;
            }
            Err(e) => {
                debug!("Client {} read error: {}", session_id, e);
                break;
            }
        }
    }

    Ok(())
}

async fn handle_submission(
    input: &str,
    tx: &mpsc::UnboundedSender<Outbound>,
    store: &CsvStore,
    registry: &SessionRegistry,
    session_id: SessionId,
) -> crate::Result<()> {
    let Some(record) = Record::from_submission(input) else {
        send(tx, Outbound::Line(protocol::error_reply(INVALID_FORMAT)))?;
        return Ok(());
    };

    match store.append(&record).await {
        Ok(timestamp) => {
            send(tx, Outbound::Line(protocol::success_reply(&timestamp)))?;
            // Snapshot read and fanout enqueue share the store lock, so
            // broadcasts enter every session's queue in log order.
            if let Err(e) = store
                .with_snapshot(|lines| registry.broadcast(lines))
                .await
            {
                error!("Failed to read log for broadcast: {}", e);
            }
            info!(
                "Data saved from Client {}: {}, {}, {}",
                session_id, record.user_id, record.postcode, record.co2
            );
        }
        Err(e) => {
            error!("Error saving data from Client {}: {}", session_id, e);
            send(tx, Outbound::Line(protocol::error_reply(&e.to_string())))?;
        }
    }

    Ok(())
}

/// Queue one outbound message; a closed channel means the writer task is
/// gone and the peer is unreachable.
fn send(tx: &mpsc::UnboundedSender<Outbound>, message: Outbound) -> crate::Result<()> {
    tx.send(message)
        .map_err(|_| crate::AirLogError::Connection("peer unreachable".to_string()))
}
