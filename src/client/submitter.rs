//! Headless protocol peer for submitting readings to the hub

use crate::config::ClientConfig;
use crate::protocol::{ServerMessage, DISCONNECT};
use crate::types::Record;
use crate::{AirLogError, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

/// A connected submission client.
///
/// Owns the connection and keeps the latest log snapshot it has observed.
/// Graphical front-ends sit on top of this; the hub treats them all as
/// the same protocol peer.
pub struct SubmissionClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    latest_snapshot: Vec<String>,
}

impl SubmissionClient {
    /// Connect to the hub at `host:port` with default settings.
    ///
    /// Fails with a `Connection` error if the hub is unreachable or
    /// answers `SERVER_FULL`.
    pub async fn connect(server_address: &str) -> Result<Self> {
        let config = ClientConfig {
            server_address: server_address.to_string(),
            ..Default::default()
        };
        Self::with_config(config).await
    }

    /// Connect with custom configuration.
    pub async fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let connect_future = TcpStream::connect(&config.server_address);
        let stream = timeout(Duration::from_secs(config.timeout_seconds), connect_future)
            .await
            .map_err(|_| AirLogError::Connection("Connection timeout".to_string()))?
            .map_err(|e| AirLogError::Connection(format!("Failed to connect: {}", e)))?;

        let (read_half, write_half) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            latest_snapshot: Vec::new(),
        };

        // The hub registers a session before acknowledging it, so a
        // broadcast frame triggered by another client can arrive ahead
        // of the greeting.
        loop {
            match client.read_message().await? {
                ServerMessage::Connected => return Ok(client),
                ServerMessage::ServerFull => {
                    return Err(AirLogError::Connection("Server at capacity".to_string()))
                }
                ServerMessage::DataStart => {
                    let frame = client.read_frame_body().await?;
                    client.latest_snapshot = frame;
                }
                other => {
                    return Err(AirLogError::Protocol(format!(
                        "Unexpected greeting: {:?}",
                        other
                    )))
                }
            }
        }
    }

    /// Submit one reading and wait for the hub's verdict. Returns the
    /// server-assigned timestamp on success.
    ///
    /// Snapshot frames arriving before the reply (broadcasts triggered by
    /// other clients) are consumed into [`SubmissionClient::latest_snapshot`].
    pub async fn submit(&mut self, user_id: &str, postcode: &str, co2: &str) -> Result<String> {
        let record = Record::new(user_id, postcode, co2);
        self.send_line(&record.to_string()).await?;

        loop {
            match self.read_message().await? {
                ServerMessage::Success(timestamp) => return Ok(timestamp),
                ServerMessage::Error(reason) => return Err(AirLogError::Client(reason)),
                ServerMessage::DataStart => {
                    let frame = self.read_frame_body().await?;
                    self.latest_snapshot = frame;
                }
                other => {
                    return Err(AirLogError::Protocol(format!(
                        "Unexpected reply to submission: {:?}",
                        other
                    )))
                }
            }
        }
    }

    /// Wait for the next snapshot frame and return its lines. Also
    /// records it as the latest observed snapshot.
    pub async fn next_snapshot(&mut self) -> Result<Vec<String>> {
        loop {
            if let ServerMessage::DataStart = self.read_message().await? {
                let frame = self.read_frame_body().await?;
                self.latest_snapshot = frame.clone();
                return Ok(frame);
            }
        }
    }

    /// The most recent snapshot this client has observed.
    pub fn latest_snapshot(&self) -> &[String] {
        &self.latest_snapshot
    }

    /// Send the disconnect sentinel and close the connection.
    pub async fn disconnect(mut self) -> Result<()> {
        self.send_line(DISCONNECT).await?;
        self.writer.shutdown().await.map_err(AirLogError::Io)?;
        Ok(())
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_message(&mut self) -> Result<ServerMessage> {
        Ok(ServerMessage::parse(&self.read_line().await?))
    }

    /// Lines between `DATA_START` and `DATA_END`.
    async fn read_frame_body(&mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if let ServerMessage::DataEnd = ServerMessage::parse(&line) {
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| AirLogError::Connection(format!("Read failed: {}", e)))?;
        if n == 0 {
            return Err(AirLogError::Connection("Server closed the connection".to_string()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}
