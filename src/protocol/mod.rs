//! Line-oriented wire protocol between hub and clients
//!
//! Every message is one UTF-8 line. Clients send either the disconnect
//! sentinel or a pipe-separated submission; the hub answers with the
//! markers below. Snapshots travel framed between [`DATA_START`] and
//! [`DATA_END`].

/// Sent once to a client right after its session is registered.
pub const CONNECTED: &str = "CONNECTED";
/// Opens a snapshot frame.
pub const DATA_START: &str = "DATA_START";
/// Closes a snapshot frame.
pub const DATA_END: &str = "DATA_END";
/// Sent bare to a connection rejected at admission, then the socket closes.
pub const SERVER_FULL: &str = "SERVER_FULL";
/// Client-sent sentinel requesting an orderly disconnect.
pub const DISCONNECT: &str = "DISCONNECT";
/// Prefix of the reply to a successfully appended submission.
pub const SUCCESS_PREFIX: &str = "SUCCESS:";
/// Prefix of an error reply (malformed submission or persistence failure).
pub const ERROR_PREFIX: &str = "ERROR:";
/// Error message sent for a submission with the wrong field count.
pub const INVALID_FORMAT: &str = "Invalid format";

/// A parsed server-to-client message, as seen by a protocol peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Session accepted and registered
    Connected,
    /// Connection rejected, server at capacity
    ServerFull,
    /// Start of a snapshot frame
    DataStart,
    /// End of a snapshot frame
    DataEnd,
    /// Submission appended at the carried timestamp
    Success(String),
    /// Submission failed with the carried reason
    Error(String),
    /// A raw log line inside a snapshot frame
    DataLine(String),
}

impl ServerMessage {
    /// Classify one server line. Lines outside a frame that match no
    /// marker still parse as [`ServerMessage::DataLine`]; the caller's
    /// framing state decides what a raw line means.
    pub fn parse(line: &str) -> Self {
        match line {
            CONNECTED => ServerMessage::Connected,
            SERVER_FULL => ServerMessage::ServerFull,
            DATA_START => ServerMessage::DataStart,
            DATA_END => ServerMessage::DataEnd,
            _ => {
                if let Some(ts) = line.strip_prefix(SUCCESS_PREFIX) {
                    ServerMessage::Success(ts.to_string())
                } else if let Some(msg) = line.strip_prefix(ERROR_PREFIX) {
                    ServerMessage::Error(msg.to_string())
                } else {
                    ServerMessage::DataLine(line.to_string())
                }
            }
        }
    }
}

/// Format the success reply for an assigned timestamp.
pub fn success_reply(timestamp: &str) -> String {
    format!("{}{}", SUCCESS_PREFIX, timestamp)
}

/// Format an error reply.
pub fn error_reply(message: &str) -> String {
    format!("{}{}", ERROR_PREFIX, message)
}
