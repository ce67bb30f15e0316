//! Submitted measurement records and their CSV representation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed header row of the shared log. Always line 1 of the file.
pub const CSV_HEADER: &str = "User ID,Timestamp,Postcode,CO2(ppm)";

/// One submitted measurement, as received from a client.
///
/// Fields are stored as received; the hub does not validate postcode or
/// CO2 semantics (a presentation-side concern). The timestamp is not part
/// of the record: it is assigned server-side at the instant of append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Opaque submitter identifier
    pub user_id: String,
    /// Free-text postcode
    pub postcode: String,
    /// CO2 concentration in ppm, kept as the string the client sent
    pub co2: String,
}

impl Record {
    /// Create a record from its three fields
    pub fn new(
        user_id: impl Into<String>,
        postcode: impl Into<String>,
        co2: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            postcode: postcode.into(),
            co2: co2.into(),
        }
    }

    /// Parse the wire submission form `userId|postcode|co2`.
    ///
    /// Returns `None` unless the line has exactly three pipe-separated
    /// fields. Empty fields are accepted; field content is not validated.
    /// Trailing empty fields count: `u1|AB12|` is a valid submission with
    /// an empty CO2 value, while `u1|AB12|450|` has four fields and is
    /// rejected.
    pub fn from_submission(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() != 3 {
            return None;
        }
        Some(Self::new(parts[0], parts[1], parts[2]))
    }

    /// Format as one CSV log line with the given server-assigned timestamp.
    pub fn to_csv_line(&self, timestamp: &str) -> String {
        format!(
            "{},{},{},{}",
            escape_csv(&self.user_id),
            escape_csv(timestamp),
            escape_csv(&self.postcode),
            escape_csv(&self.co2)
        )
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.user_id, self.postcode, self.co2)
    }
}

/// Escape one CSV field, RFC 4180 style.
///
/// Fields containing a comma, quote, CR or LF are wrapped in quotes and
/// embedded quotes are doubled; anything else passes through unchanged.
pub fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Undo [`escape_csv`] on a single field.
pub fn unescape_csv(field: &str) -> String {
    let stripped = field
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(field);
    stripped.replace("\"\"", "\"")
}
