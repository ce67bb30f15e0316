//! Record types and CSV utilities

pub mod record;

pub use record::{escape_csv, unescape_csv, Record, CSV_HEADER};
