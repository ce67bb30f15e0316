//! AirLog client implementation

pub mod submitter;

pub use submitter::SubmissionClient;
