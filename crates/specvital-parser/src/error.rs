//! Structured error handling for the parser adapter
//!
//! Errors from the external parser are returned uninterpreted per this
//! crate's contract; the analyze orchestrator is responsible for wrapping
//! them as a `ScanFailed` category.

use thiserror::Error;

pub type ParserResult<T> = std::result::Result<T, ParserError>;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("failed to launch parser binary '{binary_path}': {message}")]
    LaunchFailed { binary_path: String, message: String },

    #[error("parser scan exceeded its timeout")]
    TimedOut,

    #[error("parser exited with status {status}: {stderr}")]
    NonZeroExit { status: i32, stderr: String },

    #[error("failed to parse parser output as JSON: {message}")]
    MalformedOutput { message: String },
}
