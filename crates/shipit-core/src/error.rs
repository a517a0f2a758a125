//! Error types for shipit.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("command not allowed: '{command}' (allowed: {allowed})")]
    CommandNotAllowed { command: String, allowed: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
