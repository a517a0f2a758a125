//! Provider and local git errors.

use thiserror::Error;

/// Errors from a git hosting provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request never produced a server response (network, DNS, timeout).
    #[error("request failed: {0}")]
    Transport(String),

    /// The provider answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("{provider} does not support {operation} yet")]
    NotImplemented {
        provider: &'static str,
        operation: &'static str,
    },

    #[error("no access token set for {0}")]
    MissingToken(&'static str),

    #[error("parse error: {0}")]
    Parse(String),
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Local git operation errors.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("unresolved conflicts in: {}", .0.join(", "))]
    Conflicts(Vec<String>),

    #[error("branch {branch} has commits that are not in HEAD")]
    Diverged { branch: String },
}
