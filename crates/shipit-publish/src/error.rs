//! Publish errors.
//!
//! Every stage failure is reported as one [`PublishError`]; the per-crate
//! errors below it convert in with `?`.

use shipit_cloudbuild::CloudBuildError;
use shipit_config::ConfigError;
use shipit_git::{GitError, ProviderError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("command not allowed: '{command}' (allowed: {allowed})")]
    CommandNotAllowed { command: String, allowed: String },

    #[error("not found: {0}")]
    ProviderNotFound(String),

    #[error("provider API error ({status}): {message}")]
    ProviderApi { status: u16, message: String },

    #[error("{provider} does not support {operation} yet")]
    NotImplemented {
        provider: &'static str,
        operation: &'static str,
    },

    #[error("network error: {0}")]
    Transport(String),

    #[error("build service did not connect within {0:?}")]
    ConnectTimeout(Duration),

    #[error("{action}: {message}")]
    BuildFailure { action: String, message: String },

    #[error("build did not finish within {0:?}")]
    BuildTimeout(Duration),

    #[error("build session disconnected{}", .0.as_ref().map(|r| format!(": {}", r)).unwrap_or_default())]
    Disconnected(Option<String>),

    #[error("unresolved conflicts in: {}", .0.join(", "))]
    Conflict(Vec<String>),

    #[error("git error: {0}")]
    Git(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },
}

pub type PublishResult<T> = std::result::Result<T, PublishError>;

impl From<shipit_core::Error> for PublishError {
    fn from(e: shipit_core::Error) -> Self {
        match e {
            shipit_core::Error::Precondition(msg) => PublishError::Precondition(msg),
            shipit_core::Error::CommandNotAllowed { command, allowed } => {
                PublishError::CommandNotAllowed { command, allowed }
            }
            shipit_core::Error::InvalidInput(msg) => PublishError::Precondition(msg),
            shipit_core::Error::Io(e) => PublishError::Precondition(e.to_string()),
        }
    }
}

impl From<ProviderError> for PublishError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Api { status: 404, message } => PublishError::ProviderNotFound(message),
            ProviderError::Api { status, message } => PublishError::ProviderApi { status, message },
            ProviderError::NotImplemented {
                provider,
                operation,
            } => PublishError::NotImplemented {
                provider,
                operation,
            },
            ProviderError::Transport(msg) => PublishError::Transport(msg),
            ProviderError::MissingToken(provider) => {
                PublishError::Precondition(format!("no access token set for {}", provider))
            }
            ProviderError::Parse(msg) => PublishError::ProviderApi {
                status: 200,
                message: format!("unexpected response: {}", msg),
            },
        }
    }
}

impl From<GitError> for PublishError {
    fn from(e: GitError) -> Self {
        match e {
            GitError::Conflicts(files) => PublishError::Conflict(files),
            diverged @ GitError::Diverged { .. } => PublishError::Precondition(diverged.to_string()),
            other => PublishError::Git(other.to_string()),
        }
    }
}

impl From<CloudBuildError> for PublishError {
    fn from(e: CloudBuildError) -> Self {
        match e {
            CloudBuildError::ConnectTimeout(d) => PublishError::ConnectTimeout(d),
            CloudBuildError::BuildTimeout(d) => PublishError::BuildTimeout(d),
            CloudBuildError::BuildFailure { action, message } => {
                PublishError::BuildFailure { action, message }
            }
            CloudBuildError::Transport(msg) => PublishError::Transport(msg),
            CloudBuildError::Disconnected(reason) => PublishError::Disconnected(reason),
            CloudBuildError::InvalidEndpoint(msg) => PublishError::Config(msg),
            CloudBuildError::InvalidState { operation, state } => PublishError::InvalidState {
                operation,
                state: format!("build session is {}", state),
            },
        }
    }
}

impl From<ConfigError> for PublishError {
    fn from(e: ConfigError) -> Self {
        PublishError::Config(e.to_string())
    }
}
