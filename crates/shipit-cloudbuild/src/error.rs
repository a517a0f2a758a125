//! Build session errors.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloudBuildError {
    #[error("build service did not connect within {0:?}")]
    ConnectTimeout(Duration),

    #[error("build did not finish within {0:?}")]
    BuildTimeout(Duration),

    #[error("{action}: {message}")]
    BuildFailure { action: String, message: String },

    #[error("build session transport error: {0}")]
    Transport(String),

    #[error("build session disconnected{}", .0.as_ref().map(|r| format!(": {}", r)).unwrap_or_default())]
    Disconnected(Option<String>),

    #[error("invalid build endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },
}
