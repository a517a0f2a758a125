//! Remote build orchestration.
//!
//! A [`CloudBuild`] owns one session with the build service: it opens the
//! connection through a [`BuildTransport`], enforces the connect and build
//! deadlines with a single timer, classifies the service's events, and closes
//! the connection exactly once.

pub mod error;
pub mod orchestrator;
pub mod transport;
pub mod ws;

pub use error::CloudBuildError;
pub use orchestrator::{BuildSession, CloudBuild, CloudBuildOptions, SessionUpdate};
pub use transport::{BuildTransport, Connector, Frame, TransportEvent};
pub use ws::{WsConnector, WsTransport};
