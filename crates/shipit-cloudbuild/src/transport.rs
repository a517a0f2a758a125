//! The connection between the orchestrator and the build service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shipit_core::build::BuildRequest;

use crate::CloudBuildError;

/// Something that happened on the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The service accepted the session and assigned it an id.
    Connected { id: String },
    /// A named message from the service.
    Message { event: String, payload: Value },
    /// The connection ended.
    Disconnected { reason: Option<String> },
    /// The connection failed.
    Error(String),
}

/// One JSON text frame on the wire: `{"event": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Map the reserved `connect`, `disconnect` and `error` events; every
    /// other event name is a message.
    pub fn into_event(self) -> TransportEvent {
        match self.event.as_str() {
            "connect" => match self.payload.get("id").and_then(Value::as_str) {
                Some(id) => TransportEvent::Connected { id: id.to_string() },
                None => TransportEvent::Error("connect frame without session id".to_string()),
            },
            "disconnect" => TransportEvent::Disconnected {
                reason: payload_text(&self.payload),
            },
            "error" => TransportEvent::Error(
                payload_text(&self.payload).unwrap_or_else(|| "unknown error".to_string()),
            ),
            _ => TransportEvent::Message {
                event: self.event,
                payload: self.payload,
            },
        }
    }
}

fn payload_text(payload: &Value) -> Option<String> {
    match payload {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(other.to_string())),
    }
}

/// A bidirectional, event-oriented connection to the build service.
///
/// Opening is lazy: the first [`recv`](BuildTransport::recv) establishes the
/// connection and yields [`TransportEvent::Connected`] once the service
/// assigns a session id.
#[async_trait]
pub trait BuildTransport: Send {
    /// Next event, or `None` once the transport is closed.
    async fn recv(&mut self) -> Option<TransportEvent>;

    /// Send a named event to the service.
    async fn emit(&mut self, event: &str, payload: Value) -> Result<(), CloudBuildError>;

    /// Close the connection. Further `recv` calls return `None`.
    async fn close(&mut self);
}

/// Creates transports for new sessions.
pub trait Connector: Send + Sync {
    type Transport: BuildTransport;

    fn open(&self, endpoint: &str, request: &BuildRequest)
    -> Result<Self::Transport, CloudBuildError>;
}
