//! WebSocket transport for the build service.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use shipit_core::build::BuildRequest;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;

use crate::transport::{BuildTransport, Connector, Frame, TransportEvent};
use crate::CloudBuildError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum WsState {
    Pending,
    Open(Box<Socket>),
    Closed,
}

/// JSON-framed WebSocket connection to the build service.
pub struct WsTransport {
    url: Url,
    state: WsState,
}

impl WsTransport {
    /// Prepare a connection to `endpoint` carrying the session parameters as
    /// query string. Nothing is sent until the first `recv`.
    pub fn new(endpoint: &str, request: &BuildRequest) -> Result<Self, CloudBuildError> {
        let mut url =
            Url::parse(endpoint).map_err(|e| CloudBuildError::InvalidEndpoint(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(CloudBuildError::InvalidEndpoint(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        url.query_pairs_mut().extend_pairs(request.query_pairs());

        Ok(Self {
            url,
            state: WsState::Pending,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl BuildTransport for WsTransport {
    async fn recv(&mut self) -> Option<TransportEvent> {
        loop {
            match &mut self.state {
                WsState::Pending => match connect_async(self.url.as_str()).await {
                    Ok((socket, _response)) => {
                        debug!(host = ?self.url.host_str(), "WebSocket connected");
                        self.state = WsState::Open(Box::new(socket));
                    }
                    Err(e) => {
                        self.state = WsState::Closed;
                        return Some(TransportEvent::Error(e.to_string()));
                    }
                },
                WsState::Open(socket) => match socket.next().await {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Frame>(text.as_str()) {
                            Ok(frame) => return Some(frame.into_event()),
                            Err(e) => warn!(error = %e, "Ignoring malformed frame"),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        self.state = WsState::Closed;
                        return Some(TransportEvent::Disconnected {
                            reason: frame
                                .map(|f| f.reason.as_str().to_string())
                                .filter(|r| !r.is_empty()),
                        });
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.state = WsState::Closed;
                        return Some(TransportEvent::Error(e.to_string()));
                    }
                    None => {
                        self.state = WsState::Closed;
                        return Some(TransportEvent::Disconnected { reason: None });
                    }
                },
                WsState::Closed => return None,
            }
        }
    }

    async fn emit(&mut self, event: &str, payload: Value) -> Result<(), CloudBuildError> {
        let WsState::Open(socket) = &mut self.state else {
            return Err(CloudBuildError::Transport(format!(
                "cannot emit '{}' on a connection that is not open",
                event
            )));
        };

        let text = serde_json::to_string(&Frame::new(event, payload))
            .map_err(|e| CloudBuildError::Transport(e.to_string()))?;
        socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| CloudBuildError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if let WsState::Open(socket) = &mut self.state {
            if let Err(e) = socket.close().await {
                debug!(error = %e, "WebSocket close handshake failed");
            }
        }
        self.state = WsState::Closed;
    }
}

/// Opens [`WsTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Transport = WsTransport;

    fn open(&self, endpoint: &str, request: &BuildRequest) -> Result<WsTransport, CloudBuildError> {
        WsTransport::new(endpoint, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BuildRequest {
        BuildRequest {
            repo: "git@gitee.com:alice/app.git".to_string(),
            name: "app".to_string(),
            branch: "dev/1.0.0".to_string(),
            version: "1.0.0".to_string(),
            build_command: "npm run build".to_string(),
        }
    }

    #[test]
    fn test_url_carries_session_parameters() {
        let transport = WsTransport::new("ws://127.0.0.1:7001", &request()).unwrap();
        let pairs: Vec<(String, String)> = transport
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(
            pairs,
            vec![
                ("repo".to_string(), "git@gitee.com:alice/app.git".to_string()),
                ("name".to_string(), "app".to_string()),
                ("branch".to_string(), "dev/1.0.0".to_string()),
                ("version".to_string(), "1.0.0".to_string()),
                ("buildCmd".to_string(), "npm run build".to_string()),
            ]
        );
    }

    #[test]
    fn test_rejects_non_websocket_endpoint() {
        assert!(matches!(
            WsTransport::new("http://127.0.0.1:7001", &request()),
            Err(CloudBuildError::InvalidEndpoint(_))
        ));
        assert!(WsTransport::new("not a url", &request()).is_err());
    }

    #[tokio::test]
    async fn test_emit_before_connect_fails() {
        let mut transport = WsTransport::new("ws://127.0.0.1:7001", &request()).unwrap();
        assert!(transport.emit("build", Value::Null).await.is_err());
    }

    #[tokio::test]
    async fn test_closed_transport_yields_nothing() {
        let mut transport = WsTransport::new("ws://127.0.0.1:7001", &request()).unwrap();
        transport.close().await;
        assert!(transport.recv().await.is_none());
    }
}
