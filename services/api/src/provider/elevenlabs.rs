//! Opens the conversational-agent WebSocket against ElevenLabs.

use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use g1_voice_core::{
    AgentError,
    link::{AgentCredentials, Connector, Link, LinkEvent, LinkSink},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};

type AgentSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct ElevenLabsConnector {
    endpoint: String,
}

impl ElevenLabsConnector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    fn url_for(&self, agent_id: &str) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}agent_id={}", self.endpoint, separator, agent_id)
    }
}

#[async_trait]
impl Connector for ElevenLabsConnector {
    async fn open(&self, credentials: &AgentCredentials) -> Result<Link, AgentError> {
        if let Err(e) = credentials.validate() {
            warn!(error = %e, "Opening agent WebSocket with incomplete credentials");
        }
        let api_key = credentials.api_key.as_deref().unwrap_or_default();
        let agent_id = credentials.agent_id.as_deref().unwrap_or_default();

        let url = self.url_for(agent_id);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| AgentError::Connection(e.to_string()))?;
        request.headers_mut().insert(
            "xi-api-key",
            api_key
                .parse()
                .map_err(|_| AgentError::Configuration("api key".to_string()))?,
        );

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| AgentError::Connection(e.to_string()))?;
        info!(endpoint = %self.endpoint, "Connected to ElevenLabs agent WebSocket");

        let (tx, rx) = ws_stream.split();
        Ok(Link {
            sink: Box::new(WsSink { tx }),
            events: inbound_events(rx),
        })
    }
}

struct WsSink {
    tx: SplitSink<AgentSocket, WsMessage>,
}

#[async_trait]
impl LinkSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), AgentError> {
        self.tx
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| AgentError::Connection(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.tx.close().await;
    }
}

fn inbound_events(rx: SplitStream<AgentSocket>) -> g1_voice_core::link::LinkEvents {
    rx.filter_map(|msg| async move {
        match msg {
            Ok(WsMessage::Text(text)) => Some(LinkEvent::Text(text.to_string())),
            Ok(WsMessage::Close(frame)) => Some(LinkEvent::Closed {
                reason: frame.map(|f| f.reason.to_string()),
            }),
            Ok(other) => {
                debug!(len = other.len(), "Ignoring non-text frame from agent");
                None
            }
            Err(e) => Some(LinkEvent::Closed {
                reason: Some(e.to_string()),
            }),
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_appends_agent_id() {
        let connector = ElevenLabsConnector::new("wss://api.elevenlabs.io/v1/convai/conversation");
        assert_eq!(
            connector.url_for("agent-123"),
            "wss://api.elevenlabs.io/v1/convai/conversation?agent_id=agent-123"
        );

        let connector = ElevenLabsConnector::new("ws://127.0.0.1:9000/convai?debug=1");
        assert_eq!(
            connector.url_for("a"),
            "ws://127.0.0.1:9000/convai?debug=1&agent_id=a"
        );
    }

    #[tokio::test]
    async fn test_open_is_attempted_without_credentials() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
        });

        let connector = ElevenLabsConnector::new(format!("ws://{}/convai", addr));
        let result = connector.open(&AgentCredentials::default()).await;

        // The socket was dialed; the handshake then fails on the silent peer.
        accepted.await.unwrap();
        assert!(matches!(result, Err(AgentError::Connection(_))));
    }
}
