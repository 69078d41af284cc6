//! WebSocket Transport
//!
//! Client-side WebSocket connector. Opens the socket with
//! `tokio-tungstenite`, splits it, and spawns a reader and a writer task
//! bridged to a [`Link`].
//!
//! Frames are raw UTF-8 text in both directions: outbound chat text is sent
//! verbatim and inbound text frames are forwarded untouched. Ping/pong
//! control frames are answered by tungstenite itself.
//!
//! `wss://` endpoints go through rustls with the webpki root store.

use std::sync::Once;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::traits::{CloseInfo, Connector, Link, LinkEvent, Outbound, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

static CRYPTO_PROVIDER: Once = Once::new();

/// Install ring as the process-wide rustls provider
fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        // Err means another provider is already installed, which is fine
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Connector for `ws://` and `wss://` endpoints
#[derive(Clone, Debug, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a new WebSocket connector
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Check that an endpoint is a usable WebSocket URL
///
/// # Errors
///
/// Returns `InvalidEndpoint` if the URL does not parse, does not use the
/// `ws` or `wss` scheme, or has no host.
pub fn validate_endpoint(endpoint: &str) -> Result<(), TransportError> {
    let invalid = |reason: &str| TransportError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let uri: Uri = endpoint.parse().map_err(|_| invalid("not a valid URL"))?;
    match uri.scheme_str() {
        Some("ws" | "wss") => {}
        Some(_) => return Err(invalid("scheme must be ws or wss")),
        None => return Err(invalid("missing scheme")),
    }
    if uri.host().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(())
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, endpoint: &str) -> Result<Link, TransportError> {
        validate_endpoint(endpoint)?;
        install_crypto_provider();

        let (stream, response) = connect_async(endpoint).await.map_err(|e| {
            TransportError::ConnectionFailed(format!("Failed to connect to {endpoint}: {e}"))
        })?;
        tracing::debug!(
            endpoint = %endpoint,
            status = %response.status(),
            "WebSocket handshake complete"
        );

        let (sink, source) = stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(sink, outbound_rx));
        tokio::spawn(read_loop(source, event_tx));

        Ok(Link::new(outbound_tx, event_rx))
    }
}

/// Drain outbound requests into the socket until closed
async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(request) = outbound.recv().await {
        let (message, closing) = match request {
            Outbound::Text(text) => (Message::Text(text), false),
            Outbound::Ping(payload) => (Message::Ping(payload), false),
            Outbound::Close { code, reason } => (
                Message::Close(Some(CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.into(),
                })),
                true,
            ),
        };

        if let Err(e) = sink.send(message).await {
            tracing::warn!(error = %e, "WebSocket write failed");
            return;
        }
        if closing {
            break;
        }
    }

    // Link dropped or close requested: finish the close handshake.
    if let Err(e) = sink.close().await {
        tracing::debug!(error = %e, "WebSocket close after writer shutdown failed");
    }
}

/// Forward socket frames to the link until the connection ends
async fn read_loop(mut source: SplitStream<WsStream>, events: mpsc::UnboundedSender<LinkEvent>) {
    let close = loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => {
                if events.send(LinkEvent::Frame(text)).is_err() {
                    // Link dropped by the manager; nobody is listening.
                    return;
                }
            }
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => {
                    if events.send(LinkEvent::Frame(text)).is_err() {
                        return;
                    }
                }
                Err(_) => tracing::warn!("Dropping non UTF-8 binary frame"),
            },
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) => CloseInfo::clean(u16::from(frame.code), frame.reason),
                    None => CloseInfo {
                        clean: true,
                        code: None,
                        reason: String::new(),
                    },
                };
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                let _ = events.send(LinkEvent::Error(e.to_string()));
                break CloseInfo::unclean(e.to_string());
            }
            None => break CloseInfo::unclean("connection ended without close frame"),
        }
    };

    tracing::debug!(close = %close, "WebSocket reader finished");
    let _ = events.send(LinkEvent::Closed(close));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_endpoint() {
        assert!(validate_endpoint("ws://localhost:8765").is_ok());
        assert!(validate_endpoint("wss://chat.example.com/socket").is_ok());
    }

    #[test]
    fn test_validate_rejects_http() {
        let err = validate_endpoint("http://localhost:8765").unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint { .. }));
        assert!(err.to_string().contains("scheme"));
    }

    #[test]
    fn test_validate_rejects_garbage() {
        assert!(validate_endpoint("not a url").is_err());
        assert!(validate_endpoint("").is_err());
    }

    #[tokio::test]
    async fn test_open_invalid_endpoint_fails_fast() {
        let connector = WebSocketConnector::new();
        let result = connector.open("ftp://localhost").await;
        assert!(matches!(result, Err(TransportError::InvalidEndpoint { .. })));
    }

    #[tokio::test]
    async fn test_open_refused_connection() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = WebSocketConnector::new();
        let result = connector.open(&format!("ws://127.0.0.1:{port}")).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_open_secure_endpoint_starts_tls_handshake() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut first = [0u8; 1];
            socket.read_exact(&mut first).await.unwrap();
            // Hang up instead of answering the ClientHello
            first[0]
        });

        let connector = WebSocketConnector::new();
        let result = connector.open(&format!("wss://127.0.0.1:{port}/chat")).await;

        // 0x16 is the TLS handshake record type
        assert_eq!(server.await.unwrap(), 0x16);
        match result {
            Err(TransportError::ConnectionFailed(msg)) => {
                assert!(!msg.contains("TLS support not compiled in"), "{msg}");
            }
            other => panic!("expected a failed handshake, got {other:?}"),
        }
    }
}
