//! WebSocket link.

use std::borrow::Cow;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use super::error::TransportResult;
use super::event::TransportKind;
use super::link::{Dialer, Link, Wire};

/// Close code reported when the peer sent a close frame without a code.
const CLOSE_NO_STATUS: u16 = 1005;

/// Opens WebSocket links to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebSocketDialer {
    url: String,
}

impl WebSocketDialer {
    /// Dialer for `url` (`ws://` or `wss://`).
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Dialer for WebSocketDialer {
    type Link = WebSocketLink;

    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn dial(&self) -> TransportResult<WebSocketLink> {
        let (stream, response) = connect_async(self.url.as_str()).await?;
        debug!(url = %self.url, status = %response.status(), "websocket opened");
        Ok(WebSocketLink { stream })
    }
}

/// An open WebSocket.
pub struct WebSocketLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Link for WebSocketLink {
    async fn send(&mut self, wire: Wire) -> TransportResult<()> {
        let message = match wire {
            Wire::Text(text) => Message::Text(text),
            Wire::Binary(bytes) => Message::Binary(bytes.to_vec()),
            Wire::Close { code, reason } => Message::Close(Some(close_frame(code, &reason))),
        };
        self.stream.send(message).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<TransportResult<Wire>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(e.into())),
            };

            match message {
                Message::Text(text) => return Some(Ok(Wire::Text(text))),
                Message::Binary(data) => return Some(Ok(Wire::Binary(Bytes::from(data)))),
                Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((CLOSE_NO_STATUS, String::new()));
                    return Some(Ok(Wire::Close { code, reason }));
                }
                // tungstenite answers pings itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> TransportResult<()> {
        match self.stream.close(Some(close_frame(code, reason))).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn close_frame(code: u16, reason: &str) -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::from(code),
        reason: Cow::Owned(reason.to_string()),
    }
}
