//! WebSocket transport built on `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries the duel protocol's JSON text frames over a
//! WebSocket connection; [`WebSocketConnector`] re-dials a fixed URL so the
//! connection loop can recover from drops. `ws://` and `wss://` both work;
//! TLS is handled by [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! Available when the `transport-websocket` feature is enabled (the default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), quickdraw_client::QuickDrawError> {
//! use quickdraw_client::transports::WebSocketTransport;
//! use quickdraw_client::Transport;
//!
//! let mut ws = WebSocketTransport::connect("ws://localhost:8765/duel").await?;
//! ws.send(r#"{"type":"join-queue","arena_index":0,"seq":1}"#.to_string()).await?;
//!
//! if let Some(Ok(msg)) = ws.recv().await {
//!     println!("server said: {msg}");
//! }
//!
//! ws.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::QuickDrawError;
use crate::transport::{Connector, Transport};

/// The stream type produced by [`tokio_tungstenite::connect_async`].
///
/// Public so callers with custom connection setup (TLS config, proxies,
/// extra headers) can build the stream themselves and hand it to
/// [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn dial_error(e: tungstenite::Error) -> QuickDrawError {
    // Preserve the io::ErrorKind when there is one; everything else
    // (bad URL, handshake rejection) collapses to Other.
    let kind = match &e {
        tungstenite::Error::Io(io) => io.kind(),
        _ => std::io::ErrorKind::Other,
    };
    QuickDrawError::Io(std::io::Error::new(kind, e))
}

/// A [`Transport`] carrying duel-protocol text frames over a WebSocket.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping its future mid-poll
/// loses no frames, so it can sit inside a `tokio::select!` arm.
#[derive(Debug)]
pub struct WebSocketTransport {
    inner: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Dial the given `ws://` or `wss://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`QuickDrawError::Io`] when the URL is invalid or the dial
    /// fails. An underlying I/O error keeps its
    /// [`ErrorKind`](std::io::ErrorKind); other failures map to
    /// [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, QuickDrawError> {
        tracing::debug!(url = %url, "dialing duel server");
        let (inner, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(dial_error)?;
        tracing::info!(url = %url, "WebSocket connection established");
        Ok(Self::from_stream(inner))
    }

    /// Wrap an already-established WebSocket stream.
    pub fn from_stream(inner: WsStream) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    /// Like [`connect`](Self::connect), but gives up with
    /// [`QuickDrawError::Timeout`] if the handshake has not completed within
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// [`QuickDrawError::Timeout`] on deadline expiry, otherwise whatever
    /// [`connect`](Self::connect) returns.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: Duration,
    ) -> Result<Self, QuickDrawError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| QuickDrawError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), QuickDrawError> {
        if self.closed {
            return Err(QuickDrawError::TransportClosed);
        }
        self.inner
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| QuickDrawError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, QuickDrawError>> {
        // Non-text frames are control noise as far as the duel protocol is
        // concerned; keep polling until a text frame or end of stream.
        while let Some(item) = self.inner.next().await {
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => return Some(Err(QuickDrawError::TransportReceive(e.to_string()))),
            };
            match frame {
                // Utf8Bytes does not give up its buffer by value, so this
                // copies the payload into a fresh String.
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "server closed the WebSocket");
                    return None;
                }
                // tungstenite queues the pong reply itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(payload) => {
                    tracing::warn!(len = payload.len(), "skipping unexpected binary frame");
                }
                // Never produced by the read half; kept for exhaustiveness.
                Message::Frame(_) => {}
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), QuickDrawError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner
            .close(None)
            .await
            .map_err(|e| QuickDrawError::TransportSend(e.to_string()))
    }
}

/// A [`Connector`] that dials a fixed WebSocket URL.
///
/// The connection loop holds one of these and calls
/// [`connect`](Connector::connect) once initially and again for every
/// reconnect attempt.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    /// Create a connector for the given `ws://` or `wss://` URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: None,
        }
    }

    /// Bound each dial attempt by `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// The URL this connector dials.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&mut self) -> Result<WebSocketTransport, QuickDrawError> {
        match self.connect_timeout {
            Some(timeout) => WebSocketTransport::connect_with_timeout(&self.url, timeout).await,
            None => WebSocketTransport::connect(&self.url).await,
        }
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    type ServerSide = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Bind an ephemeral port, accept one WebSocket connection, and run
    /// `script` against it. Returns the URL a client should dial.
    async fn one_shot_server<F, Fut>(script: F) -> String
    where
        F: FnOnce(ServerSide) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (tcp, _peer) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            script(ws).await;
        });
        url
    }

    /// A server script that drains the connection until the client goes away.
    async fn drain(mut ws: ServerSide) {
        while let Some(Ok(_)) = ws.next().await {}
    }

    #[test]
    fn transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn dial_rejects_garbage_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, QuickDrawError::Io(_)));
    }

    #[tokio::test]
    async fn dial_fails_when_nothing_listens() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, QuickDrawError::Io(_)));
    }

    #[tokio::test]
    async fn text_frames_arrive_in_order() {
        let url = one_shot_server(|mut ws| async move {
            ws.send(Message::Text("howdy".into())).await.unwrap();
            ws.send(Message::Text("partner".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut ws = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(ws.recv().await.unwrap().unwrap(), "howdy");
        assert_eq!(ws.recv().await.unwrap().unwrap(), "partner");
        assert!(ws.recv().await.is_none());
    }

    #[tokio::test]
    async fn server_close_ends_the_stream() {
        let url = one_shot_server(|mut ws| async move {
            ws.close(None).await.unwrap();
        })
        .await;

        let mut ws = WebSocketTransport::connect(&url).await.unwrap();
        assert!(ws.recv().await.is_none());
    }

    #[tokio::test]
    async fn binary_frames_are_skipped_not_surfaced() {
        let url = one_shot_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after-binary".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut ws = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(ws.recv().await.unwrap().unwrap(), "after-binary");
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let url = one_shot_server(drain).await;

        let mut ws = WebSocketTransport::connect(&url).await.unwrap();
        ws.close().await.unwrap();

        let err = ws.send("too late".to_string()).await.unwrap_err();
        assert!(matches!(err, QuickDrawError::TransportClosed));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let url = one_shot_server(drain).await;

        let mut ws = WebSocketTransport::connect(&url).await.unwrap();
        ws.close().await.unwrap();
        ws.close().await.unwrap();
    }

    #[tokio::test]
    async fn recv_after_close_does_not_hang() {
        let url = one_shot_server(drain).await;

        let mut ws = WebSocketTransport::connect(&url).await.unwrap();
        ws.close().await.unwrap();

        match ws.recv().await {
            None | Some(Err(_)) => {}
            Some(Ok(msg)) => panic!("expected end of stream after close, got {msg:?}"),
        }
    }

    #[tokio::test]
    async fn connect_with_timeout_gives_up() {
        // 192.0.2.0/24 is TEST-NET; nothing answers there.
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QuickDrawError::Timeout));
    }

    #[tokio::test]
    async fn from_stream_wraps_an_external_dial() {
        let url = one_shot_server(|mut ws| async move {
            ws.send(Message::Text("wrapped".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let (stream, _response) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let mut ws = WebSocketTransport::from_stream(stream);
        assert_eq!(ws.recv().await.unwrap().unwrap(), "wrapped");
    }

    #[tokio::test]
    async fn connector_redials_for_each_connect() {
        let url = one_shot_server(|mut ws| async move {
            ws.send(Message::Text("first-dial".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut connector = WebSocketConnector::new(url.clone());
        assert_eq!(connector.url(), url);

        let mut ws = connector.connect().await.unwrap();
        assert_eq!(ws.recv().await.unwrap().unwrap(), "first-dial");

        // The script above accepts a single connection, so the second dial
        // fails the way a dead server would during a reconnect window.
        assert!(connector.connect().await.is_err());
    }

    #[tokio::test]
    async fn connector_honors_connect_timeout() {
        let mut connector = WebSocketConnector::new("ws://192.0.2.1:1")
            .with_connect_timeout(Duration::from_millis(50));
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, QuickDrawError::Timeout));
    }
}
