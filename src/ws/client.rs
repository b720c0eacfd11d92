//! WebSocket session with ping keepalive

use super::types::{WsConfig, WsError, WsMessage};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, WebSocketStream};

/// Opens WebSocket sessions against a fixed URL
///
/// A session lives until either side closes it. Reconnection is the
/// caller's concern: every call to [`WsClient::open`] is a fresh session.
#[derive(Debug, Clone)]
pub struct WsClient {
    config: WsConfig,
}

impl WsClient {
    /// Create a new WebSocket client with the given configuration
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    /// Create a new client with just a URL using default config
    pub fn with_url(url: impl Into<String>) -> Self {
        Self::new(WsConfig::new(url))
    }

    /// Get the configured URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Connect and return (frame_receiver, text_sender)
    ///
    /// The receiver yields every inbound frame and ends with exactly one of
    /// [`WsMessage::Closed`] (the sender was dropped) or
    /// [`WsMessage::Disconnected`] (anything else).
    pub async fn open(&self) -> Result<(mpsc::Receiver<WsMessage>, mpsc::Sender<String>), WsError> {
        tracing::info!(url = %self.config.url, "Connecting to WebSocket");

        let (ws_stream, _response) =
            tokio::time::timeout(self.config.connect_timeout, connect_async(self.config.url.as_str()))
                .await
                .map_err(|_| WsError::ConnectTimeout)?
                .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        tracing::info!("WebSocket connected");

        let (msg_tx, msg_rx) = mpsc::channel(self.config.buffer_size);
        let (send_tx, send_rx) = mpsc::channel(256);
        let ping_interval = self.config.ping_interval;

        tokio::spawn(async move {
            let end = match Self::stream(ws_stream, ping_interval, &msg_tx, send_rx).await {
                Ok(()) => {
                    tracing::info!("WebSocket session closed");
                    WsMessage::Closed
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket session ended");
                    WsMessage::Disconnected {
                        reason: e.to_string(),
                    }
                }
            };
            let _ = msg_tx.send(end).await;
        });

        Ok((msg_rx, send_tx))
    }

    /// Pump frames in both directions until the session ends
    async fn stream<S>(
        ws_stream: WebSocketStream<S>,
        ping_interval: Duration,
        tx: &mpsc::Sender<WsMessage>,
        mut send_rx: mpsc::Receiver<String>,
    ) -> Result<(), WsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut write, mut read) = ws_stream.split();

        let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut waiting_for_pong = false;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if tx.send(WsMessage::Text(text)).await.is_err() {
                                tracing::debug!("Receiver dropped, closing connection");
                                let _ = write.send(Message::Close(None)).await;
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            if tx.send(WsMessage::Binary(data)).await.is_err() {
                                let _ = write.send(Message::Close(None)).await;
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            waiting_for_pong = false;
                        }
                        Some(Ok(Message::Close(_))) => {
                            return Err(WsError::ConnectionFailed("closed by peer".into()));
                        }
                        Some(Err(e)) => {
                            return Err(WsError::ConnectionFailed(e.to_string()));
                        }
                        None => {
                            return Err(WsError::ConnectionFailed("Stream ended unexpectedly".into()));
                        }
                        _ => {}
                    }
                }

                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            write.send(Message::Text(text)).await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                        None => {
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    }
                }

                _ = ping.tick() => {
                    if waiting_for_pong {
                        return Err(WsError::ConnectionFailed("Pong timeout".into()));
                    }
                    write.send(Message::Ping(vec![])).await
                        .map_err(|e| WsError::SendFailed(e.to_string()))?;
                    waiting_for_pong = true;
                }
            }
        }
    }
}
