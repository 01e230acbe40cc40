//! WebSocket room transport.
//!
//! Carries the JSON data channel of the agent room: control commands in,
//! verification results out. Media tracks are the full transport
//! library's concern and are not carried here. The socket is already
//! reliable and ordered, so the `reliable` flag and topic are accepted
//! for interface symmetry but not framed onto the wire.

use crate::error::{Result, VoxgateError};
use crate::room::{EVENT_CHANNEL_CAPACITY, RoomEvent, RoomTransport};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Data channel over a WebSocket connection.
///
/// The join credential is passed as an `access_token` query parameter,
/// which is how the room server expects short-lived join tokens.
pub struct WsRoomTransport {
    outbound: Option<mpsc::UnboundedSender<Message>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl WsRoomTransport {
    pub fn new() -> Self {
        Self {
            outbound: None,
            reader: None,
            writer: None,
        }
    }

    fn abort_tasks(&mut self) {
        if let Some(task) = self.reader.take() {
            task.abort();
        }
        if let Some(task) = self.writer.take() {
            task.abort();
        }
    }
}

impl Default for WsRoomTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WsRoomTransport {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

#[async_trait]
impl RoomTransport for WsRoomTransport {
    async fn connect(&mut self, url: &str, credential: &str) -> Result<mpsc::Receiver<RoomEvent>> {
        let request_url = if credential.is_empty() {
            url.to_string()
        } else {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{}{}access_token={}", url, separator, credential)
        };

        let (stream, _) = tokio_tungstenite::connect_async(request_url.as_str())
            .await
            .map_err(|e| VoxgateError::RoomConnection {
                message: e.to_string(),
            })?;

        let (mut write, mut read) = stream.split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

        self.writer = Some(tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if write.send(message).await.is_err() {
                    break;
                }
            }
        }));

        self.reader = Some(tokio::spawn(async move {
            let _ = event_tx.send(RoomEvent::Connected).await;
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let event = RoomEvent::DataReceived {
                            payload: text.into_bytes(),
                            topic: None,
                        };
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(payload))) => {
                        let event = RoomEvent::DataReceived {
                            payload,
                            topic: None,
                        };
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = event_tx.send(RoomEvent::Disconnected).await;
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong/frame, nothing to surface
                    Some(Err(_)) => {
                        let _ = event_tx.send(RoomEvent::Disconnected).await;
                        break;
                    }
                }
            }
        }));

        self.outbound = Some(out_tx);
        Ok(event_rx)
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Message::Close(None));
        }
        self.abort_tasks();
        Ok(())
    }

    async fn publish_data(
        &self,
        payload: &[u8],
        _reliable: bool,
        _topic: Option<&str>,
    ) -> Result<()> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or(VoxgateError::RoomConnectionLost)?;
        let text = String::from_utf8_lossy(payload).into_owned();
        outbound
            .send(Message::Text(text))
            .map_err(|_| VoxgateError::RoomConnectionLost)
    }
}
