//! Real-time room transport seam.
//!
//! The transport library itself (media tracks, reconnection, congestion)
//! is an external collaborator; the core only needs to join a room with
//! a credential, receive events, and publish data-channel payloads. The
//! trait keeps the coordinator testable and lets a richer transport be
//! dropped in without touching turn logic.

#[cfg(feature = "ws-transport")]
pub mod ws;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Buffered room events between the transport's reader and the
/// coordinator's loop.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events emitted by a room connection.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// The room join completed.
    Connected,
    /// The connection dropped or was closed by the server.
    Disconnected,
    /// A data-channel payload arrived.
    DataReceived {
        payload: Vec<u8>,
        topic: Option<String>,
    },
    /// The remote peer published a media track (the agent is audible).
    TrackSubscribed,
}

/// Connection to a real-time room with a data channel.
#[async_trait]
pub trait RoomTransport: Send + Sync {
    /// Join the room at `url` using `credential`.
    ///
    /// Returns the event stream for this connection. The stream closing
    /// is equivalent to a `Disconnected` event.
    async fn connect(&mut self, url: &str, credential: &str) -> Result<mpsc::Receiver<RoomEvent>>;

    /// Leave the room and drop the connection.
    async fn disconnect(&mut self) -> Result<()>;

    /// Publish a data-channel payload to the remote peer.
    async fn publish_data(
        &self,
        payload: &[u8],
        reliable: bool,
        topic: Option<&str>,
    ) -> Result<()>;
}

/// A payload recorded by [`MockRoom`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub payload: Vec<u8>,
    pub reliable: bool,
    pub topic: Option<String>,
}

/// Test handle shared with a [`MockRoom`]: inspects published payloads
/// and injects room events after the mock has been moved into the
/// coordinator.
#[derive(Clone, Default)]
pub struct MockRoomHandle {
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    event_tx: Arc<Mutex<Option<mpsc::Sender<RoomEvent>>>>,
    connected: Arc<AtomicBool>,
}

impl MockRoomHandle {
    /// All payloads published so far, in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// True between connect and disconnect.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Deliver an event to the connection's stream. Returns false if no
    /// connection is active.
    pub async fn inject(&self, event: RoomEvent) -> bool {
        let sender = self.event_tx.lock().ok().and_then(|tx| tx.clone());
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }
}

/// In-memory room transport for tests.
#[derive(Default)]
pub struct MockRoom {
    handle: MockRoomHandle,
    fail_connect: Option<String>,
    fail_publish: Option<String>,
    auto_ack: bool,
}

impl MockRoom {
    /// A room that accepts connections and immediately acks with
    /// `Connected`.
    pub fn new() -> Self {
        Self {
            auto_ack: true,
            ..Self::default()
        }
    }

    /// Suppress the automatic `Connected` ack; tests inject it manually.
    pub fn without_auto_ack(mut self) -> Self {
        self.auto_ack = false;
        self
    }

    /// Fail the connect call with the given message.
    pub fn with_connect_failure(mut self, message: &str) -> Self {
        self.fail_connect = Some(message.to_string());
        self
    }

    /// Fail publish calls with the given message.
    pub fn with_publish_failure(mut self, message: &str) -> Self {
        self.fail_publish = Some(message.to_string());
        self
    }

    /// The shared test handle.
    pub fn handle(&self) -> MockRoomHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl RoomTransport for MockRoom {
    async fn connect(&mut self, _url: &str, _credential: &str) -> Result<mpsc::Receiver<RoomEvent>> {
        if let Some(message) = &self.fail_connect {
            return Err(crate::error::VoxgateError::RoomConnection {
                message: message.clone(),
            });
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        if self.auto_ack {
            let _ = tx.send(RoomEvent::Connected).await;
        }
        if let Ok(mut slot) = self.handle.event_tx.lock() {
            *slot = Some(tx);
        }
        self.handle.connected.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.handle.connected.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.handle.event_tx.lock() {
            *slot = None;
        }
        Ok(())
    }

    async fn publish_data(
        &self,
        payload: &[u8],
        reliable: bool,
        topic: Option<&str>,
    ) -> Result<()> {
        if let Some(message) = &self.fail_publish {
            return Err(crate::error::VoxgateError::RoomConnection {
                message: message.clone(),
            });
        }
        if let Ok(mut published) = self.handle.published.lock() {
            published.push(PublishedMessage {
                payload: payload.to_vec(),
                reliable,
                topic: topic.map(str::to_string),
            });
        }
        Ok(())
    }
}
