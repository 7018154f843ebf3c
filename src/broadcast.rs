//! Fan-out of change frames to connected WebSocket sessions.
//!
//! Each session gets a bounded queue. Delivery never waits: a session whose
//! queue is full or whose receiver is gone is dropped, and the client is
//! expected to reconnect and re-read what it cares about. Nothing is
//! replayed on connect.

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::ChangeFrame;

/// Frames buffered per session before it counts as too slow.
const SESSION_BUFFER: usize = 256;

#[derive(Default)]
pub struct EventBroadcaster {
    clients: DashMap<String, mpsc::Sender<ChangeFrame>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session and returns its id and frame receiver.
    pub fn subscribe(&self) -> (String, mpsc::Receiver<ChangeFrame>) {
        let client_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        self.clients.insert(client_id.clone(), tx);
        tracing::debug!(client_id = client_id.as_str(), "session subscribed");
        (client_id, rx)
    }

    pub fn unsubscribe(&self, client_id: &str) {
        if self.clients.remove(client_id).is_some() {
            tracing::debug!(client_id, "session unsubscribed");
        }
    }

    /// Delivers `frame` to every session, returning how many accepted it.
    pub fn broadcast(&self, frame: ChangeFrame) -> usize {
        let mut delivered = 0;
        let mut dropped = Vec::new();

        for entry in self.clients.iter() {
            match entry.value().try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        client_id = entry.key().as_str(),
                        "session queue full, disconnecting"
                    );
                    dropped.push(entry.key().clone());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dropped.push(entry.key().clone()),
            }
        }

        for client_id in dropped {
            self.clients.remove(&client_id);
        }

        tracing::debug!(
            event = ?frame.event,
            path = frame.path.as_str(),
            delivered,
            "change broadcast"
        );
        delivered
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
