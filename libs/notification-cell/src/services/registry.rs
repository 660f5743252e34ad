use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

use crate::error::NotificationError;

/// Writing end of one open client connection.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: Uuid,
    sender: mpsc::Sender<String>,
}

impl ChannelHandle {
    /// Returns the handle and the receiver the connection task drains into its socket.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { id: Uuid::new_v4(), sender }, receiver)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Non-blocking; a full or closed channel is reported, never waited on.
    pub fn deliver(&self, frame: String) -> Result<(), NotificationError> {
        self.sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => NotificationError::Delivery(format!("channel {} is full", self.id)),
            TrySendError::Closed(_) => NotificationError::Delivery(format!("channel {} is closed", self.id)),
        })
    }
}

/// Live connections per user. Never persisted.
#[derive(Default)]
pub struct ConnectionRegistry {
    channels: RwLock<HashMap<Uuid, HashMap<Uuid, ChannelHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: Uuid, handle: ChannelHandle) {
        let mut channels = self.channels.write().await;
        let user_channels = channels.entry(user_id).or_default();
        user_channels.insert(handle.id(), handle);
        debug!("Registered channel for user {} ({} open)", user_id, user_channels.len());
    }

    pub async fn unregister(&self, user_id: Uuid, channel_id: Uuid) {
        let mut channels = self.channels.write().await;
        if let Some(user_channels) = channels.get_mut(&user_id) {
            user_channels.remove(&channel_id);
            if user_channels.is_empty() {
                channels.remove(&user_id);
            }
        }
        debug!("Unregistered channel {} for user {}", channel_id, user_id);
    }

    /// Copy of the user's open handles; sending happens outside the lock.
    pub async fn snapshot(&self, user_id: Uuid) -> Vec<ChannelHandle> {
        let channels = self.channels.read().await;
        channels
            .get(&user_id)
            .map(|user_channels| user_channels.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        self.channels.read().await.get(&user_id).map_or(0, HashMap::len)
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.channels.read().await.keys().copied().collect()
    }
}
