use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::NotificationError;
use crate::models::Notification;
use crate::store::NotificationStore;

#[derive(Default)]
pub struct InMemoryNotificationStore {
    notifications: RwLock<HashMap<Uuid, Notification>>,
    unavailable: AtomicBool,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn all_for(&self, user_id: Uuid) -> Vec<Notification> {
        let notifications = self.notifications.read().await;
        let mut found: Vec<Notification> = notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|n| n.created_at);
        found
    }

    fn check_available(&self) -> Result<(), NotificationError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(NotificationError::StorageUnavailable(
                "in-memory store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn insert(&self, notification: Notification) -> Result<Notification, NotificationError> {
        self.check_available()?;
        let mut notifications = self.notifications.write().await;
        notifications.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn unread_for(&self, user_id: Uuid) -> Result<Vec<Notification>, NotificationError> {
        self.check_available()?;
        Ok(self
            .all_for(user_id)
            .await
            .into_iter()
            .filter(|n| !n.is_read)
            .collect())
    }

    async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<Notification, NotificationError> {
        self.check_available()?;
        let mut notifications = self.notifications.write().await;
        match notifications.get_mut(&notification_id) {
            Some(notification) if notification.user_id == user_id => {
                notification.is_read = true;
                Ok(notification.clone())
            }
            _ => Err(NotificationError::NotFound(format!("Notification {}", notification_id))),
        }
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<usize, NotificationError> {
        self.check_available()?;
        let mut notifications = self.notifications.write().await;
        let mut changed = 0;
        for notification in notifications.values_mut() {
            if notification.user_id == user_id && !notification.is_read {
                notification.is_read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }
}
