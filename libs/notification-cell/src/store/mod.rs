pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::NotificationError;
use crate::models::Notification;

pub use memory::InMemoryNotificationStore;
pub use supabase::SupabaseNotificationStore;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: Notification) -> Result<Notification, NotificationError>;

    /// Unread notifications of one user, oldest first.
    async fn unread_for(&self, user_id: Uuid) -> Result<Vec<Notification>, NotificationError>;

    /// Only matches a notification addressed to `user_id`.
    async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<Notification, NotificationError>;

    /// Returns how many notifications changed.
    async fn mark_all_read(&self, user_id: Uuid) -> Result<usize, NotificationError>;
}
