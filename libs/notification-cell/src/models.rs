use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row of the `notifications` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn unread(user_id: Uuid, message: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            message,
            is_read: false,
            created_at: now,
        }
    }

    pub fn payload(&self) -> NotificationPayload {
        NotificationPayload {
            kind: "notification".to_string(),
            id: self.id,
            message: self.message.clone(),
            created_at: self.created_at,
            is_read: self.is_read,
        }
    }

    pub fn view(&self) -> NotificationView {
        NotificationView {
            id: self.id,
            user_id: self.user_id,
            message: self.message.clone(),
            is_read: self.is_read,
            created_at: self.created_at,
        }
    }
}

/// Frame pushed over a live channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
