use std::sync::Arc;

use anyhow::Error as AnyError;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::error::NotificationError;
use crate::models::Notification;
use crate::store::NotificationStore;

pub struct SupabaseNotificationStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseNotificationStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn patch(&self, path: &str) -> Result<Vec<Notification>, NotificationError> {
        self.supabase
            .request_with_headers(
                Method::PATCH,
                path,
                None,
                Some(json!({ "is_read": true })),
                Some(SupabaseClient::representation_headers(None)),
            )
            .await
            .map_err(storage_error)
    }
}

fn storage_error(err: AnyError) -> NotificationError {
    warn!("Notification storage request failed: {}", err);
    NotificationError::StorageUnavailable(err.to_string())
}

#[async_trait]
impl NotificationStore for SupabaseNotificationStore {
    async fn insert(&self, notification: Notification) -> Result<Notification, NotificationError> {
        let body = serde_json::to_value(&notification)
            .map_err(|e| NotificationError::StorageUnavailable(format!("failed to encode notification: {}", e)))?;

        let rows: Vec<Notification> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/notifications",
                None,
                Some(body),
                Some(SupabaseClient::representation_headers(None)),
            )
            .await
            .map_err(storage_error)?;

        debug!("Stored notification {} for user {}", notification.id, notification.user_id);
        Ok(rows.into_iter().next().unwrap_or(notification))
    }

    async fn unread_for(&self, user_id: Uuid) -> Result<Vec<Notification>, NotificationError> {
        let path = format!(
            "/rest/v1/notifications?user_id=eq.{}&is_read=eq.false&order=created_at.asc",
            user_id
        );
        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(storage_error)
    }

    async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<Notification, NotificationError> {
        let path = format!("/rest/v1/notifications?id=eq.{}&user_id=eq.{}", notification_id, user_id);
        self.patch(&path)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| NotificationError::NotFound(format!("Notification {}", notification_id)))
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<usize, NotificationError> {
        let path = format!("/rest/v1/notifications?user_id=eq.{}&is_read=eq.false", user_id);
        Ok(self.patch(&path).await?.len())
    }
}
