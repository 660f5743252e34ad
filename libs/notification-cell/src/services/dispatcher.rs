use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::events::BookingEvent;

use crate::error::NotificationError;
use crate::models::Notification;
use crate::services::registry::{ChannelHandle, ConnectionRegistry};
use crate::store::NotificationStore;

/// What happened for one recipient of one event.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub notification: Notification,
    pub persisted: bool,
    pub pushed_to: usize,
}

/// Turns booking events into stored notifications and pushes them to live channels.
///
/// Only reads the connection registry; handles are added and removed by the
/// websocket handlers.
///
/// Delivery is best effort. Nothing here can fail or undo the booking that
/// produced the event.
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    registry: Arc<ConnectionRegistry>,
    display_offset: FixedOffset,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn NotificationStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            store,
            registry,
            display_offset: Utc.fix(),
        }
    }

    pub fn from_app_config(
        store: Arc<dyn NotificationStore>,
        registry: Arc<ConnectionRegistry>,
        config: &AppConfig,
    ) -> Self {
        let mut dispatcher = Self::new(store, registry);
        let offset = config
            .schedule_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt);
        match offset {
            Some(offset) => dispatcher.display_offset = offset,
            None => warn!("Invalid schedule offset {} minutes, showing times in UTC",
                          config.schedule_utc_offset_minutes),
        }
        dispatcher
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Consumes events in queue order until every sender is dropped.
    #[instrument(skip_all, name = "notification_dispatcher")]
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<BookingEvent>) {
        info!("Notification dispatcher started");
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
        }
        info!("Notification dispatcher stopped, event queue closed");
    }

    pub async fn dispatch(&self, event: BookingEvent) -> Vec<DispatchReport> {
        let message = self.message_for(&event);
        let now = Utc::now();
        let mut reports = Vec::new();

        for user_id in event.recipients() {
            reports.push(self.notify(user_id, message.clone(), now).await);
        }

        debug!("Dispatched event for appointment {} to {} recipients",
               event.appointment_id(), reports.len());
        reports
    }

    /// Persist first, then push to every open channel of the user.
    pub async fn notify(&self, user_id: Uuid, message: String, now: DateTime<Utc>) -> DispatchReport {
        let draft = Notification::unread(user_id, message, now);

        let (notification, persisted) = match self.store.insert(draft.clone()).await {
            Ok(stored) => (stored, true),
            Err(e) => {
                error!("Failed to store notification for user {}: {}", user_id, e);
                (draft, false)
            }
        };

        let pushed_to = self.push(user_id, &notification).await;
        DispatchReport { notification, persisted, pushed_to }
    }

    /// Sends the unread backlog to a newly opened channel, oldest first.
    pub async fn deliver_backlog(&self, user_id: Uuid, handle: &ChannelHandle) -> Result<usize, NotificationError> {
        let unread = self.store.unread_for(user_id).await?;
        let mut sent = 0;
        for notification in &unread {
            match frame(notification).and_then(|text| handle.deliver(text)) {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!("Backlog delivery to user {} stopped: {}", user_id, e);
                    break;
                }
            }
        }
        debug!("Delivered {} of {} unread notifications to user {}", sent, unread.len(), user_id);
        Ok(sent)
    }

    pub async fn unread_for(&self, user_id: Uuid) -> Result<Vec<Notification>, NotificationError> {
        self.store.unread_for(user_id).await
    }

    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> Result<Notification, NotificationError> {
        self.store.mark_read(user_id, notification_id).await
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<usize, NotificationError> {
        self.store.mark_all_read(user_id).await
    }

    pub fn message_for(&self, event: &BookingEvent) -> String {
        match event {
            BookingEvent::BookingConfirmed { slot_date, slot_start, .. } => format!(
                "New appointment booking for {} at {}",
                format_date(*slot_date),
                self.format_time(*slot_start)
            ),
            BookingEvent::BookingCancelled { slot_date, slot_start, .. } => format!(
                "Appointment on {} at {} was cancelled",
                format_date(*slot_date),
                self.format_time(*slot_start)
            ),
        }
    }

    fn format_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.display_offset).format("%H:%M").to_string()
    }

    async fn push(&self, user_id: Uuid, notification: &Notification) -> usize {
        let channels = self.registry.snapshot(user_id).await;
        if channels.is_empty() {
            debug!("User {} is offline, notification {} kept for later", user_id, notification.id);
            return 0;
        }

        let text = match frame(notification) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode notification {}: {}", notification.id, e);
                return 0;
            }
        };

        let mut delivered = 0;
        for channel in channels {
            match channel.deliver(text.clone()) {
                Ok(()) => delivered += 1,
                // The transport's disconnect handler removes the handle.
                Err(e) => warn!("Delivery to channel {} of user {} failed: {}", channel.id(), user_id, e),
            }
        }
        delivered
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn frame(notification: &Notification) -> Result<String, NotificationError> {
    serde_json::to_string(&notification.payload())
        .map_err(|e| NotificationError::Delivery(format!("failed to encode payload: {}", e)))
}
