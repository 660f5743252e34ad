use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, warn};

use shared_models::events::BookingEvent;

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(500);

/// Sending half of the booking event queue.
///
/// A single queue feeds the notification dispatcher, so events for one
/// appointment reach it in the order they were published.
#[derive(Clone)]
pub struct EventPublisher {
    sender: Option<mpsc::Sender<BookingEvent>>,
    send_timeout: Duration,
}

impl EventPublisher {
    pub fn new(sender: mpsc::Sender<BookingEvent>) -> Self {
        Self { sender: Some(sender), send_timeout: DEFAULT_SEND_TIMEOUT }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BookingEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(sender), receiver)
    }

    /// Publisher that drops every event.
    pub fn disabled() -> Self {
        Self { sender: None, send_timeout: DEFAULT_SEND_TIMEOUT }
    }

    /// Longest a booking response waits for room in a full queue.
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Runs after the booking has committed. A closed or persistently full
    /// queue is logged, never returned to the caller.
    pub async fn publish(&self, event: BookingEvent) {
        let Some(sender) = &self.sender else {
            debug!("Event publishing disabled, dropping event for appointment {}", event.appointment_id());
            return;
        };

        let appointment_id = event.appointment_id();
        match sender.send_timeout(event, self.send_timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => warn!(
                "Event queue full for {:?}, event for appointment {} dropped",
                self.send_timeout, appointment_id
            ),
            Err(SendTimeoutError::Closed(_)) => warn!(
                "Notification dispatcher is gone, event for appointment {} dropped",
                appointment_id
            ),
        }
    }
}
