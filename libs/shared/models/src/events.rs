use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Booking outcomes published by the coordinator and consumed by the notification dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingEvent {
    BookingConfirmed {
        appointment_id: Uuid,
        doctor_id: Uuid,
        patient_id: Uuid,
        slot_id: Uuid,
        slot_date: NaiveDate,
        slot_start: DateTime<Utc>,
    },
    BookingCancelled {
        appointment_id: Uuid,
        doctor_id: Uuid,
        patient_id: Uuid,
        slot_id: Uuid,
        slot_date: NaiveDate,
        slot_start: DateTime<Utc>,
        cancelled_by: Uuid,
    },
}

impl BookingEvent {
    pub fn appointment_id(&self) -> Uuid {
        match self {
            BookingEvent::BookingConfirmed { appointment_id, .. }
            | BookingEvent::BookingCancelled { appointment_id, .. } => *appointment_id,
        }
    }

    /// Users that must hear about this outcome: the doctor on confirm, both parties on cancel.
    pub fn recipients(&self) -> Vec<Uuid> {
        match self {
            BookingEvent::BookingConfirmed { doctor_id, .. } => vec![*doctor_id],
            BookingEvent::BookingCancelled { doctor_id, patient_id, .. } => {
                vec![*patient_id, *doctor_id]
            }
        }
    }
}
