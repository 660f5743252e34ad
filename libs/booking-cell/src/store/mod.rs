pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use slot_cell::SlotStore;

use crate::error::BookingError;
use crate::models::{Appointment, AppointmentStatus, BookingRecord, NewAppointment};

pub use memory::InMemoryBookingStore;
pub use supabase::SupabaseBookingStore;

/// Slot storage extended with the multi-row booking transactions.
///
/// `confirm_booking` and `cancel_booking` change a slot and an appointment
/// together; either both writes are visible or neither is.
#[async_trait]
pub trait BookingStore: SlotStore {
    /// HELD -> BOOKED for the matching hold token plus insertion of a CONFIRMED appointment.
    async fn confirm_booking(
        &self,
        slot_id: Uuid,
        hold_token: Uuid,
        appointment: NewAppointment,
        now: DateTime<Utc>,
    ) -> Result<BookingRecord, BookingError>;

    /// BOOKED -> CANCELLED for the appointment's slot plus the appointment moving to CANCELLED.
    async fn cancel_booking(
        &self,
        appointment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<BookingRecord, BookingError>;

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, BookingError>;

    /// Moves an appointment from `from` to `to`; fails with a conflict if its status is no longer `from`.
    async fn update_appointment_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Appointment, BookingError>;
}
