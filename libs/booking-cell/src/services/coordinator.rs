use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::events::BookingEvent;
use slot_cell::{Slot, SlotStatus, SlotSummary, SlotTransition};

use crate::error::BookingError;
use crate::models::{Appointment, AppointmentStatus, HoldGrant, NewAppointment, PaymentMethod};
use crate::services::clock::{Clock, SystemClock};
use crate::services::events::EventPublisher;
use crate::store::BookingStore;

#[derive(Debug, Clone)]
pub struct BookingPolicy {
    pub hold_ttl: Duration,
    pub reopen_cancelled_slots: bool,
}

impl BookingPolicy {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let defaults = Self::default();
        let hold_ttl = Duration::try_seconds(config.hold_ttl_seconds.max(1)).unwrap_or_else(|| {
            warn!("HOLD_TTL_SECONDS {} is out of range, using {}s",
                  config.hold_ttl_seconds, defaults.hold_ttl.num_seconds());
            defaults.hold_ttl
        });

        Self {
            hold_ttl,
            reopen_cancelled_slots: config.reopen_cancelled_slots,
        }
    }
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            hold_ttl: Duration::seconds(300),
            reopen_cancelled_slots: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmBooking {
    pub slot_id: Uuid,
    /// Caller confirming the hold; must be the patient who placed it.
    pub patient_id: Uuid,
    pub hold_token: Uuid,
    pub payment_method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub notes: Option<String>,
}

/// Drives slots through hold, confirm and cancel.
///
/// Every slot write goes through the store's compare-and-transition, so two
/// coordinators (or a coordinator and the sweeper) racing on one slot are
/// serialized by the store, not by this type.
pub struct BookingCoordinator {
    store: Arc<dyn BookingStore>,
    events: EventPublisher,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
}

impl BookingCoordinator {
    pub fn new(store: Arc<dyn BookingStore>, events: EventPublisher, policy: BookingPolicy) -> Self {
        Self::with_clock(store, events, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn BookingStore>,
        events: EventPublisher,
        policy: BookingPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, events, clock, policy }
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    // ==============================================================================
    // HOLD / CONFIRM / CANCEL
    // ==============================================================================

    pub async fn request_hold(&self, slot_id: Uuid, user_id: Uuid) -> Result<HoldGrant, BookingError> {
        let now = self.clock.now();
        let token = Uuid::new_v4();
        let expires_at = now + self.policy.hold_ttl;

        let transition = SlotTransition::Hold { holder: user_id, token, expires_at };
        match self.store.transition_slot(slot_id, transition, now).await {
            Ok(slot) => {
                info!("Slot {} held by {} until {}", slot.id, user_id, expires_at);
                Ok(HoldGrant { slot_id, hold_token: token, expires_at })
            }
            Err(e) => {
                debug!("Hold on slot {} for {} rejected: {}", slot_id, user_id, e);
                Err(e.into())
            }
        }
    }

    pub async fn confirm_booking(&self, request: ConfirmBooking) -> Result<Appointment, BookingError> {
        let now = self.clock.now();
        let slot = self.load_slot(request.slot_id).await?;

        if slot.status != SlotStatus::Held {
            return Err(BookingError::StateConflict("slot is not held".to_string()));
        }
        if slot.hold_token != Some(request.hold_token) {
            warn!("Confirm on slot {} with a token that does not match the current hold", slot.id);
            return Err(BookingError::StateConflict("hold token does not match".to_string()));
        }
        if slot.held_by != Some(request.patient_id) {
            warn!("User {} tried to confirm a hold on slot {} placed by someone else",
                  request.patient_id, slot.id);
            return Err(BookingError::StateConflict("hold belongs to another patient".to_string()));
        }
        if slot.is_hold_expired(now) {
            self.reclaim_expired_hold(slot.id, now).await;
            return Err(BookingError::Expired);
        }

        let patient_id = request.patient_id;

        let draft = NewAppointment {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id: slot.doctor_id,
            slot_id: slot.id,
            payment_method: request.payment_method,
            transaction_id: request.transaction_id,
            notes: request.notes,
        };

        let record = match self.store.confirm_booking(slot.id, request.hold_token, draft, now).await {
            Ok(record) => record,
            Err(BookingError::Expired) => {
                self.reclaim_expired_hold(slot.id, now).await;
                return Err(BookingError::Expired);
            }
            Err(e) => return Err(e),
        };

        info!("Appointment {} booked on slot {} for patient {}",
              record.appointment.id, record.slot.id, patient_id);

        self.events
            .publish(BookingEvent::BookingConfirmed {
                appointment_id: record.appointment.id,
                doctor_id: record.appointment.doctor_id,
                patient_id: record.appointment.patient_id,
                slot_id: record.slot.id,
                slot_date: record.slot.date,
                slot_start: record.slot.start_time,
            })
            .await;

        Ok(record.appointment)
    }

    pub async fn cancel_appointment(&self, appointment_id: Uuid, actor: Uuid) -> Result<Appointment, BookingError> {
        let appointment = self.load_appointment(appointment_id).await?;
        if actor != appointment.patient_id && actor != appointment.doctor_id {
            return Err(BookingError::Forbidden(
                "Only the patient or the doctor of an appointment can cancel it".to_string(),
            ));
        }
        if !appointment.status.is_cancellable() {
            return Err(BookingError::StateConflict(format!(
                "appointment is {} and cannot be cancelled",
                appointment.status
            )));
        }

        let now = self.clock.now();
        let record = self.store.cancel_booking(appointment_id, now).await?;
        info!("Appointment {} cancelled by {}", appointment_id, actor);

        self.events
            .publish(BookingEvent::BookingCancelled {
                appointment_id,
                doctor_id: record.appointment.doctor_id,
                patient_id: record.appointment.patient_id,
                slot_id: record.slot.id,
                slot_date: record.slot.date,
                slot_start: record.slot.start_time,
                cancelled_by: actor,
            })
            .await;

        if self.policy.reopen_cancelled_slots {
            match self.store.transition_slot(record.slot.id, SlotTransition::Reopen, now).await {
                Ok(_) => info!("Slot {} reopened after cancellation", record.slot.id),
                Err(e) => warn!("Failed to reopen slot {} after cancellation: {}", record.slot.id, e),
            }
        }

        Ok(record.appointment)
    }

    /// Gives a hold back before its deadline.
    pub async fn release_hold(&self, slot_id: Uuid, hold_token: Uuid) -> Result<Slot, BookingError> {
        let now = self.clock.now();
        let slot = self
            .store
            .transition_slot(slot_id, SlotTransition::Release { token: hold_token }, now)
            .await?;
        info!("Hold on slot {} released", slot_id);
        Ok(slot)
    }

    // ==============================================================================
    // DOCTOR SLOT MANAGEMENT
    // ==============================================================================

    pub async fn block_slot(&self, slot_id: Uuid, actor: Uuid) -> Result<Slot, BookingError> {
        self.doctor_transition(slot_id, actor, SlotTransition::Block).await
    }

    pub async fn unblock_slot(&self, slot_id: Uuid, actor: Uuid) -> Result<Slot, BookingError> {
        self.doctor_transition(slot_id, actor, SlotTransition::Unblock).await
    }

    pub async fn reopen_slot(&self, slot_id: Uuid, actor: Uuid) -> Result<Slot, BookingError> {
        self.doctor_transition(slot_id, actor, SlotTransition::Reopen).await
    }

    async fn doctor_transition(
        &self,
        slot_id: Uuid,
        actor: Uuid,
        transition: SlotTransition,
    ) -> Result<Slot, BookingError> {
        let slot = self.load_slot(slot_id).await?;
        if slot.doctor_id != actor {
            return Err(BookingError::Forbidden("Only the owning doctor can manage this slot".to_string()));
        }

        let name = transition.name();
        let slot = self.store.transition_slot(slot_id, transition, self.clock.now()).await?;
        info!("Doctor {} applied {} to slot {}", actor, name, slot_id);
        Ok(slot)
    }

    // ==============================================================================
    // APPOINTMENTS AND LISTINGS
    // ==============================================================================

    /// Downstream lifecycle changes, recorded by the appointment's doctor.
    /// Cancellation must go through [`Self::cancel_appointment`] because it also moves the slot.
    pub async fn update_appointment_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
        actor: Uuid,
    ) -> Result<Appointment, BookingError> {
        if status == AppointmentStatus::Cancelled {
            return Err(BookingError::Validation(
                "Use the cancel operation to cancel an appointment".to_string(),
            ));
        }

        let appointment = self.load_appointment(appointment_id).await?;
        if actor != appointment.doctor_id {
            return Err(BookingError::Forbidden(
                "Only the doctor of an appointment can update its status".to_string(),
            ));
        }
        if !appointment.status.can_transition_to(&status) {
            return Err(BookingError::StateConflict(format!(
                "appointment cannot move from {} to {}",
                appointment.status, status
            )));
        }

        let updated = self
            .store
            .update_appointment_status(appointment_id, appointment.status, status, self.clock.now())
            .await?;
        info!("Appointment {} moved {} -> {}", appointment_id, appointment.status, updated.status);
        Ok(updated)
    }

    pub async fn get_appointment(&self, appointment_id: Uuid, actor: Uuid) -> Result<Appointment, BookingError> {
        let appointment = self.load_appointment(appointment_id).await?;
        if actor != appointment.patient_id && actor != appointment.doctor_id {
            return Err(BookingError::Forbidden("Not a participant of this appointment".to_string()));
        }
        Ok(appointment)
    }

    pub async fn list_slots(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SlotSummary>, BookingError> {
        if from >= to {
            return Err(BookingError::Validation(format!("from {} must be before to {}", from, to)));
        }
        let slots = self.store.list_slots(doctor_id, from, to).await?;
        Ok(slots.iter().map(Slot::summary).collect())
    }

    // ==============================================================================
    // HELPERS
    // ==============================================================================

    async fn load_slot(&self, slot_id: Uuid) -> Result<Slot, BookingError> {
        self.store
            .get_slot(slot_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Slot {}", slot_id)))
    }

    async fn load_appointment(&self, appointment_id: Uuid) -> Result<Appointment, BookingError> {
        self.store
            .get_appointment(appointment_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Appointment {}", appointment_id)))
    }

    /// Same `Expire` transition the sweeper applies; losing to the sweeper is fine.
    async fn reclaim_expired_hold(&self, slot_id: Uuid, now: DateTime<Utc>) {
        match self.store.transition_slot(slot_id, SlotTransition::Expire, now).await {
            Ok(_) => info!("Expired hold on slot {} reclaimed on confirm", slot_id),
            Err(e) => debug!("Hold on slot {} already reclaimed: {}", slot_id, e),
        }
    }
}
