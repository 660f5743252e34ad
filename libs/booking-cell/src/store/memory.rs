use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use slot_cell::{Slot, SlotError, SlotKey, SlotStateMachine, SlotStore, SlotTransition, WeeklyTemplate};

use crate::error::BookingError;
use crate::models::{Appointment, AppointmentStatus, BookingRecord, NewAppointment};
use crate::store::BookingStore;

#[derive(Default)]
struct MemoryState {
    slots: HashMap<Uuid, Slot>,
    keys: HashMap<SlotKey, Uuid>,
    appointments: HashMap<Uuid, Appointment>,
    templates: HashMap<Uuid, WeeklyTemplate>,
}

/// Process-local store. Every operation runs under one write lock, which makes
/// guard evaluation and the write a single step.
#[derive(Default)]
pub struct InMemoryBookingStore {
    state: RwLock<MemoryState>,
    unavailable: AtomicBool,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `StorageUnavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn slot_count(&self) -> usize {
        self.state.read().await.slots.len()
    }

    pub async fn appointment_count(&self) -> usize {
        self.state.read().await.appointments.len()
    }

    fn check_available(&self) -> Result<(), SlotError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SlotError::StorageUnavailable("in-memory store switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SlotStore for InMemoryBookingStore {
    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<Slot>, SlotError> {
        self.check_available()?;
        Ok(self.state.read().await.slots.get(&slot_id).cloned())
    }

    async fn list_slots(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Slot>, SlotError> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut slots: Vec<Slot> = state
            .slots
            .values()
            .filter(|slot| slot.doctor_id == doctor_id && slot.date >= from && slot.date < to)
            .cloned()
            .collect();
        slots.sort_by_key(|slot| slot.start_time);
        Ok(slots)
    }

    async fn get_weekly_template(&self, doctor_id: Uuid) -> Result<Option<WeeklyTemplate>, SlotError> {
        self.check_available()?;
        Ok(self.state.read().await.templates.get(&doctor_id).cloned())
    }

    async fn save_weekly_template(&self, doctor_id: Uuid, template: WeeklyTemplate) -> Result<(), SlotError> {
        self.check_available()?;
        self.state.write().await.templates.insert(doctor_id, template);
        Ok(())
    }

    async fn insert_missing_slots(&self, slots: Vec<Slot>) -> Result<Vec<Slot>, SlotError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let mut created = Vec::new();

        for slot in slots {
            let key = slot.key();
            if state.keys.contains_key(&key) {
                continue;
            }
            state.keys.insert(key, slot.id);
            state.slots.insert(slot.id, slot.clone());
            created.push(slot);
        }

        debug!("Inserted {} new slots", created.len());
        Ok(created)
    }

    async fn transition_slot(
        &self,
        slot_id: Uuid,
        transition: SlotTransition,
        now: DateTime<Utc>,
    ) -> Result<Slot, SlotError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let current = state
            .slots
            .get(&slot_id)
            .ok_or_else(|| SlotError::NotFound(format!("Slot {}", slot_id)))?;

        let next = SlotStateMachine::apply(current, &transition, now)?;
        state.slots.insert(slot_id, next.clone());

        debug!("Slot {} {} -> {}", slot_id, transition.from_status(), next.status);
        Ok(next)
    }

    async fn expire_holds(&self, now: DateTime<Utc>) -> Result<Vec<Slot>, SlotError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let mut released = Vec::new();

        for slot in state.slots.values_mut() {
            if !slot.is_hold_expired(now) {
                continue;
            }
            let next = SlotStateMachine::apply(slot, &SlotTransition::Expire, now)?;
            *slot = next.clone();
            released.push(next);
        }

        Ok(released)
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn confirm_booking(
        &self,
        slot_id: Uuid,
        hold_token: Uuid,
        appointment: NewAppointment,
        now: DateTime<Utc>,
    ) -> Result<BookingRecord, BookingError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let current = state
            .slots
            .get(&slot_id)
            .ok_or_else(|| BookingError::NotFound(format!("Slot {}", slot_id)))?;

        let transition = SlotTransition::Book {
            token: hold_token,
            patient: appointment.patient_id,
            appointment_id: appointment.id,
        };
        let slot = SlotStateMachine::apply(current, &transition, now)?;
        let appointment = appointment.into_appointment(now);

        state.slots.insert(slot_id, slot.clone());
        state.appointments.insert(appointment.id, appointment.clone());

        Ok(BookingRecord { slot, appointment })
    }

    async fn cancel_booking(
        &self,
        appointment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<BookingRecord, BookingError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let appointment = state
            .appointments
            .get(&appointment_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound(format!("Appointment {}", appointment_id)))?;

        if !appointment.status.is_cancellable() {
            return Err(BookingError::StateConflict(format!(
                "appointment is {} and cannot be cancelled",
                appointment.status
            )));
        }

        let current = state
            .slots
            .get(&appointment.slot_id)
            .ok_or_else(|| BookingError::NotFound(format!("Slot {}", appointment.slot_id)))?;
        let slot = SlotStateMachine::apply(current, &SlotTransition::Cancel { appointment_id }, now)?;

        let mut appointment = appointment;
        appointment.status = AppointmentStatus::Cancelled;
        appointment.updated_at = now;

        state.slots.insert(slot.id, slot.clone());
        state.appointments.insert(appointment_id, appointment.clone());

        Ok(BookingRecord { slot, appointment })
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, BookingError> {
        self.check_available()?;
        Ok(self.state.read().await.appointments.get(&appointment_id).cloned())
    }

    async fn update_appointment_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Appointment, BookingError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let appointment = state
            .appointments
            .get_mut(&appointment_id)
            .ok_or_else(|| BookingError::NotFound(format!("Appointment {}", appointment_id)))?;

        if appointment.status != from {
            return Err(BookingError::StateConflict(format!(
                "appointment is {}, expected {}",
                appointment.status, from
            )));
        }

        appointment.status = to;
        appointment.updated_at = now;
        Ok(appointment.clone())
    }
}
