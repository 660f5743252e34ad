use std::sync::Arc;

use anyhow::Error as AnyError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;
use slot_cell::{Slot, SlotError, SlotStateMachine, SlotStore, SlotTransition, WeeklyTemplate};

use crate::error::BookingError;
use crate::models::{Appointment, AppointmentStatus, BookingRecord, NewAppointment};
use crate::store::BookingStore;

/// PostgREST-backed store over the `slots`, `appointments` and `schedules` tables.
///
/// Single-slot transitions are conditional `PATCH`es whose filter restates the
/// guard, so a request that lost a race matches zero rows. The two-table
/// booking transactions run as Postgres functions (see `migrations/`).
pub struct SupabaseBookingStore {
    supabase: Arc<SupabaseClient>,
}

#[derive(Debug, Deserialize)]
struct ScheduleRow {
    weekly_schedule: Value,
}

#[derive(Debug, Deserialize)]
struct BookingRpcResult {
    outcome: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    slot: Option<Slot>,
    #[serde(default)]
    appointment: Option<Appointment>,
}

impl SupabaseBookingStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch_slots(&self, path: &str) -> Result<Vec<Slot>, SlotError> {
        self.supabase
            .request::<Vec<Slot>>(Method::GET, path, None, None)
            .await
            .map_err(slot_storage_error)
    }

    async fn patch_slots(&self, path: &str, body: Value) -> Result<Vec<Slot>, SlotError> {
        self.supabase
            .request_with_headers::<Vec<Slot>>(
                Method::PATCH,
                path,
                None,
                Some(body),
                Some(SupabaseClient::representation_headers(None)),
            )
            .await
            .map_err(slot_storage_error)
    }

    async fn call_booking_function(&self, function: &str, args: Value) -> Result<BookingRecord, BookingError> {
        let result: BookingRpcResult = self
            .supabase
            .rpc(function, args)
            .await
            .map_err(booking_storage_error)?;

        debug!("{} returned outcome {}", function, result.outcome);

        match result.outcome.as_str() {
            "booked" | "cancelled" => match (result.slot, result.appointment) {
                (Some(slot), Some(appointment)) => Ok(BookingRecord { slot, appointment }),
                _ => Err(BookingError::StorageUnavailable(format!(
                    "{} returned {} without slot and appointment",
                    function, result.outcome
                ))),
            },
            "conflict" => Err(BookingError::StateConflict(
                result.message.unwrap_or_else(|| "slot is not held".to_string()),
            )),
            "expired" => Err(BookingError::Expired),
            "not_found" => Err(BookingError::NotFound(
                result.message.unwrap_or_else(|| "Slot".to_string()),
            )),
            other => Err(BookingError::StorageUnavailable(format!(
                "{} returned unknown outcome {}",
                function, other
            ))),
        }
    }
}

fn timestamp(value: DateTime<Utc>) -> String {
    urlencoding::encode(&value.to_rfc3339_opts(SecondsFormat::Micros, true)).into_owned()
}

fn slot_storage_error(err: AnyError) -> SlotError {
    warn!("Slot storage request failed: {}", err);
    SlotError::StorageUnavailable(err.to_string())
}

fn booking_storage_error(err: AnyError) -> BookingError {
    warn!("Booking storage request failed: {}", err);
    BookingError::StorageUnavailable(err.to_string())
}

/// Row filter that only matches while the transition's guard still holds.
fn guard_filter(slot_id: Uuid, transition: &SlotTransition, now: DateTime<Utc>) -> String {
    let mut filter = format!("id=eq.{}&status=eq.{}", slot_id, transition.from_status());
    match transition {
        SlotTransition::Book { token, patient, .. } => {
            filter.push_str(&format!(
                "&hold_token=eq.{}&held_by=eq.{}&hold_expires_at=gt.{}",
                token,
                patient,
                timestamp(now)
            ));
        }
        SlotTransition::Release { token } => {
            filter.push_str(&format!("&hold_token=eq.{}", token));
        }
        SlotTransition::Expire => {
            filter.push_str(&format!("&hold_expires_at=lte.{}", timestamp(now)));
        }
        SlotTransition::Cancel { appointment_id } => {
            filter.push_str(&format!("&appointment_id=eq.{}", appointment_id));
        }
        SlotTransition::Hold { .. }
        | SlotTransition::Block
        | SlotTransition::Unblock
        | SlotTransition::Reopen => {}
    }
    filter
}

fn mutable_columns(slot: &Slot) -> Value {
    json!({
        "status": slot.status,
        "hold_token": slot.hold_token,
        "held_by": slot.held_by,
        "hold_expires_at": slot.hold_expires_at,
        "appointment_id": slot.appointment_id,
        "updated_at": slot.updated_at,
    })
}

#[async_trait]
impl SlotStore for SupabaseBookingStore {
    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<Slot>, SlotError> {
        let path = format!("/rest/v1/slots?id=eq.{}", slot_id);
        Ok(self.fetch_slots(&path).await?.into_iter().next())
    }

    async fn list_slots(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Slot>, SlotError> {
        let path = format!(
            "/rest/v1/slots?doctor_id=eq.{}&date=gte.{}&date=lt.{}&order=start_time.asc",
            doctor_id, from, to
        );
        self.fetch_slots(&path).await
    }

    async fn get_weekly_template(&self, doctor_id: Uuid) -> Result<Option<WeeklyTemplate>, SlotError> {
        let path = format!("/rest/v1/schedules?doctor_id=eq.{}&select=weekly_schedule", doctor_id);
        let rows: Vec<ScheduleRow> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(slot_storage_error)?;

        match rows.into_iter().next() {
            Some(row) => serde_json::from_value::<WeeklyTemplate>(row.weekly_schedule)
                .map(Some)
                .map_err(|e| SlotError::InvalidTemplate(e.to_string())),
            None => Ok(None),
        }
    }

    async fn save_weekly_template(&self, doctor_id: Uuid, template: WeeklyTemplate) -> Result<(), SlotError> {
        let weekly_schedule = serde_json::to_value(&template)
            .map_err(|e| SlotError::InvalidTemplate(e.to_string()))?;
        let body = json!({
            "doctor_id": doctor_id,
            "weekly_schedule": weekly_schedule,
            "updated_at": Utc::now(),
        });

        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/schedules?on_conflict=doctor_id",
                None,
                Some(body),
                Some(SupabaseClient::representation_headers(Some("resolution=merge-duplicates"))),
            )
            .await
            .map_err(slot_storage_error)?;
        Ok(())
    }

    async fn insert_missing_slots(&self, slots: Vec<Slot>) -> Result<Vec<Slot>, SlotError> {
        if slots.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::to_value(&slots)
            .map_err(|e| SlotError::StorageUnavailable(format!("failed to encode slots: {}", e)))?;

        self.supabase
            .request_with_headers::<Vec<Slot>>(
                Method::POST,
                "/rest/v1/slots?on_conflict=doctor_id,date,start_time",
                None,
                Some(body),
                Some(SupabaseClient::representation_headers(Some("resolution=ignore-duplicates"))),
            )
            .await
            .map_err(slot_storage_error)
    }

    async fn transition_slot(
        &self,
        slot_id: Uuid,
        transition: SlotTransition,
        now: DateTime<Utc>,
    ) -> Result<Slot, SlotError> {
        let current = self
            .get_slot(slot_id)
            .await?
            .ok_or_else(|| SlotError::NotFound(format!("Slot {}", slot_id)))?;
        let next = SlotStateMachine::apply(&current, &transition, now)?;

        let path = format!("/rest/v1/slots?{}", guard_filter(slot_id, &transition, now));
        if let Some(updated) = self.patch_slots(&path, mutable_columns(&next)).await?.into_iter().next() {
            return Ok(updated);
        }

        // Lost the race: report whatever the guard says about the slot now.
        debug!("Conditional {} on slot {} matched no rows", transition.name(), slot_id);
        let latest = self
            .get_slot(slot_id)
            .await?
            .ok_or_else(|| SlotError::NotFound(format!("Slot {}", slot_id)))?;
        SlotStateMachine::apply(&latest, &transition, now)?;
        Err(SlotError::StateConflict("slot changed concurrently".to_string()))
    }

    async fn expire_holds(&self, now: DateTime<Utc>) -> Result<Vec<Slot>, SlotError> {
        let path = format!("/rest/v1/slots?status=eq.HELD&hold_expires_at=lte.{}", timestamp(now));
        let body = json!({
            "status": "AVAILABLE",
            "hold_token": null,
            "held_by": null,
            "hold_expires_at": null,
            "updated_at": now,
        });
        self.patch_slots(&path, body).await
    }
}

#[async_trait]
impl BookingStore for SupabaseBookingStore {
    async fn confirm_booking(
        &self,
        slot_id: Uuid,
        hold_token: Uuid,
        appointment: NewAppointment,
        now: DateTime<Utc>,
    ) -> Result<BookingRecord, BookingError> {
        let args = json!({
            "p_slot_id": slot_id,
            "p_hold_token": hold_token,
            "p_appointment_id": appointment.id,
            "p_patient_id": appointment.patient_id,
            "p_payment_method": appointment.payment_method,
            "p_transaction_id": appointment.transaction_id,
            "p_notes": appointment.notes,
            "p_now": now,
        });
        self.call_booking_function("confirm_slot_booking", args).await
    }

    async fn cancel_booking(
        &self,
        appointment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<BookingRecord, BookingError> {
        let args = json!({
            "p_appointment_id": appointment_id,
            "p_now": now,
        });
        self.call_booking_function("cancel_slot_booking", args).await
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, BookingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(booking_storage_error)?;
        Ok(rows.into_iter().next())
    }

    async fn update_appointment_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Appointment, BookingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&status=eq.{}", appointment_id, from);
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                None,
                Some(json!({ "status": to, "updated_at": now })),
                Some(SupabaseClient::representation_headers(None)),
            )
            .await
            .map_err(booking_storage_error)?;

        if let Some(updated) = rows.into_iter().next() {
            return Ok(updated);
        }

        match self.get_appointment(appointment_id).await? {
            Some(current) => Err(BookingError::StateConflict(format!(
                "appointment is {}, expected {}",
                current.status, from
            ))),
            None => Err(BookingError::NotFound(format!("Appointment {}", appointment_id))),
        }
    }
}
