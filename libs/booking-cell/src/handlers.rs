use axum::{
    extract::{Path, Query, State, Extension},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use slot_cell::{SlotSummary, WeeklyTemplate};

use crate::models::{
    AppointmentStatusUpdateRequest, AppointmentView, CancelBookingRequest, ConfirmBookingRequest,
    ExpandScheduleRequest, HoldRequest, ReleaseHoldRequest, SlotListQuery,
};
use crate::router::BookingState;
use crate::services::ConfirmBooking;

fn caller_id(user: &User) -> Result<Uuid, AppError> {
    user.user_id()
        .ok_or_else(|| AppError::Auth("Token subject is not a valid user id".to_string()))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn request_hold(
    State(state): State<BookingState>,
    Extension(user): Extension<User>,
    Json(request): Json<HoldRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let caller = caller_id(&user)?;
    if request.user_id.is_some_and(|user_id| user_id != caller) {
        return Err(AppError::Forbidden("Holds can only be requested for yourself".to_string()));
    }

    let grant = state.coordinator.request_hold(request.slot_id, caller).await?;

    Ok((StatusCode::CREATED, Json(json!({
        "slotId": grant.slot_id,
        "holdToken": grant.hold_token,
        "expiresAt": grant.expires_at,
    }))))
}

#[axum::debug_handler]
pub async fn confirm_booking(
    State(state): State<BookingState>,
    Extension(user): Extension<User>,
    Json(request): Json<ConfirmBookingRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let caller = caller_id(&user)?;
    debug!("User {} confirming slot {}", caller, request.slot_id);

    let appointment = state
        .coordinator
        .confirm_booking(ConfirmBooking {
            slot_id: request.slot_id,
            patient_id: caller,
            hold_token: request.hold_token,
            payment_method: request.payment_method,
            transaction_id: request.transaction_id,
            notes: request.notes,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({
        "appointmentId": appointment.id,
        "status": appointment.status,
    }))))
}

#[axum::debug_handler]
pub async fn cancel_booking(
    State(state): State<BookingState>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_id(&user)?;
    let appointment = state.coordinator.cancel_appointment(request.appointment_id, caller).await?;

    Ok(Json(json!({
        "success": true,
        "appointmentId": appointment.id,
        "status": appointment.status,
    })))
}

#[axum::debug_handler]
pub async fn release_hold(
    State(state): State<BookingState>,
    Extension(user): Extension<User>,
    Json(request): Json<ReleaseHoldRequest>,
) -> Result<Json<Value>, AppError> {
    caller_id(&user)?;
    let slot = state.coordinator.release_hold(request.slot_id, request.hold_token).await?;

    Ok(Json(json!({
        "success": true,
        "slot": slot.summary(),
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<BookingState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<AppointmentView>, AppError> {
    let caller = caller_id(&user)?;
    let appointment = state.coordinator.get_appointment(appointment_id, caller).await?;
    Ok(Json(appointment.into()))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<BookingState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<AppointmentStatusUpdateRequest>,
) -> Result<Json<AppointmentView>, AppError> {
    let caller = caller_id(&user)?;
    let appointment = state
        .coordinator
        .update_appointment_status(appointment_id, request.status, caller)
        .await?;
    Ok(Json(appointment.into()))
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_slots(
    State(state): State<BookingState>,
    Query(query): Query<SlotListQuery>,
) -> Result<Json<Vec<SlotSummary>>, AppError> {
    let slots = state.coordinator.list_slots(query.doctor_id, query.from, query.to).await?;
    Ok(Json(slots))
}

#[axum::debug_handler]
pub async fn save_schedule(
    State(state): State<BookingState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Json(template): Json<WeeklyTemplate>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_id(&user)?;
    if caller != doctor_id && !user.is_admin() {
        return Err(AppError::Forbidden("Only the doctor can change their own schedule".to_string()));
    }

    state
        .expansion
        .save_template(doctor_id, template)
        .await
        .map_err(crate::error::BookingError::from)?;

    Ok(Json(json!({
        "success": true,
        "doctorId": doctor_id,
    })))
}

#[axum::debug_handler]
pub async fn expand_schedule(
    State(state): State<BookingState>,
    Extension(user): Extension<User>,
    Json(request): Json<ExpandScheduleRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let caller = caller_id(&user)?;
    if caller != request.doctor_id && !user.is_admin() {
        return Err(AppError::Forbidden("Only the doctor can expand their own schedule".to_string()));
    }

    let outcome = state
        .expansion
        .expand(request.doctor_id, request.from, request.to)
        .await
        .map_err(crate::error::BookingError::from)?;

    Ok((StatusCode::CREATED, Json(json!({
        "doctorId": outcome.doctor_id,
        "candidates": outcome.candidates,
        "created": outcome.created.len(),
        "slots": outcome.created,
    }))))
}

#[axum::debug_handler]
pub async fn block_slot(
    State(state): State<BookingState>,
    Extension(user): Extension<User>,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<SlotSummary>, AppError> {
    let slot = state.coordinator.block_slot(slot_id, caller_id(&user)?).await?;
    Ok(Json(slot.summary()))
}

#[axum::debug_handler]
pub async fn unblock_slot(
    State(state): State<BookingState>,
    Extension(user): Extension<User>,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<SlotSummary>, AppError> {
    let slot = state.coordinator.unblock_slot(slot_id, caller_id(&user)?).await?;
    Ok(Json(slot.summary()))
}

#[axum::debug_handler]
pub async fn reopen_slot(
    State(state): State<BookingState>,
    Extension(user): Extension<User>,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<SlotSummary>, AppError> {
    let slot = state.coordinator.reopen_slot(slot_id, caller_id(&user)?).await?;
    Ok(Json(slot.summary()))
}
