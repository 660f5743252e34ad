use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put, patch},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;
use slot_cell::SlotExpansionService;

use crate::handlers;
use crate::services::BookingCoordinator;

/// Services shared by the booking and slot routes, built once at startup.
#[derive(Clone)]
pub struct BookingState {
    pub config: Arc<AppConfig>,
    pub coordinator: Arc<BookingCoordinator>,
    pub expansion: Arc<SlotExpansionService>,
}

pub fn booking_routes(state: BookingState) -> Router {
    Router::new()
        .route("/hold", post(handlers::request_hold))
        .route("/confirm", post(handlers::confirm_booking))
        .route("/cancel", post(handlers::cancel_booking))
        .route("/release", post(handlers::release_hold))
        .route("/appointments/{appointment_id}", get(handlers::get_appointment))
        .route("/appointments/{appointment_id}/status", patch(handlers::update_appointment_status))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}

pub fn slot_routes(state: BookingState) -> Router {
    // Listing is public so patients can browse before signing in
    let public_routes = Router::new()
        .route("/", get(handlers::list_slots));

    let protected_routes = Router::new()
        .route("/expand", post(handlers::expand_schedule))
        .route("/schedule/{doctor_id}", put(handlers::save_schedule))
        .route("/{slot_id}/block", post(handlers::block_slot))
        .route("/{slot_id}/unblock", post(handlers::unblock_slot))
        .route("/{slot_id}/reopen", post(handlers::reopen_slot))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
