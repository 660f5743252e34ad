use axum::{
    Router,
    routing::get,
};

use booking_cell::{booking_routes, slot_routes, BookingState};
use notification_cell::{notification_routes, NotificationState};

use crate::app::AppServices;

pub fn create_router(services: &AppServices) -> Router {
    let booking_state = BookingState {
        config: services.config.clone(),
        coordinator: services.coordinator.clone(),
        expansion: services.expansion.clone(),
    };
    let notification_state = NotificationState {
        config: services.config.clone(),
        dispatcher: services.dispatcher.clone(),
        registry: services.registry.clone(),
    };

    Router::new()
        .route("/", get(|| async { "Slot booking API is running!" }))
        .nest("/bookings", booking_routes(booking_state.clone()))
        .nest("/slots", slot_routes(booking_state))
        .nest("/notifications", notification_routes(notification_state))
}
