use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::{ConnectionRegistry, NotificationDispatcher};

#[derive(Clone)]
pub struct NotificationState {
    pub config: Arc<AppConfig>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub registry: Arc<ConnectionRegistry>,
}

pub fn notification_routes(state: NotificationState) -> Router {
    Router::new()
        .route("/ws", get(handlers::notifications_ws))
        .route("/unread", get(handlers::get_unread))
        .route("/read-all", post(handlers::mark_all_read))
        .route("/{notification_id}/read", post(handlers::mark_read))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
