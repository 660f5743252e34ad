use axum::{
    extract::{Path, State, Extension},
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
    Json,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::NotificationView;
use crate::router::NotificationState;
use crate::services::ChannelHandle;

const OUTBOX_CAPACITY: usize = 64;

fn caller_id(user: &User) -> Result<Uuid, AppError> {
    user.user_id()
        .ok_or_else(|| AppError::Auth("Token subject is not a valid user id".to_string()))
}

// ==============================================================================
// LIVE CHANNEL
// ==============================================================================

pub async fn notifications_ws(
    ws: WebSocketUpgrade,
    State(state): State<NotificationState>,
    Extension(user): Extension<User>,
) -> Result<Response, AppError> {
    let user_id = caller_id(&user)?;
    Ok(ws.on_upgrade(move |socket| serve_socket(socket, user_id, state)))
}

async fn serve_socket(socket: WebSocket, user_id: Uuid, state: NotificationState) {
    let (mut sink, mut stream) = socket.split();
    let (handle, mut outbox) = ChannelHandle::new(OUTBOX_CAPACITY);
    let channel_id = handle.id();

    state.registry.register(user_id, handle.clone()).await;
    info!("User {} connected to notifications", user_id);

    if let Err(e) = state.dispatcher.deliver_backlog(user_id, &handle).await {
        warn!("Could not load unread backlog for user {}: {}", user_id, e);
    }
    drop(handle);

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.registry.unregister(user_id, channel_id).await;
    debug!("User {} disconnected channel {}", user_id, channel_id);
}

// ==============================================================================
// NOTIFICATION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_unread(
    State(state): State<NotificationState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<NotificationView>>, AppError> {
    let user_id = caller_id(&user)?;
    let unread = state.dispatcher.unread_for(user_id).await?;
    Ok(Json(unread.iter().map(|n| n.view()).collect()))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<NotificationState>,
    Extension(user): Extension<User>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<NotificationView>, AppError> {
    let user_id = caller_id(&user)?;
    let notification = state.dispatcher.mark_read(user_id, notification_id).await?;
    Ok(Json(notification.view()))
}

#[axum::debug_handler]
pub async fn mark_all_read(
    State(state): State<NotificationState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let user_id = caller_id(&user)?;
    let updated = state.dispatcher.mark_all_read(user_id).await?;
    Ok(Json(json!({
        "success": true,
        "updated": updated,
    })))
}
