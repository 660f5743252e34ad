use std::sync::Arc;

use axum::{
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
    body::Body,
};

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_config::AppConfig;

use crate::jwt::validate_token;

/// Resolves the bearer token to a `User` and stores it in request extensions.
///
/// Websocket clients cannot set headers from a browser, so an `access_token`
/// query parameter is accepted when no `Authorization` header is present.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = match request.headers().get("Authorization") {
        Some(header) => {
            let value = header
                .to_str()
                .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;
            value
                .strip_prefix("Bearer ")
                .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?
                .to_string()
        }
        None => query_token(request.uri().query())
            .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?,
    };

    let user = validate_token(&token, &config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

fn query_token(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "access_token")
        .map(|(_, value)| value.to_string())
}

pub fn extract_user<B>(request: &Request<B>) -> Result<User, AppError> {
    request
        .extensions()
        .get::<User>()
        .cloned()
        .ok_or_else(|| AppError::Auth("User not found in request extensions".to_string()))
}
