use crate::api::{
    error::AuthError,
    session::{hash_session_key, session_key_from_headers},
    storage,
};
use axum::{extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Debug)]
pub struct LogoutResponse {
    message: String,
}

#[utoipa::path(
    post,
    path= "/logout",
    responses (
        (status = 200, description = "Session destroyed (idempotent)", body = [LogoutResponse]),
    ),
    tag= "auth"
)]
#[instrument(skip(pool, headers))]
pub async fn logout(
    pool: Extension<PgPool>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    // Idempotent: logging out without a session is still a 200.
    if let Some(key) = session_key_from_headers(&headers) {
        storage::delete_session(&pool, &hash_session_key(key))
            .await
            .map_err(AuthError::Internal)?;
    }

    Ok((
        StatusCode::OK,
        Json(LogoutResponse {
            message: "Logged out".to_string(),
        }),
    ))
}
