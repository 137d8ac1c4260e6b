//! Password changes, both flavors: via an emailed recovery key and via
//! the current password of a logged-in user.

use crate::api::{
    error::{constants, AuthError},
    handlers::CONFIRM_KEY_RECALL_LEN,
    password::{hash_password, verify_password},
    session, storage,
};
use axum::{
    extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PassChangeRecall {
    key: String,
    pass: String,
    pass2: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PassChange {
    login: String,
    pass: String,
    pass_new: String,
    pass_new2: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct PassChangeResponse {
    message: String,
}

#[utoipa::path(
    post,
    path= "/pass-change-recall",
    request_body = PassChangeRecall,
    responses (
        (status = 200, description = "Password replaced using a recovery key", body = [PassChangeResponse]),
        (status = 400, description = "Missing fields or malformed key"),
        (status = 401, description = "Key doesn't exist, expired, or passwords don't match"),
    ),
    tag= "auth"
)]
#[instrument(skip(pool, payload))]
pub async fn pass_change_recall(
    pool: Extension<PgPool>,
    payload: Option<Json<PassChangeRecall>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(payload)) = payload else {
        return Err(AuthError::bad_params());
    };

    // Only recovery keys work here; registration keys are one character
    // shorter and confirm through /check-confirm instead.
    if payload.key.len() != CONFIRM_KEY_RECALL_LEN {
        return Err(AuthError::bad_params());
    }
    if payload.pass.is_empty() {
        return Err(AuthError::Input(constants::INPUT_PASS_REQUIRED));
    }
    if payload.pass != payload.pass2 {
        return Err(AuthError::Authentication(
            constants::AUTHENTICATION_PASSWORDS_DONT_MATCH,
        ));
    }

    let Some(confirm) = storage::lookup_confirm(&pool, &payload.key)
        .await
        .map_err(AuthError::Internal)?
    else {
        return Err(AuthError::Authentication(
            constants::AUTHENTICATION_PASSCHANGE,
        ));
    };

    let password_hash = hash_password(&payload.pass).map_err(AuthError::Internal)?;
    storage::apply_password_recall(&pool, &confirm.key, confirm.user.id, &password_hash)
        .await
        .map_err(AuthError::Internal)?;

    info!("password recalled for {}", confirm.user.login);

    Ok((
        StatusCode::OK,
        Json(PassChangeResponse {
            message: "New password saved successfully".to_string(),
        }),
    ))
}

#[utoipa::path(
    post,
    path= "/pass-change",
    request_body = PassChange,
    responses (
        (status = 200, description = "Password changed", body = [PassChangeResponse]),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Current password is wrong or new passwords don't match"),
        (status = 403, description = "Not logged in"),
    ),
    tag= "auth"
)]
#[instrument(skip(pool, headers, payload))]
pub async fn pass_change(
    pool: Extension<PgPool>,
    headers: HeaderMap,
    payload: Option<Json<PassChange>>,
) -> Result<impl IntoResponse, AuthError> {
    let user = session::require_auth(&pool, &headers).await?;

    let Some(Json(payload)) = payload else {
        return Err(AuthError::bad_params());
    };

    // Only your own password
    if !user.login.eq_ignore_ascii_case(payload.login.trim()) {
        return Err(AuthError::authorization());
    }

    if payload.pass.is_empty() || payload.pass_new.is_empty() {
        return Err(AuthError::Input(constants::INPUT_PASS_REQUIRED));
    }
    if payload.pass_new != payload.pass_new2 {
        return Err(AuthError::Authentication(
            constants::AUTHENTICATION_PASSWORDS_DONT_MATCH,
        ));
    }

    if !verify_password(&user.password_hash, &payload.pass).map_err(AuthError::Internal)? {
        return Err(AuthError::Authentication(
            constants::AUTHENTICATION_CURRPASS_WRONG,
        ));
    }

    let password_hash = hash_password(&payload.pass_new).map_err(AuthError::Internal)?;
    storage::set_password(&pool, user.id, &password_hash)
        .await
        .map_err(AuthError::Internal)?;

    info!("password changed for {}", user.login);

    Ok((
        StatusCode::OK,
        Json(PassChangeResponse {
            message: "New password set successfully".to_string(),
        }),
    ))
}
