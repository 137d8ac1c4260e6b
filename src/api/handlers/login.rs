use crate::api::{
    error::{constants, AuthError},
    password::verify_password,
    session::{generate_session_key, hash_session_key},
    storage::{self, PublicUser},
};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Login {
    login: String,
    pass: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct LoginResponse {
    message: String,
    key: String,
    #[serde(rename = "youAre")]
    you_are: PublicUser,
}

#[utoipa::path(
    post,
    path= "/login",
    request_body = Login,
    responses (
        (status = 200, description = "Login successful, session key issued", body = [LoginResponse]),
        (status = 400, description = "Missing login or password"),
        (status = 401, description = "Credentials don't match or account is locked"),
    ),
    tag= "auth"
)]
#[instrument(skip(pool, payload))]
pub async fn login(
    pool: Extension<PgPool>,
    payload: Option<Json<Login>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(payload)) = payload else {
        return Err(AuthError::bad_params());
    };

    let login = payload.login.trim();
    if login.is_empty() {
        return Err(AuthError::Input(constants::INPUT_LOGIN_REQUIRED));
    }
    if payload.pass.is_empty() {
        return Err(AuthError::Input(constants::INPUT_PASS_REQUIRED));
    }

    // Missing user and wrong password collapse into the same message, so
    // the endpoint doesn't leak which logins exist.
    let Some(user) = storage::find_user(&pool, login).await.map_err(AuthError::Internal)? else {
        debug!("login attempt for unknown user");
        return Err(AuthError::Authentication(
            constants::AUTHENTICATION_DOESNT_MATCH,
        ));
    };

    if user.is_locked() {
        return Err(AuthError::Authentication(
            constants::AUTHENTICATION_MAX_ATTEMPTS,
        ));
    }

    if !verify_password(&user.password_hash, &payload.pass).map_err(AuthError::Internal)? {
        storage::record_login_failure(&pool, user.id)
            .await
            .map_err(AuthError::Internal)?;
        return Err(AuthError::Authentication(
            constants::AUTHENTICATION_DOESNT_MATCH,
        ));
    }

    storage::reset_login_failures(&pool, user.id)
        .await
        .map_err(AuthError::Internal)?;

    let key = generate_session_key();
    storage::insert_session(&pool, &hash_session_key(&key), user.id)
        .await
        .map_err(AuthError::Internal)?;

    Ok((
        StatusCode::OK,
        Json(LoginResponse {
            message: "Success login".to_string(),
            key,
            you_are: user.public(),
        }),
    ))
}
