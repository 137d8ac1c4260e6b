use crate::api::{
    config::AuthConfig,
    email::TEMPLATE_REGISTRATION,
    error::{constants, AuthError},
    handlers::{gen_confirm_key, normalize_email, valid_email, valid_login, CONFIRM_KEY_REGISTER_LEN},
    password::hash_password,
    storage,
};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Register {
    login: String,
    email: String,
    pass: String,
    pass2: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct RegisterResponse {
    message: String,
}

#[utoipa::path(
    post,
    path= "/register",
    request_body = Register,
    responses (
        (status = 201, description = "Account created, confirmation email queued", body = [RegisterResponse]),
        (status = 400, description = "Missing or malformed fields"),
        (status = 401, description = "Login or e-mail already taken"),
    ),
    tag= "auth"
)]
#[instrument(skip(pool, config, payload))]
pub async fn register(
    pool: Extension<PgPool>,
    config: Extension<Arc<AuthConfig>>,
    payload: Option<Json<Register>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(payload)) = payload else {
        return Err(AuthError::bad_params());
    };

    let login = payload.login.trim().to_string();
    let email = normalize_email(&payload.email);

    if login.is_empty() {
        return Err(AuthError::Input(constants::INPUT_LOGIN_REQUIRED));
    }
    if email.is_empty() {
        return Err(AuthError::Input(constants::INPUT_EMAIL_REQUIRED));
    }
    if payload.pass.is_empty() {
        return Err(AuthError::Input(constants::INPUT_PASS_REQUIRED));
    }
    if !valid_login(&login) {
        return Err(AuthError::Input(constants::INPUT_LOGIN_CONSTRAINT));
    }
    if !valid_email(&email) {
        return Err(AuthError::Input(constants::MAIL_WRONG));
    }
    if payload.pass != payload.pass2 {
        return Err(AuthError::Authentication(
            constants::AUTHENTICATION_PASSWORDS_DONT_MATCH,
        ));
    }

    // The email check comes first, so a user colliding on both fields is
    // told about the email.
    if let Some((_, existing_email)) = storage::find_conflicting_user(&pool, &login, &email)
        .await
        .map_err(AuthError::Internal)?
    {
        let message = if existing_email == email {
            constants::AUTHENTICATION_EMAIL_EXISTS
        } else {
            constants::AUTHENTICATION_USER_EXISTS
        };
        return Err(AuthError::Authentication(message));
    }

    let password_hash = hash_password(&payload.pass).map_err(AuthError::Internal)?;

    let user_id = storage::insert_user(&pool, &login, &email, &password_hash)
        .await
        .map_err(|err| {
            // Lost the race with a concurrent registration
            if err
                .downcast_ref::<sqlx::Error>()
                .is_some_and(storage::is_unique_violation)
            {
                AuthError::Authentication(constants::AUTHENTICATION_USER_EXISTS)
            } else {
                AuthError::Internal(err)
            }
        })?;

    // Key and confirmation email go in one transaction; if any of it
    // fails the fresh user is removed so the login frees up again.
    let key = gen_confirm_key(CONFIRM_KEY_REGISTER_LEN);
    let enqueue = async {
        let mut tx = pool.begin().await?;
        storage::insert_confirm(&mut tx, &key, user_id, config.confirm_ttl_seconds()).await?;
        storage::enqueue_email(
            &mut tx,
            &email,
            config.admin_email(),
            TEMPLATE_REGISTRATION,
            &json!({
                "login": login,
                "key": key,
                "link": config.confirm_url(&key),
                "linkvalid": config.link_validity_phrase(),
            }),
        )
        .await?;
        tx.commit().await?;
        anyhow::Ok(())
    };

    if let Err(err) = enqueue.await {
        error!("registration rollback for {login}: {err:?}");
        if let Err(cleanup_err) = storage::delete_user(&pool, user_id).await {
            error!("failed to remove user after rollback: {cleanup_err:?}");
        }
        return Err(AuthError::Authentication(
            constants::AUTHENTICATION_REGISTRATION,
        ));
    }

    info!("registered user {login}");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: format!(
                "Account created. To activate it, follow the link in the e-mail sent to {email}"
            ),
        }),
    ))
}
