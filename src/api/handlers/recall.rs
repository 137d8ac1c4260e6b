use crate::api::{
    config::AuthConfig,
    email::TEMPLATE_RECALL,
    error::{constants, AuthError},
    handlers::{gen_confirm_key, CONFIRM_KEY_RECALL_LEN},
    session, storage,
};
use axum::{
    extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Recall {
    login: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct RecallResponse {
    message: String,
}

#[utoipa::path(
    post,
    path= "/recall",
    request_body = Recall,
    responses (
        (status = 200, description = "Recovery email queued", body = [RecallResponse]),
        (status = 400, description = "Missing login"),
        (status = 401, description = "No such user"),
        (status = 403, description = "Recalling another account requires admin"),
    ),
    tag= "auth"
)]
#[instrument(skip(pool, config, headers, payload))]
pub async fn recall(
    pool: Extension<PgPool>,
    config: Extension<Arc<AuthConfig>>,
    headers: HeaderMap,
    payload: Option<Json<Recall>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(payload)) = payload else {
        return Err(AuthError::bad_params());
    };

    let login = payload.login.trim();
    if login.is_empty() {
        return Err(AuthError::Input(constants::INPUT_LOGIN_REQUIRED));
    }

    // Same message as a failed registration, so the endpoint doesn't
    // double as an account directory.
    let Some(user) = storage::find_user(&pool, login).await.map_err(AuthError::Internal)? else {
        return Err(AuthError::Authentication(
            constants::AUTHENTICATION_REGISTRATION,
        ));
    };

    // Anonymous callers may recall any account (the email goes to its
    // owner anyway). A logged-in caller touching someone else's account
    // must be an admin.
    if let Some(caller) = session::authenticate(&pool, &headers).await? {
        if caller.id != user.id && !caller.is_admin() {
            return Err(AuthError::authorization());
        }
    }

    let key = gen_confirm_key(CONFIRM_KEY_RECALL_LEN);

    let mut tx = pool.begin().await.map_err(AuthError::from)?;
    storage::delete_confirms_for_user(&mut tx, user.id)
        .await
        .map_err(AuthError::Internal)?;
    storage::insert_confirm(&mut tx, &key, user.id, config.confirm_ttl_seconds())
        .await
        .map_err(AuthError::Internal)?;
    storage::enqueue_email(
        &mut tx,
        &user.email,
        None,
        TEMPLATE_RECALL,
        &json!({
            "login": user.login,
            "key": key,
            "link": config.confirm_url(&key),
            "linkvalid": config.link_validity_phrase(),
        }),
    )
    .await
    .map_err(AuthError::Internal)?;
    tx.commit().await.map_err(AuthError::from)?;

    info!("password recall queued for {}", user.login);

    Ok((
        StatusCode::OK,
        Json(RecallResponse {
            message: "An e-mail with a password recovery link has been sent \
                      to the address specified for this account"
                .to_string(),
        }),
    ))
}
