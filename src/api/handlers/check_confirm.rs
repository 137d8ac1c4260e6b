use crate::api::{
    error::{constants, AuthError},
    handlers::{CONFIRM_KEY_RECALL_LEN, CONFIRM_KEY_REGISTER_LEN},
    storage,
};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CheckConfirm {
    key: String,
}

/// The response shape depends on the key: registration keys answer with a
/// notification, recovery keys with the data the password form needs.
#[derive(ToSchema, Serialize, Debug)]
#[serde(untagged)]
pub enum CheckConfirmResponse {
    Noty {
        message: String,
        #[serde(rename = "type")]
        kind: &'static str,
    },
    PassChange {
        message: String,
        #[serde(rename = "type")]
        kind: &'static str,
        login: String,
        disp: String,
        avatar: String,
    },
}

#[utoipa::path(
    post,
    path= "/check-confirm",
    request_body = CheckConfirm,
    responses (
        (status = 200, description = "Key resolved", body = [CheckConfirmResponse]),
        (status = 400, description = "Key has an impossible length"),
        (status = 401, description = "Key doesn't exist or has expired"),
    ),
    tag= "auth"
)]
#[instrument(skip(pool, payload))]
pub async fn check_confirm(
    pool: Extension<PgPool>,
    payload: Option<Json<CheckConfirm>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(payload)) = payload else {
        return Err(AuthError::bad_params());
    };

    let key = payload.key.trim();
    if key.len() != CONFIRM_KEY_REGISTER_LEN && key.len() != CONFIRM_KEY_RECALL_LEN {
        return Err(AuthError::bad_params());
    }

    let Some(confirm) = storage::lookup_confirm(&pool, key)
        .await
        .map_err(AuthError::Internal)?
    else {
        return Err(AuthError::BadParams(
            constants::AUTHENTICATION_KEY_DOESNT_EXISTS,
        ));
    };

    let response = if key.len() == CONFIRM_KEY_REGISTER_LEN {
        // Registration confirmation activates the account and burns the key.
        storage::confirm_registration(&pool, &confirm.key, confirm.user.id)
            .await
            .map_err(AuthError::Internal)?;

        info!("registration confirmed for {}", confirm.user.login);

        CheckConfirmResponse::Noty {
            message: "Thank you! Your registration is confirmed. Now you can login \
                      using your login and password"
                .to_string(),
            kind: "noty",
        }
    } else {
        // Recovery keys survive this check; /pass-change-recall consumes them.
        CheckConfirmResponse::PassChange {
            message: "Pass change".to_string(),
            kind: "authPassChange",
            login: confirm.user.login.clone(),
            disp: confirm.user.disp.clone(),
            avatar: confirm.user.avatar_path(),
        }
    };

    Ok((StatusCode::OK, Json(response)))
}
