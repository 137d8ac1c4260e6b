use crate::api::{
    error::AuthError,
    session,
    storage::PublicUser,
};
use axum::{extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use sqlx::PgPool;
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Debug)]
pub struct WhoAmI {
    user: Option<PublicUser>,
    registered: bool,
}

#[utoipa::path(
    get,
    path= "/whoami",
    responses (
        (status = 200, description = "Current session profile, or anonymous", body = [WhoAmI]),
    ),
    tag= "auth"
)]
#[instrument(skip(pool, headers))]
pub async fn who_am_i(
    pool: Extension<PgPool>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    let user = session::authenticate(&pool, &headers).await?;

    let registered = user.is_some();
    Ok((
        StatusCode::OK,
        Json(WhoAmI {
            user: user.map(|user| user.public()),
            registered,
        }),
    ))
}
