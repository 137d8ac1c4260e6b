use crate::photo::fields::{dictionary, IconTheme};
use axum::{extract::Query, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use tracing::instrument;
use utoipa::IntoParams;

#[derive(Deserialize, IntoParams, Debug)]
pub struct PhotoFieldsParams {
    /// Icon variant to render, defaults to the cross-platform set.
    icons: Option<IconTheme>,
}

#[utoipa::path(
    get,
    path= "/photo/fields",
    params(PhotoFieldsParams),
    responses (
        (status = 200, description = "Photo metadata field dictionary"),
    ),
    tag= "photo"
)]
#[instrument]
pub async fn photo_fields(Query(params): Query<PhotoFieldsParams>) -> impl IntoResponse {
    let theme = params.icons.unwrap_or_default();

    (StatusCode::OK, Json(dictionary(theme)))
}
