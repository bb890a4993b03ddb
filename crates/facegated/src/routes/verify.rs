use super::read_image_form;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Multipart, State};
use axum::Json;
use facegate_core::MatchResult;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    /// `"<label> (distance: <d>)"` or `"unknown"`, one per detected face.
    pub matches: Vec<String>,
    /// The same results in structured form.
    pub results: Vec<MatchResult>,
}

/// `POST /api/verify-face`
///
/// Multipart field `image`. Every detected face gets one entry, in
/// detection order; an image without faces yields an empty list.
pub async fn verify_face(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<Json<VerifyResponse>> {
    let services = state.ready()?;
    let form = read_image_form(multipart).await?;
    let image = form.image.ok_or(ApiError::MissingField("image"))?;

    let results = services.verifier.verify(&image).await?;
    let matches = results.iter().map(ToString::to_string).collect();

    Ok(Json(VerifyResponse {
        success: true,
        matches,
        results,
    }))
}
