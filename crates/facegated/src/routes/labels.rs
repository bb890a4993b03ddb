use super::read_image_form;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    /// Label the sample was stored under.
    pub folder: String,
    /// Sample name within the label.
    pub file: String,
    /// Full store key.
    pub key: String,
    /// Index version that first includes the sample.
    pub version: u64,
}

/// `POST /loadimages` and `POST /api/load-labeled-descriptors`
///
/// Multipart fields `name` (the label) and `image`. Responds once the
/// sample is stored and the rebuilt index is published.
pub async fn upload_labeled_image(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let services = state.ready()?;
    let form = read_image_form(multipart).await?;
    let label = form.name.ok_or(ApiError::MissingField("name"))?;
    let image = form.image.ok_or(ApiError::MissingField("image"))?;

    let receipt = services.coordinator.ingest(&label, image).await?;
    let file = receipt
        .key
        .rsplit_once('/')
        .map_or(receipt.key.as_str(), |(_, name)| name)
        .to_string();

    tracing::info!(label = %label.trim(), key = %receipt.key, version = receipt.version, "labeled image uploaded");

    Ok(Json(UploadResponse {
        success: true,
        message: "Image uploaded successfully".to_string(),
        folder: label.trim().to_string(),
        file,
        key: receipt.key,
        version: receipt.version,
    }))
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub success: bool,
    pub version: u64,
}

/// `POST /api/reload`
pub async fn reload_index(State(state): State<Arc<AppState>>) -> ApiResult<Json<ReloadResponse>> {
    let version = state.reload().await?;
    Ok(Json(ReloadResponse {
        success: true,
        version,
    }))
}
