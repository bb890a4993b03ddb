//! HTTP handlers.

pub mod health;
pub mod labels;
pub mod verify;

use crate::error::ApiResult;
use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde_json::json;

/// `GET /`
pub async fn banner() -> &'static str {
    concat!("facegated ", env!("CARGO_PKG_VERSION"), ": face reference matcher\n")
}

/// Fallback for unknown routes.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "not found" })),
    )
}

/// The multipart fields the upload and verify endpoints read.
#[derive(Debug, Default)]
pub(crate) struct ImageForm {
    pub name: Option<String>,
    pub image: Option<Bytes>,
}

/// Collect `name` and `image` from a multipart body, skipping other fields.
pub(crate) async fn read_image_form(mut multipart: Multipart) -> ApiResult<ImageForm> {
    let mut form = ImageForm::default();
    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("name") => form.name = Some(field.text().await?),
            Some("image") => form.image = Some(field.bytes().await?),
            _ => {}
        }
    }
    Ok(form)
}
