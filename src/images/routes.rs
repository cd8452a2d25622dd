//! REST endpoints for profile image upload and retrieval.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use super::processing::validate_image;
use super::{BlobStore, CapturedImage, ImagePipeline, MAX_IMAGE_BYTES, profile_image_path};
use crate::envelope::{ApiError, Envelope};

/// Request body cap for image uploads: the image plus multipart overhead.
pub const UPLOAD_BODY_LIMIT: usize = MAX_IMAGE_BYTES + 64 * 1024;

/// Shared state for image routes.
#[derive(Clone)]
pub struct ImageRouteState {
    pub pipeline: Arc<dyn ImagePipeline>,
    /// Store backing the proxy route. `None` when images live elsewhere.
    pub store: Option<Arc<dyn BlobStore>>,
}

#[derive(Debug, Serialize)]
pub struct UploadedImage {
    pub url: String,
}

/// Read an image part named `file` and any text parts from a multipart body.
pub async fn read_image_form(
    mut multipart: Multipart,
) -> Result<(Option<CapturedImage>, Vec<(String, String)>), ApiError> {
    let mut image = None;
    let mut fields = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            image = Some(CapturedImage::new(bytes.to_vec(), content_type));
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            fields.push((name, value));
        }
    }
    Ok((image, fields))
}

/// POST /api/profile-image
///
/// Multipart `file` + `homieId`. Validates type and size, then runs the
/// pipeline and returns the stored image URL.
async fn upload_profile_image(
    State(state): State<ImageRouteState>,
    multipart: Multipart,
) -> Result<Envelope<UploadedImage>, ApiError> {
    let (image, fields) = read_image_form(multipart).await?;
    let image = image.ok_or_else(|| ApiError::bad_request("No file provided"))?;
    let guest_id = fields
        .iter()
        .find(|(name, _)| name == "homieId")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request("No homie ID provided"))?;
    let guest_id =
        Uuid::parse_str(&guest_id).map_err(|_| ApiError::bad_request("Invalid homie ID"))?;

    validate_image(&image)?;
    let url = state.pipeline.upload(image, guest_id).await.map_err(|e| {
        warn!(guest_id = %guest_id, error = %e, "Profile image upload failed");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload image")
    })?;
    Ok(Envelope::ok(UploadedImage { url }))
}

/// GET /api/profile-image/{filename}
///
/// Streams a stored profile image back through the service.
async fn get_profile_image(
    State(state): State<ImageRouteState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    if filename.is_empty() || filename.contains('/') || filename.contains("..") {
        return Err(ApiError::bad_request("Invalid file name"));
    }
    let store = state
        .store
        .as_ref()
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Image not found"))?;
    let image = store
        .get(&profile_image_path(&filename))
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Image not found"))?;

    Ok((
        [
            (header::CONTENT_TYPE, image.content_type.clone()),
            (header::CACHE_CONTROL, "public, max-age=31536000".to_string()),
        ],
        Body::from(image.bytes),
    )
        .into_response())
}

/// Build the image routes.
pub fn image_routes(state: ImageRouteState) -> Router {
    Router::new()
        .route("/api/profile-image", post(upload_profile_image))
        .route("/api/profile-image/{filename}", get(get_profile_image))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
        .with_state(state)
}
