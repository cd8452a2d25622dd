//! Profile image pipeline: validate, crop to square, resize, store, and hand
//! back a URL the guest profile can point at.

pub mod http;
pub mod processing;
pub mod routes;
pub mod storage;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RemoteError;

pub use http::HttpImagePipeline;
pub use processing::{prepare_profile_image, validate_image};
pub use routes::{ImageRouteState, UPLOAD_BODY_LIMIT, image_routes, read_image_form};
pub use storage::{BlobStore, InMemoryBlobStore, StorageImagePipeline, SupabaseStorage};

/// Largest accepted upload, in bytes.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Accepted upload content types.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// Storage folder for profile images.
pub const PROFILE_IMAGE_FOLDER: &str = "profile-images";

/// Public path prefix the proxy route serves stored images under.
pub const PROFILE_IMAGE_ROUTE: &str = "/api/profile-image";

/// An image captured or uploaded by a guest, not yet stored anywhere.
#[derive(Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl CapturedImage {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into().to_ascii_lowercase(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedImage")
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Turns a captured image into a stored profile picture for a guest.
#[async_trait]
pub trait ImagePipeline: Send + Sync {
    /// Process and store `image` for `guest_id`, returning its URL.
    async fn upload(&self, image: CapturedImage, guest_id: Uuid) -> Result<String, RemoteError>;
}

/// File extension for an accepted content type.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

/// Storage file name: `{guest_id}_{unix_millis}.{ext}`.
pub fn profile_image_filename(guest_id: Uuid, millis: i64, extension: &str) -> String {
    format!("{guest_id}_{millis}.{extension}")
}

/// Storage path of a profile image file.
pub fn profile_image_path(filename: &str) -> String {
    format!("{PROFILE_IMAGE_FOLDER}/{filename}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_includes_guest_and_timestamp() {
        let id = Uuid::nil();
        assert_eq!(
            profile_image_filename(id, 1700000000000, "jpg"),
            "00000000-0000-0000-0000-000000000000_1700000000000.jpg"
        );
    }

    #[test]
    fn extension_defaults_to_jpg() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("image/jpg"), "jpg");
    }

    #[test]
    fn debug_hides_bytes() {
        let image = CapturedImage::new(vec![1, 2, 3], "IMAGE/PNG");
        assert_eq!(image.content_type, "image/png");
        assert_eq!(format!("{image:?}"), "CapturedImage { content_type: \"image/png\", len: 3 }");
    }
}
