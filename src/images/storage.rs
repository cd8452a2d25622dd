//! Blob storage for profile images and the pipeline that writes to it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::processing::{prepare_profile_image, validate_image};
use super::{
    CapturedImage, ImagePipeline, PROFILE_IMAGE_ROUTE, extension_for, profile_image_filename,
    profile_image_path,
};
use crate::error::RemoteError;
use crate::store::postgrest::{PostgrestClient, backend_message};
use crate::store::{GuestDirectory, GuestUpdate};

/// Object storage keyed by path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store an object. Existing objects are not overwritten.
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str)
    -> Result<(), RemoteError>;

    /// Fetch an object and its content type, `None` if absent.
    async fn get(&self, path: &str) -> Result<Option<CapturedImage>, RemoteError>;
}

/// Hosted storage API of the database project.
pub struct SupabaseStorage {
    client: Arc<PostgrestClient>,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(client: Arc<PostgrestClient>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{path}",
            self.client.base_url(),
            self.bucket
        )
    }
}

#[async_trait]
impl BlobStore for SupabaseStorage {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), RemoteError> {
        let response = self
            .client
            .authorized(self.client.http().post(self.object_url(path)))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest("storage", e, self.client.timeout()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Backend {
                service: "storage".into(),
                status: status.as_u16(),
                message: backend_message(&body),
            });
        }
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<CapturedImage>, RemoteError> {
        let response = self
            .client
            .authorized(self.client.http().get(self.object_url(path)))
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest("storage", e, self.client.timeout()))?;

        let status = response.status();
        // Storage answers 400 with a not_found body for missing objects.
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::BAD_REQUEST {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Backend {
                service: "storage".into(),
                status: status.as_u16(),
                message: backend_message(&body),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::InvalidResponse {
                service: "storage".into(),
                reason: e.to_string(),
            })?;
        Ok(Some(CapturedImage::new(bytes.to_vec(), content_type)))
    }
}

/// Blob store held in process memory.
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: RwLock<HashMap<String, CapturedImage>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), RemoteError> {
        let mut objects = self.objects.write().await;
        if objects.contains_key(path) {
            return Err(RemoteError::Rejected {
                service: "storage".into(),
                reason: format!("object {path} already exists"),
            });
        }
        objects.insert(path.to_string(), CapturedImage::new(bytes, content_type));
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<CapturedImage>, RemoteError> {
        Ok(self.objects.read().await.get(path).cloned())
    }
}

/// Processes images locally, stores them in a [`BlobStore`] and writes the
/// resulting URL back onto the guest.
pub struct StorageImagePipeline {
    store: Arc<dyn BlobStore>,
    directory: Arc<dyn GuestDirectory>,
    target_size: u32,
}

impl StorageImagePipeline {
    pub fn new(
        store: Arc<dyn BlobStore>,
        directory: Arc<dyn GuestDirectory>,
        target_size: u32,
    ) -> Self {
        Self {
            store,
            directory,
            target_size,
        }
    }
}

#[async_trait]
impl ImagePipeline for StorageImagePipeline {
    async fn upload(&self, image: CapturedImage, guest_id: Uuid) -> Result<String, RemoteError> {
        validate_image(&image).map_err(|e| RemoteError::Rejected {
            service: "image pipeline".into(),
            reason: e.to_string(),
        })?;

        let target = self.target_size;
        let prepared = tokio::task::spawn_blocking(move || prepare_profile_image(&image, target))
            .await
            .map_err(|e| RemoteError::RequestFailed {
                service: "image pipeline".into(),
                reason: format!("image task failed: {e}"),
            })?
            .map_err(|e| RemoteError::Rejected {
                service: "image pipeline".into(),
                reason: e.to_string(),
            })?;

        let filename = profile_image_filename(
            guest_id,
            Utc::now().timestamp_millis(),
            extension_for(&prepared.content_type),
        );
        let path = profile_image_path(&filename);
        let content_type = prepared.content_type.clone();
        self.store.put(&path, prepared.bytes, &content_type).await?;

        let url = format!("{PROFILE_IMAGE_ROUTE}/{filename}");
        // The image is stored either way; a failed write-back leaves the
        // guest without a picture but the URL is still valid.
        if let Err(e) = self
            .directory
            .update(guest_id, &GuestUpdate::image_url(url.clone()))
            .await
        {
            warn!(guest_id = %guest_id, error = %e, "Image uploaded but guest update failed");
        }

        info!(guest_id = %guest_id, %url, "Profile image stored");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, RgbImage};

    use super::*;
    use crate::store::InMemoryDirectory;

    fn png() -> CapturedImage {
        let img = DynamicImage::ImageRgb8(RgbImage::new(40, 20));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        CapturedImage::new(out.into_inner(), "image/png")
    }

    #[tokio::test]
    async fn upload_stores_and_writes_back_url() {
        let store = Arc::new(InMemoryBlobStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let guest = directory.seed("Alex", "Chen").await;
        let pipeline = StorageImagePipeline::new(store.clone(), directory.clone(), 8);

        let url = pipeline.upload(png(), guest.id).await.unwrap();
        assert!(url.starts_with(&format!("/api/profile-image/{}_", guest.id)));
        assert!(url.ends_with(".jpg"));
        assert_eq!(store.len().await, 1);

        let refreshed = directory.get_by_id(guest.id).await.unwrap();
        assert_eq!(refreshed.image_url.as_deref(), Some(url.as_str()));

        let filename = url.trim_start_matches("/api/profile-image/");
        let stored = store.get(&profile_image_path(filename)).await.unwrap().unwrap();
        assert_eq!(stored.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn upload_survives_failed_write_back() {
        let store = Arc::new(InMemoryBlobStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let pipeline = StorageImagePipeline::new(store.clone(), directory, 8);

        // Unknown guest: the directory update fails but the URL comes back.
        let url = pipeline.upload(png(), Uuid::new_v4()).await;
        assert!(url.is_ok());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn upload_rejects_unsupported_type() {
        let pipeline = StorageImagePipeline::new(
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(InMemoryDirectory::new()),
            8,
        );
        let result = pipeline
            .upload(CapturedImage::new(vec![1, 2], "text/plain"), Uuid::new_v4())
            .await;
        assert!(matches!(result, Err(RemoteError::Rejected { .. })));
    }

    #[tokio::test]
    async fn in_memory_store_refuses_overwrite() {
        let store = InMemoryBlobStore::new();
        store.put("a/b.jpg", vec![1], "image/jpeg").await.unwrap();
        assert!(store.put("a/b.jpg", vec![2], "image/jpeg").await.is_err());
        assert_eq!(store.get("a/b.jpg").await.unwrap().unwrap().bytes, vec![1]);
        assert!(store.get("missing").await.unwrap().is_none());
    }
}
