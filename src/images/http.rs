//! Client for a remote image pipeline endpoint.
//!
//! Posts `multipart/form-data` with `file` and `homieId` parts and expects
//! `{url}` back, either bare or inside the response envelope.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{CapturedImage, ImagePipeline, extension_for};
use crate::error::RemoteError;

const SERVICE: &str = "image pipeline";

#[derive(Debug, Deserialize)]
struct UrlBody {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UploadResponse {
    Wrapped { data: UrlBody },
    Bare { url: String },
}

/// Uploads profile images to an HTTP endpoint.
pub struct HttpImagePipeline {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpImagePipeline {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::RequestFailed {
                service: SERVICE.into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
            timeout,
        })
    }
}

/// Pull the URL out of a successful response body.
fn parse_upload_response(body: &str) -> Result<String, RemoteError> {
    match serde_json::from_str::<UploadResponse>(body) {
        Ok(UploadResponse::Wrapped { data }) => Ok(data.url),
        Ok(UploadResponse::Bare { url }) => Ok(url),
        Err(e) => Err(RemoteError::InvalidResponse {
            service: SERVICE.into(),
            reason: e.to_string(),
        }),
    }
}

/// Pull the error message out of a failed response body.
fn parse_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| "Upload failed".to_string())
}

#[async_trait]
impl ImagePipeline for HttpImagePipeline {
    async fn upload(&self, image: CapturedImage, guest_id: Uuid) -> Result<String, RemoteError> {
        let file_name = format!("profile.{}", extension_for(&image.content_type));
        let part = Part::bytes(image.bytes)
            .file_name(file_name)
            .mime_str(&image.content_type)
            .map_err(|e| RemoteError::Rejected {
                service: SERVICE.into(),
                reason: e.to_string(),
            })?;
        let form = Form::new()
            .part("file", part)
            .text("homieId", guest_id.to_string());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(SERVICE, e, self.timeout))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let message = parse_error_message(&body);
            warn!(status = status.as_u16(), %message, "Remote image upload failed");
            return Err(RemoteError::Backend {
                service: SERVICE.into(),
                status: status.as_u16(),
                message,
            });
        }

        let url = parse_upload_response(&body)?;
        info!(guest_id = %guest_id, %url, "Profile image uploaded");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_url() {
        let url = parse_upload_response(r#"{"success":true,"url":"/api/profile-image/a.jpg"}"#)
            .unwrap();
        assert_eq!(url, "/api/profile-image/a.jpg");
    }

    #[test]
    fn parses_enveloped_url() {
        let url =
            parse_upload_response(r#"{"success":true,"data":{"url":"/api/profile-image/b.jpg"}}"#)
                .unwrap();
        assert_eq!(url, "/api/profile-image/b.jpg");
    }

    #[test]
    fn missing_url_is_invalid_response() {
        assert!(matches!(
            parse_upload_response(r#"{"success":true}"#),
            Err(RemoteError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn error_message_falls_back() {
        assert_eq!(parse_error_message(r#"{"error":"No file provided"}"#), "No file provided");
        assert_eq!(parse_error_message("<html>"), "Upload failed");
    }
}
