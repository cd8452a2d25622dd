//! Wiring: pick backends from configuration and assemble the HTTP router.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::access::{AccessGate, InMemoryAccessGate, PostgrestAccessGate, access_routes};
use crate::config::AppConfig;
use crate::error::Error;
use crate::guests::{GuestRouteState, guest_routes};
use crate::images::{
    BlobStore, HttpImagePipeline, ImagePipeline, ImageRouteState, InMemoryBlobStore,
    StorageImagePipeline, SupabaseStorage, image_routes,
};
use crate::onboarding::{FlowServices, OnboardingRouteState, SessionRegistry, onboarding_routes};
use crate::store::{
    GuestDirectory, InMemoryDirectory, InMemoryLedger, PostgrestClient, PostgrestDirectory,
    PostgrestLedger, VisitLedger,
};

/// The remote collaborators the service talks to.
#[derive(Clone)]
pub struct Backends {
    pub directory: Arc<dyn GuestDirectory>,
    pub ledger: Arc<dyn VisitLedger>,
    pub access: Arc<dyn AccessGate>,
    pub images: Arc<dyn ImagePipeline>,
    /// Where stored profile images are read back from, if local.
    pub blobs: Option<Arc<dyn BlobStore>>,
}

impl Backends {
    /// Everything in process memory.
    pub fn in_memory(profile_image_size: u32) -> Self {
        let directory: Arc<dyn GuestDirectory> = Arc::new(InMemoryDirectory::new());
        let blobs: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
        Self {
            images: Arc::new(StorageImagePipeline::new(
                blobs.clone(),
                directory.clone(),
                profile_image_size,
            )),
            directory,
            ledger: Arc::new(InMemoryLedger::new()),
            access: Arc::new(InMemoryAccessGate::new()),
            blobs: Some(blobs),
        }
    }

    /// Hosted database when configured, otherwise in-memory. A configured
    /// remote image pipeline replaces local processing either way.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let mut backends = match &config.backend {
            Some(backend) => {
                let client = Arc::new(PostgrestClient::new(backend, config.request_timeout)?);
                let directory: Arc<dyn GuestDirectory> =
                    Arc::new(PostgrestDirectory::new(client.clone()));
                let blobs: Arc<dyn BlobStore> = Arc::new(SupabaseStorage::new(
                    client.clone(),
                    backend.image_bucket.clone(),
                ));
                info!(base_url = %backend.base_url, bucket = %backend.image_bucket, "Using hosted database");
                Self {
                    images: Arc::new(StorageImagePipeline::new(
                        blobs.clone(),
                        directory.clone(),
                        config.profile_image_size,
                    )),
                    directory,
                    ledger: Arc::new(PostgrestLedger::new(client.clone())),
                    access: Arc::new(PostgrestAccessGate::new(client)),
                    blobs: Some(blobs),
                }
            }
            None => {
                warn!("SUPABASE_URL not set; guests and visits are kept in memory only");
                Self::in_memory(config.profile_image_size)
            }
        };

        if let Some(endpoint) = &config.image_pipeline_url {
            info!(%endpoint, "Using remote image pipeline");
            backends.images = Arc::new(HttpImagePipeline::new(
                endpoint.clone(),
                config.request_timeout,
            )?);
        }
        Ok(backends)
    }

    pub fn flow_services(&self, config: &AppConfig) -> FlowServices {
        FlowServices {
            directory: self.directory.clone(),
            ledger: self.ledger.clone(),
            images: self.images.clone(),
            image_upload_timeout: config.image_upload_timeout,
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Build the full router.
pub fn build_router(
    backends: &Backends,
    sessions: Arc<SessionRegistry>,
    config: &AppConfig,
) -> Router {
    let onboarding = OnboardingRouteState {
        sessions,
        access: backends.access.clone(),
        require_welcome_code: config.require_welcome_code,
    };
    let images = ImageRouteState {
        pipeline: backends.images.clone(),
        store: backends.blobs.clone(),
    };
    let guests = GuestRouteState {
        directory: backends.directory.clone(),
        ledger: backends.ledger.clone(),
    };

    Router::new()
        .route("/health", get(health))
        .merge(access_routes(backends.access.clone()))
        .merge(onboarding_routes(onboarding))
        .merge(image_routes(images))
        .merge(guest_routes(guests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
