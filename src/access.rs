//! Welcome codes: short-lived codes that gate the onboarding page.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::RemoteError;
use crate::store::postgrest::PostgrestClient;

const WELCOME_CODES_TABLE: &str = "welcome_codes";

/// Outcome of checking a welcome code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeStatus {
    Valid,
    Invalid,
    Expired,
}

impl CodeStatus {
    /// Classify a stored expiry against the current time.
    pub fn from_expiry(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match expires_at {
            None => Self::Invalid,
            Some(at) if now > at => Self::Expired,
            Some(_) => Self::Valid,
        }
    }

    /// User-facing reason for a non-valid code.
    pub fn message(&self) -> Option<&'static str> {
        match self {
            Self::Valid => None,
            Self::Invalid => Some("Invalid code"),
            Self::Expired => Some("Code has expired"),
        }
    }
}

/// Checks welcome codes.
#[async_trait]
pub trait AccessGate: Send + Sync {
    async fn validate(&self, code: &str) -> Result<CodeStatus, RemoteError>;
}

#[derive(Debug, Deserialize)]
struct WelcomeCodeRow {
    expires_at: DateTime<Utc>,
}

/// Welcome codes stored in the hosted `welcome_codes` table.
pub struct PostgrestAccessGate {
    client: Arc<PostgrestClient>,
}

impl PostgrestAccessGate {
    pub fn new(client: Arc<PostgrestClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AccessGate for PostgrestAccessGate {
    async fn validate(&self, code: &str) -> Result<CodeStatus, RemoteError> {
        let rows: Vec<WelcomeCodeRow> = self
            .client
            .select(
                "welcome codes",
                WELCOME_CODES_TABLE,
                &[
                    ("select", "id,expires_at".to_string()),
                    ("code", format!("eq.{code}")),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(CodeStatus::from_expiry(
            rows.first().map(|r| r.expires_at),
            Utc::now(),
        ))
    }
}

/// Welcome codes held in process memory.
#[derive(Default)]
pub struct InMemoryAccessGate {
    codes: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryAccessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a code valid until `expires_at`.
    pub async fn insert(&self, code: impl Into<String>, expires_at: DateTime<Utc>) {
        self.codes.write().await.insert(code.into(), expires_at);
    }
}

#[async_trait]
impl AccessGate for InMemoryAccessGate {
    async fn validate(&self, code: &str) -> Result<CodeStatus, RemoteError> {
        let expires_at = self.codes.read().await.get(code).copied();
        Ok(CodeStatus::from_expiry(expires_at, Utc::now()))
    }
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Serialize)]
struct ValidateResponse {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ValidateResponse {
    fn reply(status: StatusCode, valid: bool, error: Option<&str>) -> Response {
        (
            status,
            Json(Self {
                valid,
                error: error.map(String::from),
            }),
        )
            .into_response()
    }
}

/// POST /api/welcome-code/validate
///
/// `{code}` -> `{valid: true}`, or `{valid: false, error}` with 400 for a
/// missing code, 401 for an unknown or expired one, 500 on backend failure.
async fn validate_code(
    State(gate): State<Arc<dyn AccessGate>>,
    Json(body): Json<ValidateRequest>,
) -> Response {
    let Some(code) = body.code.filter(|c| !c.trim().is_empty()) else {
        return ValidateResponse::reply(StatusCode::BAD_REQUEST, false, Some("Code is required"));
    };

    match gate.validate(code.trim()).await {
        Ok(CodeStatus::Valid) => ValidateResponse::reply(StatusCode::OK, true, None),
        Ok(status) => {
            debug!(?status, "Welcome code rejected");
            ValidateResponse::reply(StatusCode::UNAUTHORIZED, false, status.message())
        }
        Err(e) => {
            warn!(error = %e, "Welcome code validation failed");
            ValidateResponse::reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                Some("Failed to validate code"),
            )
        }
    }
}

/// Build the welcome-code route.
pub fn access_routes(gate: Arc<dyn AccessGate>) -> Router {
    Router::new()
        .route("/api/welcome-code/validate", post(validate_code))
        .with_state(gate)
}
