//! REST endpoints that drive an onboarding session.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use super::manager::{FlowStatus, OnboardingFlow};
use super::model::{PersonalInfo, ProfileAnswers};
use super::search::SearchOutcome;
use super::sessions::SessionRegistry;
use crate::access::{AccessGate, CodeStatus};
use crate::envelope::{ApiError, Envelope};
use crate::error::FlowError;
use crate::images::{UPLOAD_BODY_LIMIT, read_image_form};

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub sessions: Arc<SessionRegistry>,
    pub access: Arc<dyn AccessGate>,
    /// Refuse to start a session without a valid welcome code.
    pub require_welcome_code: bool,
}

type FlowResponse = Result<Envelope<FlowStatus>, ApiError>;

#[derive(Debug, Deserialize)]
struct StartRequest {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Deserialize)]
struct SelectRequest {
    guest_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct NotFoundRequest {
    query: String,
}

#[derive(Debug, Deserialize)]
struct RulesRequest {
    #[serde(default)]
    agreed: bool,
}

async fn flow(state: &OnboardingRouteState, id: Uuid) -> Result<Arc<OnboardingFlow>, ApiError> {
    Ok(state.sessions.get(id).await?)
}

fn reply(result: Result<FlowStatus, FlowError>) -> FlowResponse {
    Ok(Envelope::ok(result?))
}

async fn check_welcome_code(
    state: &OnboardingRouteState,
    code: Option<&str>,
) -> Result<(), ApiError> {
    if !state.require_welcome_code {
        return Ok(());
    }
    let code = code
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| FlowError::AccessDenied("Code is required".into()))?;
    match state.access.validate(code).await? {
        CodeStatus::Valid => Ok(()),
        status => {
            debug!(?status, "Session start refused");
            let reason = status.message().unwrap_or("Invalid code");
            Err(FlowError::AccessDenied(reason.into()).into())
        }
    }
}

/// POST /api/onboarding/sessions
async fn start_session(
    State(state): State<OnboardingRouteState>,
    body: Option<Json<StartRequest>>,
) -> FlowResponse {
    let code = body.and_then(|Json(b)| b.code);
    check_welcome_code(&state, code.as_deref()).await?;
    let flow = state.sessions.create().await;
    Ok(Envelope::ok(flow.status().await))
}

/// GET /api/onboarding/sessions/{id}
async fn get_session(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
) -> FlowResponse {
    Ok(Envelope::ok(flow(&state, id).await?.status().await))
}

/// DELETE /api/onboarding/sessions/{id}
async fn leave_session(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
) -> Result<Envelope<()>, ApiError> {
    if state.sessions.remove(id).await {
        Ok(Envelope::ok(()))
    } else {
        Err(FlowError::SessionNotFound(id).into())
    }
}

async fn choose_returning(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
) -> FlowResponse {
    reply(flow(&state, id).await?.choose_returning().await)
}

async fn choose_first_time(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
) -> FlowResponse {
    reply(flow(&state, id).await?.choose_first_time().await)
}

/// GET /api/onboarding/sessions/{id}/search?q=
async fn search(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Query(params): Query<SearchParams>,
) -> Result<Envelope<SearchOutcome>, ApiError> {
    let outcome = flow(&state, id).await?.search(&params.q).await?;
    Ok(Envelope::ok(outcome))
}

async fn select_guest(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SelectRequest>,
) -> FlowResponse {
    reply(flow(&state, id).await?.select_guest(body.guest_id).await)
}

async fn continue_as_new(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Json(body): Json<NotFoundRequest>,
) -> FlowResponse {
    reply(flow(&state, id).await?.continue_as_new(&body.query).await)
}

async fn accept_rules(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Json(body): Json<RulesRequest>,
) -> FlowResponse {
    reply(flow(&state, id).await?.accept_rules(body.agreed).await)
}

async fn personal_info(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Json(body): Json<PersonalInfo>,
) -> FlowResponse {
    reply(flow(&state, id).await?.submit_personal_info(body).await)
}

/// POST /api/onboarding/sessions/{id}/picture
///
/// Multipart with a `file` part. The image is held in the session and
/// uploaded when check-in completes.
async fn capture_picture(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> FlowResponse {
    let flow = flow(&state, id).await?;
    let (image, _) = read_image_form(multipart).await?;
    let image = image.ok_or_else(|| ApiError::bad_request("No file provided"))?;
    reply(flow.capture_image(image).await)
}

async fn skip_picture(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
) -> FlowResponse {
    reply(flow(&state, id).await?.skip_picture().await)
}

async fn profile_questions(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ProfileAnswers>,
) -> FlowResponse {
    reply(flow(&state, id).await?.submit_profile_questions(body).await)
}

async fn back(State(state): State<OnboardingRouteState>, Path(id): Path<Uuid>) -> FlowResponse {
    reply(flow(&state, id).await?.back().await)
}

async fn restart(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<Uuid>,
) -> FlowResponse {
    Ok(Envelope::ok(flow(&state, id).await?.restart().await))
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/onboarding/sessions", post(start_session))
        .route(
            "/api/onboarding/sessions/{id}",
            get(get_session).delete(leave_session),
        )
        .route("/api/onboarding/sessions/{id}/returning", post(choose_returning))
        .route("/api/onboarding/sessions/{id}/first-time", post(choose_first_time))
        .route("/api/onboarding/sessions/{id}/search", get(search))
        .route("/api/onboarding/sessions/{id}/select", post(select_guest))
        .route("/api/onboarding/sessions/{id}/not-found", post(continue_as_new))
        .route("/api/onboarding/sessions/{id}/rules", post(accept_rules))
        .route("/api/onboarding/sessions/{id}/personal-info", post(personal_info))
        .route(
            "/api/onboarding/sessions/{id}/picture",
            post(capture_picture).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/api/onboarding/sessions/{id}/picture/skip", post(skip_picture))
        .route("/api/onboarding/sessions/{id}/questions", post(profile_questions))
        .route("/api/onboarding/sessions/{id}/back", post(back))
        .route("/api/onboarding/sessions/{id}/restart", post(restart))
        .with_state(state)
}
