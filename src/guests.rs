//! Who is here right now: every guest with their active visit, if any, and
//! the check-out endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::envelope::{ApiError, Envelope};
use crate::store::{GuestDirectory, GuestRecord, VisitLedger, VisitRecord};

/// Shared state for presence routes.
#[derive(Clone)]
pub struct GuestRouteState {
    pub directory: Arc<dyn GuestDirectory>,
    pub ledger: Arc<dyn VisitLedger>,
}

/// A guest plus their current check-in.
#[derive(Debug, Clone, Serialize)]
pub struct GuestPresence {
    #[serde(flatten)]
    pub guest: GuestRecord,
    pub is_active: bool,
    pub checkin_at: Option<DateTime<Utc>>,
    pub visit_id: Option<Uuid>,
}

/// Join guests with active visits. Checked-in guests come first, latest
/// check-in first; everyone else keeps directory order.
pub fn presence(guests: Vec<GuestRecord>, active: &[VisitRecord]) -> Vec<GuestPresence> {
    let by_guest: HashMap<Uuid, &VisitRecord> = active
        .iter()
        .rev()
        .map(|v| (v.guest_id, v))
        .collect();

    let mut rows: Vec<GuestPresence> = guests
        .into_iter()
        .map(|guest| {
            let visit = by_guest.get(&guest.id);
            GuestPresence {
                is_active: visit.is_some(),
                checkin_at: visit.map(|v| v.checkin_at),
                visit_id: visit.map(|v| v.id),
                guest,
            }
        })
        .collect();

    rows.sort_by(|a, b| match (a.checkin_at, b.checkin_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    rows
}

/// GET /api/guests
async fn list_guests(
    State(state): State<GuestRouteState>,
) -> Result<Envelope<Vec<GuestPresence>>, ApiError> {
    let guests = state.directory.list(None).await.inspect_err(|e| {
        warn!(error = %e, "Failed to list guests");
    })?;
    let active = state.ledger.list_active().await.inspect_err(|e| {
        warn!(error = %e, "Failed to list active visits");
    })?;
    Ok(Envelope::ok(presence(guests, &active)))
}

/// POST /api/visits/{id}/checkout
async fn checkout(
    State(state): State<GuestRouteState>,
    Path(visit_id): Path<Uuid>,
) -> Result<Envelope<VisitRecord>, ApiError> {
    let visit = state.ledger.checkout(visit_id).await?;
    info!(%visit_id, guest_id = %visit.guest_id, "Guest checked out");
    Ok(Envelope::ok(visit))
}

/// Build the presence routes.
pub fn guest_routes(state: GuestRouteState) -> Router {
    Router::new()
        .route("/api/guests", get(list_guests))
        .route("/api/visits/{id}/checkout", post(checkout))
        .with_state(state)
}
