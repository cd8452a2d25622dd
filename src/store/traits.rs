//! Backend-agnostic traits for the guest directory and the visit ledger.
//!
//! Every operation returns a `Result` and never panics past the boundary.
//! Nothing returned by a `GuestDirectory` carries a guest's email.

use async_trait::async_trait;
use uuid::Uuid;

use super::model::{GuestRecord, GuestUpdate, NewGuest, NewVisit, VisitHistory, VisitRecord};
use crate::error::RemoteError;

/// Maximum number of rows returned by a name search.
pub const SEARCH_LIMIT: usize = 10;

/// Minimum trimmed length of a server-side name search query.
pub const MIN_SEARCH_LEN: usize = 2;

/// Guest profile storage.
#[async_trait]
pub trait GuestDirectory: Send + Sync {
    /// Create a guest. Fails when first or last name is empty.
    async fn create(&self, guest: &NewGuest) -> Result<GuestRecord, RemoteError>;

    /// Apply the defined fields of `update` to guest `id`.
    async fn update(&self, id: Uuid, update: &GuestUpdate) -> Result<GuestRecord, RemoteError>;

    /// Case-insensitive partial match on first or last name, newest first,
    /// at most [`SEARCH_LIMIT`] rows.
    async fn search_by_name(&self, query: &str) -> Result<Vec<GuestRecord>, RemoteError>;

    /// Fetch one guest.
    async fn get_by_id(&self, id: Uuid) -> Result<GuestRecord, RemoteError>;

    /// All guests, newest first, optionally filtered like `search_by_name`
    /// but without the row cap.
    async fn list(&self, query: Option<&str>) -> Result<Vec<GuestRecord>, RemoteError>;
}

/// Check-in/check-out records.
#[async_trait]
pub trait VisitLedger: Send + Sync {
    /// Check a guest in. Stamps check-in and consent time.
    async fn create(&self, visit: &NewVisit) -> Result<VisitRecord, RemoteError>;

    /// Stamp the check-out time. Checking out twice is not an error.
    async fn checkout(&self, visit_id: Uuid) -> Result<VisitRecord, RemoteError>;

    /// Most recent visit for the guest with no check-out.
    async fn active_for_guest(&self, guest_id: Uuid) -> Result<Option<VisitRecord>, RemoteError>;

    /// Every visit for the guest, newest first.
    async fn history_for_guest(&self, guest_id: Uuid) -> Result<VisitHistory, RemoteError>;

    /// All visits without a check-out, newest check-in first.
    async fn list_active(&self) -> Result<Vec<VisitRecord>, RemoteError>;
}

/// Validate a server-side search query, returning it trimmed.
pub fn normalize_search_query(query: &str) -> Result<&str, RemoteError> {
    let trimmed = query.trim();
    if trimmed.chars().count() < MIN_SEARCH_LEN {
        return Err(RemoteError::Rejected {
            service: "directory".into(),
            reason: "Please enter at least 2 characters".into(),
        });
    }
    Ok(trimmed)
}

/// Reject creates with an empty first or last name.
pub fn check_required_names(guest: &NewGuest) -> Result<(), RemoteError> {
    if guest.first_name.trim().is_empty() || guest.last_name.trim().is_empty() {
        return Err(RemoteError::Rejected {
            service: "directory".into(),
            reason: "First name and last name are required".into(),
        });
    }
    Ok(())
}
