//! In-memory directory and ledger.
//!
//! Used when no hosted database is configured, and as the fake backend in
//! tests. Both keep per-operation call counters and can be told to fail.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{
    GuestRecord, GuestRow, GuestUpdate, NewGuest, NewVisit, VisitHistory, VisitInsert,
    VisitRecord,
};
use super::traits::{
    GuestDirectory, SEARCH_LIMIT, VisitLedger, check_required_names, normalize_search_query,
};
use crate::error::RemoteError;

fn injected(service: &str) -> RemoteError {
    RemoteError::Backend {
        service: service.to_string(),
        status: 503,
        message: "injected failure".into(),
    }
}

fn name_matches(row: &GuestRow, query: &str) -> bool {
    let q = query.to_lowercase();
    row.first_name.to_lowercase().contains(&q) || row.last_name.to_lowercase().contains(&q)
}

/// Guest directory held in process memory. Rows are kept newest first.
#[derive(Default)]
pub struct InMemoryDirectory {
    rows: RwLock<Vec<GuestRow>>,
    creates: AtomicUsize,
    updates: AtomicUsize,
    lists: AtomicUsize,
    fail_create: AtomicBool,
    fail_list: AtomicBool,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a guest directly, bypassing the create counter.
    pub async fn seed(&self, first_name: &str, last_name: &str) -> GuestRecord {
        let row = Self::new_row(&NewGuest {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            agreed_to_rules: true,
            ..Default::default()
        });
        let record = GuestRecord::from(row.clone());
        self.rows.write().await.insert(0, row);
        record
    }

    /// Stored email for a guest. Test-only peek behind the stripping.
    pub async fn stored_email(&self, id: Uuid) -> Option<String> {
        self.rows
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.email.clone())
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    /// Make every following `create` fail until cleared.
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make every following `list` fail until cleared.
    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    fn new_row(guest: &NewGuest) -> GuestRow {
        let now = Utc::now();
        let clean = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        GuestRow {
            id: Uuid::new_v4(),
            first_name: guest.first_name.trim().to_string(),
            last_name: guest.last_name.trim().to_string(),
            email: clean(&guest.email),
            github_url: clean(&guest.github_url),
            linkedin_url: clean(&guest.linkedin_url),
            instagram_url: clean(&guest.instagram_url),
            x_handle: clean(&guest.x_handle),
            website_url: clean(&guest.website_url),
            image_url: clean(&guest.image_url),
            childhood_dream: clean(&guest.childhood_dream),
            where_from: clean(&guest.where_from),
            why_here: clean(&guest.why_here),
            working_on: clean(&guest.working_on),
            how_to_help: clean(&guest.how_to_help),
            agreed_to_rules: guest.agreed_to_rules,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl GuestDirectory for InMemoryDirectory {
    async fn create(&self, guest: &NewGuest) -> Result<GuestRecord, RemoteError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(injected("directory"));
        }
        check_required_names(guest)?;
        let row = Self::new_row(guest);
        let record = GuestRecord::from(row.clone());
        self.rows.write().await.insert(0, row);
        Ok(record)
    }

    async fn update(&self, id: Uuid, update: &GuestUpdate) -> Result<GuestRecord, RemoteError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RemoteError::NotFound {
                entity: "guest".into(),
                id: id.to_string(),
            })?;
        update.apply_to(row);
        row.updated_at = Utc::now();
        Ok(GuestRecord::from(row.clone()))
    }

    async fn search_by_name(&self, query: &str) -> Result<Vec<GuestRecord>, RemoteError> {
        let query = normalize_search_query(query)?;
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| name_matches(r, query))
            .take(SEARCH_LIMIT)
            .cloned()
            .map(GuestRecord::from)
            .collect())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<GuestRecord, RemoteError> {
        self.rows
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .map(GuestRecord::from)
            .ok_or_else(|| RemoteError::NotFound {
                entity: "guest".into(),
                id: id.to_string(),
            })
    }

    async fn list(&self, query: Option<&str>) -> Result<Vec<GuestRecord>, RemoteError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(injected("directory"));
        }
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| query.is_none_or(|q| name_matches(r, q)))
            .cloned()
            .map(GuestRecord::from)
            .collect())
    }
}

/// Visit ledger held in process memory.
#[derive(Default)]
pub struct InMemoryLedger {
    visits: RwLock<Vec<VisitRecord>>,
    creates: AtomicUsize,
    history_reads: AtomicUsize,
    fail_create: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.history_reads.load(Ordering::SeqCst)
    }

    /// Make every following `create` fail until cleared.
    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Every stored visit, newest check-in first.
    pub async fn all(&self) -> Vec<VisitRecord> {
        let mut visits = self.visits.read().await.clone();
        visits.sort_by(|a, b| b.checkin_at.cmp(&a.checkin_at));
        visits
    }
}

#[async_trait]
impl VisitLedger for InMemoryLedger {
    async fn create(&self, visit: &NewVisit) -> Result<VisitRecord, RemoteError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(injected("ledger"));
        }
        let now = Utc::now();
        let insert = VisitInsert::stamped(visit, now);
        let record = VisitRecord {
            id: Uuid::new_v4(),
            guest_id: insert.homie_id,
            checkin_at: insert.checkin_at,
            checkout_at: None,
            purpose: insert.purpose,
            notes: insert.notes,
            agreed_rules_at: Some(insert.agreed_rules_at),
            source: Some(insert.source),
            created_at: now,
        };
        self.visits.write().await.push(record.clone());
        Ok(record)
    }

    async fn checkout(&self, visit_id: Uuid) -> Result<VisitRecord, RemoteError> {
        let mut visits = self.visits.write().await;
        let visit = visits
            .iter_mut()
            .find(|v| v.id == visit_id)
            .ok_or_else(|| RemoteError::NotFound {
                entity: "visit".into(),
                id: visit_id.to_string(),
            })?;
        if visit.checkout_at.is_none() {
            visit.checkout_at = Some(Utc::now());
        }
        Ok(visit.clone())
    }

    async fn active_for_guest(&self, guest_id: Uuid) -> Result<Option<VisitRecord>, RemoteError> {
        Ok(self
            .all()
            .await
            .into_iter()
            .find(|v| v.guest_id == guest_id && v.is_active()))
    }

    async fn history_for_guest(&self, guest_id: Uuid) -> Result<VisitHistory, RemoteError> {
        self.history_reads.fetch_add(1, Ordering::SeqCst);
        let visits = self
            .all()
            .await
            .into_iter()
            .filter(|v| v.guest_id == guest_id)
            .collect();
        Ok(VisitHistory::from_sorted(visits))
    }

    async fn list_active(&self) -> Result<Vec<VisitRecord>, RemoteError> {
        Ok(self.all().await.into_iter().filter(|v| v.is_active()).collect())
    }
}
