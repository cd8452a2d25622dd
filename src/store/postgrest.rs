//! PostgREST backend: talks to the hosted database over its REST API with
//! the service-role key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use super::model::{
    GuestRecord, GuestRow, GuestUpdate, NewGuest, NewVisit, VisitHistory, VisitInsert,
    VisitRecord,
};
use super::traits::{
    GuestDirectory, SEARCH_LIMIT, VisitLedger, check_required_names, normalize_search_query,
};
use crate::config::BackendConfig;
use crate::error::RemoteError;

const GUESTS_TABLE: &str = "homies";
const VISITS_TABLE: &str = "visits";

/// Thin authenticated client for one hosted project.
pub struct PostgrestClient {
    base_url: String,
    service_key: SecretString,
    client: reqwest::Client,
    timeout: Duration,
}

impl PostgrestClient {
    pub fn new(config: &BackendConfig, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::RequestFailed {
                service: "postgrest".into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            base_url: config.base_url.clone(),
            service_key: config.service_key.clone(),
            client,
            timeout,
        })
    }

    /// Request timeout applied to every call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Underlying HTTP client, shared with the storage API.
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    /// Attach the service-role credentials.
    pub fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let key = self.service_key.expose_secret();
        builder.header("apikey", key).bearer_auth(key)
    }

    /// `GET /rest/v1/{table}?{query}`.
    pub async fn select<T: DeserializeOwned>(
        &self,
        service: &str,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, RemoteError> {
        let request = self
            .authorized(self.client.get(self.table_url(table)))
            .query(query);
        self.send_rows(service, request).await
    }

    /// `POST /rest/v1/{table}` returning the inserted row.
    pub async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        service: &str,
        table: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        let request = self
            .authorized(self.client.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(body);
        let rows: Vec<T> = self.send_rows(service, request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RemoteError::InvalidResponse {
                service: service.to_string(),
                reason: "insert returned no rows".into(),
            })
    }

    /// `PATCH /rest/v1/{table}?{filter}` returning every updated row.
    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        service: &str,
        table: &str,
        filter: &[(&str, String)],
        body: &B,
    ) -> Result<Vec<T>, RemoteError> {
        let request = self
            .authorized(self.client.patch(self.table_url(table)))
            .query(filter)
            .header("Prefer", "return=representation")
            .json(body);
        self.send_rows(service, request).await
    }

    async fn send_rows<T: DeserializeOwned>(
        &self,
        service: &str,
        request: RequestBuilder,
    ) -> Result<Vec<T>, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(service, e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = backend_message(&body);
            warn!(service, status = status.as_u16(), %message, "PostgREST request failed");
            return Err(RemoteError::Backend {
                service: service.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| RemoteError::InvalidResponse {
                service: service.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Pull the `message` out of a PostgREST error body, falling back to the raw
/// text.
pub fn backend_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}

/// PostgREST `or` filter matching first or last name case-insensitively.
///
/// Characters that carry meaning inside the filter grammar are dropped.
pub fn ilike_name_filter(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '"' | '\\'))
        .collect();
    format!("(first_name.ilike.*{cleaned}*,last_name.ilike.*{cleaned}*)")
}

/// Guest directory on the `homies` table.
pub struct PostgrestDirectory {
    client: Arc<PostgrestClient>,
}

impl PostgrestDirectory {
    pub fn new(client: Arc<PostgrestClient>) -> Self {
        Self { client }
    }

    fn strip(rows: Vec<GuestRow>) -> Vec<GuestRecord> {
        rows.into_iter().map(GuestRecord::from).collect()
    }
}

#[async_trait]
impl GuestDirectory for PostgrestDirectory {
    async fn create(&self, guest: &NewGuest) -> Result<GuestRecord, RemoteError> {
        check_required_names(guest)?;
        let row: GuestRow = self.client.insert("directory", GUESTS_TABLE, guest).await?;
        debug!(guest_id = %row.id, "Guest created");
        Ok(row.into())
    }

    async fn update(&self, id: Uuid, update: &GuestUpdate) -> Result<GuestRecord, RemoteError> {
        let rows: Vec<GuestRow> = self
            .client
            .patch("directory", GUESTS_TABLE, &[("id", format!("eq.{id}"))], update)
            .await?;
        rows.into_iter()
            .next()
            .map(GuestRecord::from)
            .ok_or_else(|| RemoteError::NotFound {
                entity: "guest".into(),
                id: id.to_string(),
            })
    }

    async fn search_by_name(&self, query: &str) -> Result<Vec<GuestRecord>, RemoteError> {
        let query = normalize_search_query(query)?;
        let rows: Vec<GuestRow> = self
            .client
            .select(
                "directory",
                GUESTS_TABLE,
                &[
                    ("select", "*".to_string()),
                    ("or", ilike_name_filter(query)),
                    ("order", "created_at.desc".to_string()),
                    ("limit", SEARCH_LIMIT.to_string()),
                ],
            )
            .await?;
        Ok(Self::strip(rows))
    }

    async fn get_by_id(&self, id: Uuid) -> Result<GuestRecord, RemoteError> {
        let rows: Vec<GuestRow> = self
            .client
            .select(
                "directory",
                GUESTS_TABLE,
                &[("select", "*".to_string()), ("id", format!("eq.{id}"))],
            )
            .await?;
        rows.into_iter()
            .next()
            .map(GuestRecord::from)
            .ok_or_else(|| RemoteError::NotFound {
                entity: "guest".into(),
                id: id.to_string(),
            })
    }

    async fn list(&self, query: Option<&str>) -> Result<Vec<GuestRecord>, RemoteError> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
            params.push(("or", ilike_name_filter(q)));
        }
        let rows: Vec<GuestRow> = self.client.select("directory", GUESTS_TABLE, &params).await?;
        Ok(Self::strip(rows))
    }
}

/// Visit ledger on the `visits` table.
pub struct PostgrestLedger {
    client: Arc<PostgrestClient>,
}

impl PostgrestLedger {
    pub fn new(client: Arc<PostgrestClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VisitLedger for PostgrestLedger {
    async fn create(&self, visit: &NewVisit) -> Result<VisitRecord, RemoteError> {
        let insert = VisitInsert::stamped(visit, Utc::now());
        let record: VisitRecord = self.client.insert("ledger", VISITS_TABLE, &insert).await?;
        debug!(visit_id = %record.id, guest_id = %record.guest_id, "Visit created");
        Ok(record)
    }

    async fn checkout(&self, visit_id: Uuid) -> Result<VisitRecord, RemoteError> {
        // Only open visits are stamped, so a second checkout keeps the first time.
        let updated: Vec<VisitRecord> = self
            .client
            .patch(
                "ledger",
                VISITS_TABLE,
                &[
                    ("id", format!("eq.{visit_id}")),
                    ("checkout_at", "is.null".to_string()),
                ],
                &serde_json::json!({ "checkout_at": Utc::now() }),
            )
            .await?;
        if let Some(record) = updated.into_iter().next() {
            return Ok(record);
        }

        let existing: Vec<VisitRecord> = self
            .client
            .select(
                "ledger",
                VISITS_TABLE,
                &[("select", "*".to_string()), ("id", format!("eq.{visit_id}"))],
            )
            .await?;
        existing
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound {
                entity: "visit".into(),
                id: visit_id.to_string(),
            })
    }

    async fn active_for_guest(&self, guest_id: Uuid) -> Result<Option<VisitRecord>, RemoteError> {
        let rows: Vec<VisitRecord> = self
            .client
            .select(
                "ledger",
                VISITS_TABLE,
                &[
                    ("select", "*".to_string()),
                    ("homie_id", format!("eq.{guest_id}")),
                    ("checkout_at", "is.null".to_string()),
                    ("order", "checkin_at.desc".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn history_for_guest(&self, guest_id: Uuid) -> Result<VisitHistory, RemoteError> {
        let rows: Vec<VisitRecord> = self
            .client
            .select(
                "ledger",
                VISITS_TABLE,
                &[
                    ("select", "*".to_string()),
                    ("homie_id", format!("eq.{guest_id}")),
                    ("order", "checkin_at.desc".to_string()),
                ],
            )
            .await?;
        Ok(VisitHistory::from_sorted(rows))
    }

    async fn list_active(&self) -> Result<Vec<VisitRecord>, RemoteError> {
        self.client
            .select(
                "ledger",
                VISITS_TABLE,
                &[
                    ("select", "*".to_string()),
                    ("checkout_at", "is.null".to_string()),
                    ("order", "checkin_at.desc".to_string()),
                ],
            )
            .await
    }
}
