//! Guest and visit records as stored by the hosted database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source tag stamped on visits created by the web check-in.
pub const VISIT_SOURCE_WEB: &str = "web";

/// Purpose recorded for a returning guest's check-in.
pub const RETURNING_VISIT_PURPOSE: &str = "Returning visit";

/// Full guest row as the directory stores it, email included.
///
/// Only the directory backend sees this type. Everything it hands out is a
/// [`GuestRecord`], which has no email field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestRow {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub instagram_url: Option<String>,
    #[serde(default)]
    pub x_handle: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default, rename = "homie_image_url")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub childhood_dream: Option<String>,
    #[serde(default)]
    pub where_from: Option<String>,
    #[serde(default, rename = "why_billabong")]
    pub why_here: Option<String>,
    #[serde(default)]
    pub working_on: Option<String>,
    #[serde(default)]
    pub how_to_help: Option<String>,
    pub agreed_to_rules: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A guest profile as returned to callers. Never carries the email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestRecord {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub instagram_url: Option<String>,
    pub x_handle: Option<String>,
    pub website_url: Option<String>,
    pub image_url: Option<String>,
    pub childhood_dream: Option<String>,
    pub where_from: Option<String>,
    pub why_here: Option<String>,
    pub working_on: Option<String>,
    pub how_to_help: Option<String>,
    pub agreed_to_rules: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GuestRecord {
    /// "First Last", as used for name search.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl From<GuestRow> for GuestRecord {
    fn from(row: GuestRow) -> Self {
        Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            github_url: row.github_url,
            linkedin_url: row.linkedin_url,
            instagram_url: row.instagram_url,
            x_handle: row.x_handle,
            website_url: row.website_url,
            image_url: row.image_url,
            childhood_dream: row.childhood_dream,
            where_from: row.where_from,
            why_here: row.why_here,
            working_on: row.working_on,
            how_to_help: row.how_to_help,
            agreed_to_rules: row.agreed_to_rules,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Fields for creating a guest. Column names match the `homies` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewGuest {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub instagram_url: Option<String>,
    pub x_handle: Option<String>,
    pub website_url: Option<String>,
    #[serde(rename = "homie_image_url")]
    pub image_url: Option<String>,
    /// Kept in memory only; the `homies` table has no column for it.
    #[serde(skip_serializing)]
    pub childhood_dream: Option<String>,
    pub where_from: Option<String>,
    #[serde(rename = "why_billabong")]
    pub why_here: Option<String>,
    pub working_on: Option<String>,
    pub how_to_help: Option<String>,
    pub agreed_to_rules: bool,
}

/// Partial guest update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GuestUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "homie_image_url")]
    pub image_url: Option<String>,
    #[serde(skip_serializing)]
    pub childhood_dream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub where_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "why_billabong")]
    pub why_here: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub how_to_help: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreed_to_rules: Option<bool>,
}

impl GuestUpdate {
    /// Update that only sets the profile image URL.
    pub fn image_url(url: impl Into<String>) -> Self {
        Self {
            image_url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Apply the defined fields onto a stored row.
    pub fn apply_to(&self, row: &mut GuestRow) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }
        fn set_opt(target: &mut Option<String>, value: &Option<String>) {
            if let Some(v) = value {
                *target = if v.is_empty() { None } else { Some(v.clone()) };
            }
        }

        set(&mut row.first_name, &self.first_name);
        set(&mut row.last_name, &self.last_name);
        set_opt(&mut row.email, &self.email);
        set_opt(&mut row.github_url, &self.github_url);
        set_opt(&mut row.linkedin_url, &self.linkedin_url);
        set_opt(&mut row.instagram_url, &self.instagram_url);
        set_opt(&mut row.x_handle, &self.x_handle);
        set_opt(&mut row.website_url, &self.website_url);
        set_opt(&mut row.image_url, &self.image_url);
        set_opt(&mut row.childhood_dream, &self.childhood_dream);
        set_opt(&mut row.where_from, &self.where_from);
        set_opt(&mut row.why_here, &self.why_here);
        set_opt(&mut row.working_on, &self.working_on);
        set_opt(&mut row.how_to_help, &self.how_to_help);
        set(&mut row.agreed_to_rules, &self.agreed_to_rules);
    }
}

/// One check-in/check-out session for a guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub id: Uuid,
    #[serde(rename = "homie_id")]
    pub guest_id: Uuid,
    pub checkin_at: DateTime<Utc>,
    #[serde(default)]
    pub checkout_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub agreed_rules_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl VisitRecord {
    /// Whether the guest has not checked out yet.
    pub fn is_active(&self) -> bool {
        self.checkout_at.is_none()
    }
}

/// Request to check a guest in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVisit {
    pub guest_id: Uuid,
    pub purpose: Option<String>,
    pub notes: Option<String>,
}

/// Insert payload for the `visits` table. Timestamps are stamped at call time.
#[derive(Debug, Clone, Serialize)]
pub struct VisitInsert {
    pub homie_id: Uuid,
    pub purpose: Option<String>,
    pub notes: Option<String>,
    pub agreed_rules_at: DateTime<Utc>,
    pub source: String,
    pub checkin_at: DateTime<Utc>,
}

impl VisitInsert {
    pub fn stamped(visit: &NewVisit, now: DateTime<Utc>) -> Self {
        Self {
            homie_id: visit.guest_id,
            purpose: visit.purpose.clone().filter(|p| !p.is_empty()),
            notes: visit.notes.clone().filter(|n| !n.is_empty()),
            agreed_rules_at: now,
            source: VISIT_SOURCE_WEB.to_string(),
            checkin_at: now,
        }
    }
}

/// All visits for one guest, newest check-in first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitHistory {
    pub visits: Vec<VisitRecord>,
    pub total_visits: usize,
    pub last_visit: Option<DateTime<Utc>>,
}

impl VisitHistory {
    /// Build a history from visits already sorted newest first.
    pub fn from_sorted(visits: Vec<VisitRecord>) -> Self {
        let total_visits = visits.len();
        let last_visit = visits.first().map(|v| v.checkin_at);
        Self {
            visits,
            total_visits,
            last_visit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> GuestRow {
        let now = Utc::now();
        GuestRow {
            id: Uuid::new_v4(),
            first_name: "Alex".into(),
            last_name: "Chen".into(),
            email: Some("alex@example.com".into()),
            github_url: None,
            linkedin_url: None,
            instagram_url: None,
            x_handle: None,
            website_url: None,
            image_url: None,
            childhood_dream: None,
            where_from: Some("Oakland".into()),
            why_here: Some("Hacking".into()),
            working_on: None,
            how_to_help: None,
            agreed_to_rules: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn record_serialization_never_contains_email() {
        let record = GuestRecord::from(row());
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("email").is_none());
        assert!(!json.to_string().contains("alex@example.com"));
    }

    #[test]
    fn row_reads_database_column_names() {
        let json = serde_json::json!({
            "id": Uuid::new_v4(),
            "first_name": "Sam",
            "last_name": "Alvarez",
            "email": null,
            "why_billabong": "friends",
            "homie_image_url": "/api/profile-image/a.jpg",
            "agreed_to_rules": true,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        });
        let row: GuestRow = serde_json::from_value(json).unwrap();
        assert_eq!(row.why_here.as_deref(), Some("friends"));
        assert_eq!(row.image_url.as_deref(), Some("/api/profile-image/a.jpg"));
    }

    #[test]
    fn update_only_touches_defined_fields() {
        let mut stored = row();
        let update = GuestUpdate {
            working_on: Some("a compiler".into()),
            where_from: Some(String::new()),
            ..Default::default()
        };
        update.apply_to(&mut stored);
        assert_eq!(stored.working_on.as_deref(), Some("a compiler"));
        assert!(stored.where_from.is_none(), "empty string clears the field");
        assert_eq!(stored.why_here.as_deref(), Some("Hacking"));
        assert_eq!(stored.email.as_deref(), Some("alex@example.com"));
    }

    #[test]
    fn new_guest_payload_matches_table_columns() {
        let guest = NewGuest {
            first_name: "Maya".into(),
            last_name: "Lopez".into(),
            childhood_dream: Some("astronaut".into()),
            agreed_to_rules: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&guest).unwrap();
        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "agreed_to_rules",
                "email",
                "first_name",
                "github_url",
                "homie_image_url",
                "how_to_help",
                "instagram_url",
                "last_name",
                "linkedin_url",
                "website_url",
                "where_from",
                "why_billabong",
                "working_on",
                "x_handle",
            ]
        );
    }

    #[test]
    fn update_never_sends_childhood_dream() {
        let update = GuestUpdate {
            childhood_dream: Some("astronaut".into()),
            working_on: Some("a compiler".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({"working_on": "a compiler"}));
    }

    #[test]
    fn update_serializes_only_defined_fields() {
        let json = serde_json::to_value(GuestUpdate::image_url("/img.jpg")).unwrap();
        assert_eq!(json, serde_json::json!({"homie_image_url": "/img.jpg"}));
    }

    #[test]
    fn visit_insert_stamps_consent_and_source() {
        let now = Utc::now();
        let insert = VisitInsert::stamped(
            &NewVisit {
                guest_id: Uuid::new_v4(),
                purpose: Some(String::new()),
                notes: None,
            },
            now,
        );
        assert_eq!(insert.agreed_rules_at, now);
        assert_eq!(insert.checkin_at, now);
        assert_eq!(insert.source, "web");
        assert!(insert.purpose.is_none());
    }

    #[test]
    fn history_summarizes_newest_first() {
        let guest_id = Uuid::new_v4();
        let newer = Utc::now();
        let older = newer - chrono::Duration::days(3);
        let visit = |at| VisitRecord {
            id: Uuid::new_v4(),
            guest_id,
            checkin_at: at,
            checkout_at: None,
            purpose: None,
            notes: None,
            agreed_rules_at: None,
            source: None,
            created_at: at,
        };
        let history = VisitHistory::from_sorted(vec![visit(newer), visit(older)]);
        assert_eq!(history.total_visits, 2);
        assert_eq!(history.last_visit, Some(newer));

        let empty = VisitHistory::from_sorted(vec![]);
        assert_eq!(empty.total_visits, 0);
        assert!(empty.last_visit.is_none());
    }
}
