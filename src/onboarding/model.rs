//! Guest draft and the per-step form payloads that fill it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::images::CapturedImage;
use crate::store::{GuestRecord, NewGuest};

/// Trim a free-text field; empty becomes absent.
pub fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// The guest profile being assembled during one onboarding session.
///
/// Starts empty, is filled step by step, and is either turned into a
/// [`NewGuest`] or overwritten from a fetched [`GuestRecord`] when a
/// returning guest is selected.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GuestDraft {
    /// Set once the guest exists in the directory.
    pub id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    /// Written on create only; never sent back to a client.
    #[serde(skip_serializing)]
    pub email: Option<String>,
    pub github_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub instagram_url: Option<String>,
    pub x_handle: Option<String>,
    pub website_url: Option<String>,
    pub childhood_dream: Option<String>,
    pub where_from: Option<String>,
    pub why_here: Option<String>,
    pub working_on: Option<String>,
    pub how_to_help: Option<String>,
    pub agreed_to_rules: bool,
    /// Held until check-in completes; never serialized.
    #[serde(skip)]
    pub captured_image: Option<CapturedImage>,
    pub image_url: Option<String>,
}

/// Personal-info step form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonalInfo {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
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
}

impl PersonalInfo {
    /// Trimmed copy with empty optional fields dropped.
    pub fn normalized(self) -> Self {
        Self {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: normalize(self.email),
            github_url: normalize(self.github_url),
            linkedin_url: normalize(self.linkedin_url),
            instagram_url: normalize(self.instagram_url),
            x_handle: normalize(self.x_handle),
            website_url: normalize(self.website_url),
        }
    }
}

/// Profile-questions step form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileAnswers {
    #[serde(default)]
    pub childhood_dream: Option<String>,
    #[serde(default)]
    pub where_from: Option<String>,
    #[serde(default)]
    pub why_here: Option<String>,
    #[serde(default)]
    pub working_on: Option<String>,
    #[serde(default)]
    pub how_to_help: Option<String>,
}

impl ProfileAnswers {
    pub fn normalized(self) -> Self {
        Self {
            childhood_dream: normalize(self.childhood_dream),
            where_from: normalize(self.where_from),
            why_here: normalize(self.why_here),
            working_on: normalize(self.working_on),
            how_to_help: normalize(self.how_to_help),
        }
    }
}

impl GuestDraft {
    /// Draft pre-filled with a name, used by the not-found fallback.
    pub fn with_name(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            ..Default::default()
        }
    }

    /// Overwrite the draft with a fetched returning guest.
    pub fn from_record(record: &GuestRecord) -> Self {
        Self {
            id: Some(record.id),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            email: None,
            github_url: record.github_url.clone(),
            linkedin_url: record.linkedin_url.clone(),
            instagram_url: record.instagram_url.clone(),
            x_handle: record.x_handle.clone(),
            website_url: record.website_url.clone(),
            childhood_dream: record.childhood_dream.clone(),
            where_from: record.where_from.clone(),
            why_here: record.why_here.clone(),
            working_on: record.working_on.clone(),
            how_to_help: record.how_to_help.clone(),
            agreed_to_rules: record.agreed_to_rules,
            captured_image: None,
            image_url: record.image_url.clone(),
        }
    }

    pub fn apply_personal_info(&mut self, info: PersonalInfo) {
        let info = info.normalized();
        self.first_name = info.first_name;
        self.last_name = info.last_name;
        self.email = info.email;
        self.github_url = info.github_url;
        self.linkedin_url = info.linkedin_url;
        self.instagram_url = info.instagram_url;
        self.x_handle = info.x_handle;
        self.website_url = info.website_url;
    }

    pub fn apply_answers(&mut self, answers: ProfileAnswers) {
        let answers = answers.normalized();
        self.childhood_dream = answers.childhood_dream;
        self.where_from = answers.where_from;
        self.why_here = answers.why_here;
        self.working_on = answers.working_on;
        self.how_to_help = answers.how_to_help;
    }

    /// Create payload for the directory. The image URL is written back
    /// after upload, so it is never part of the create.
    pub fn to_new_guest(&self) -> NewGuest {
        NewGuest {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.clone(),
            github_url: self.github_url.clone(),
            linkedin_url: self.linkedin_url.clone(),
            instagram_url: self.instagram_url.clone(),
            x_handle: self.x_handle.clone(),
            website_url: self.website_url.clone(),
            image_url: None,
            childhood_dream: self.childhood_dream.clone(),
            where_from: self.where_from.clone(),
            why_here: self.why_here.clone(),
            working_on: self.working_on.clone(),
            how_to_help: self.how_to_help.clone(),
            agreed_to_rules: self.agreed_to_rules,
        }
    }

    pub fn has_captured_image(&self) -> bool {
        self.captured_image.is_some()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn empty_fields_become_absent() {
        assert_eq!(normalize(Some("   ".into())), None);
        assert_eq!(normalize(Some(" hi ".into())), Some("hi".into()));
        assert_eq!(normalize(None), None);
    }

    #[test]
    fn personal_info_is_trimmed_into_draft() {
        let mut draft = GuestDraft::default();
        draft.apply_personal_info(PersonalInfo {
            first_name: "  Alex ".into(),
            last_name: "Chen".into(),
            email: Some("".into()),
            x_handle: Some("@alex".into()),
            ..Default::default()
        });
        assert_eq!(draft.first_name, "Alex");
        assert!(draft.email.is_none());
        assert_eq!(draft.x_handle.as_deref(), Some("@alex"));
    }

    #[test]
    fn new_guest_carries_consent_and_answers() {
        let mut draft = GuestDraft::with_name("Maya", "Lopez");
        draft.agreed_to_rules = true;
        draft.apply_answers(ProfileAnswers {
            why_here: Some("Build things".into()),
            working_on: Some("A synth".into()),
            how_to_help: Some("  ".into()),
            ..Default::default()
        });
        draft.image_url = Some("/stale.jpg".into());
        let guest = draft.to_new_guest();
        assert!(guest.agreed_to_rules);
        assert_eq!(guest.why_here.as_deref(), Some("Build things"));
        assert!(guest.how_to_help.is_none());
        assert!(guest.image_url.is_none());
    }

    #[test]
    fn draft_from_record_keeps_identity() {
        let now = Utc::now();
        let record = GuestRecord {
            id: Uuid::new_v4(),
            first_name: "Sam".into(),
            last_name: "Alvarez".into(),
            github_url: Some("https://github.com/sam".into()),
            linkedin_url: None,
            instagram_url: None,
            x_handle: None,
            website_url: None,
            image_url: Some("/api/profile-image/sam.jpg".into()),
            childhood_dream: None,
            where_from: Some("Lisbon".into()),
            why_here: None,
            working_on: None,
            how_to_help: None,
            agreed_to_rules: true,
            created_at: now,
            updated_at: now,
        };
        let draft = GuestDraft::from_record(&record);
        assert_eq!(draft.id, Some(record.id));
        assert_eq!(draft.image_url, record.image_url);
        assert!(draft.email.is_none());
    }

    #[test]
    fn captured_image_is_not_serialized() {
        let mut draft = GuestDraft::with_name("A", "B");
        draft.captured_image = Some(CapturedImage::new(vec![1, 2, 3], "image/png"));
        let json = serde_json::to_value(&draft).unwrap();
        assert!(json.get("captured_image").is_none());
        assert!(draft.has_captured_image());
    }
}
