//! Field checks for the personal-info and profile-questions steps.

use std::sync::LazyLock;

use regex::Regex;

use super::model::{PersonalInfo, ProfileAnswers};
use crate::error::ValidationErrors;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

/// Loose `local@domain.tld` shape check.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Absolute `http` or `https` URL with a host.
pub fn is_absolute_http_url(value: &str) -> bool {
    match reqwest::Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}

/// Check a normalized personal-info form.
///
/// Names are required. Email, GitHub, LinkedIn and website are checked only
/// when present; Instagram and X handle are free-form.
pub fn validate_personal_info(info: &PersonalInfo) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if info.first_name.trim().is_empty() {
        errors.push("first_name", "First name is required");
    }
    if info.last_name.trim().is_empty() {
        errors.push("last_name", "Last name is required");
    }
    if info.email.as_deref().is_some_and(|e| !is_valid_email(e)) {
        errors.push("email", "Please enter a valid email address");
    }

    let urls = [
        ("github_url", &info.github_url, "GitHub"),
        ("linkedin_url", &info.linkedin_url, "LinkedIn"),
        ("website_url", &info.website_url, "Website"),
    ];
    for (field, value, label) in urls {
        if value.as_deref().is_some_and(|u| !is_absolute_http_url(u)) {
            errors.push(field, &format!("{label} must be a full http(s) URL"));
        }
    }

    errors.into_result()
}

/// Check a normalized profile-questions form.
pub fn validate_profile_answers(answers: &ProfileAnswers) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if answers.why_here.is_none() {
        errors.push("why_here", "Please tell us why you're here");
    }
    if answers.working_on.is_none() {
        errors.push("working_on", "Please tell us what you're working on");
    }
    errors.into_result()
}
