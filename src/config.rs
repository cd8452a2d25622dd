//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Connection settings for the hosted database (PostgREST + storage).
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://abc.supabase.co`.
    pub base_url: String,
    /// Service-role key. Grants privileged access; never sent to guests.
    pub service_key: SecretString,
    /// Storage bucket for profile images.
    pub image_bucket: String,
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Hosted database settings. `None` runs against in-memory backends.
    pub backend: Option<BackendConfig>,
    /// HTTP listen port.
    pub port: u16,
    /// Timeout applied to every outbound HTTP request.
    pub request_timeout: Duration,
    /// Upper bound on the profile image upload inside a check-in.
    pub image_upload_timeout: Duration,
    /// Edge length of the square profile image after resizing.
    pub profile_image_size: u32,
    /// Remote image pipeline endpoint, used instead of direct storage uploads.
    pub image_pipeline_url: Option<String>,
    /// Whether starting an onboarding session needs a valid welcome code.
    pub require_welcome_code: bool,
    /// Sessions idle for longer than this are dropped.
    pub session_idle_timeout: Duration,
    /// Directory for daily rolling log files.
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: None,
            port: 8080,
            request_timeout: Duration::from_secs(10),
            image_upload_timeout: Duration::from_secs(15),
            profile_image_size: 400,
            image_pipeline_url: None,
            require_welcome_code: false,
            session_idle_timeout: Duration::from_secs(3600), // 1 hour
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend = match var("SUPABASE_URL") {
            Some(base_url) => {
                let service_key = var("SUPABASE_SERVICE_KEY")
                    .ok_or_else(|| ConfigError::MissingEnvVar("SUPABASE_SERVICE_KEY".into()))?;
                Some(BackendConfig {
                    base_url: base_url.trim_end_matches('/').to_string(),
                    service_key: SecretString::from(service_key),
                    image_bucket: var("PROFILE_IMAGE_BUCKET")
                        .unwrap_or_else(|| "billabong".to_string()),
                })
            }
            None => None,
        };

        let port = parse_or(var("PORT"), "PORT", defaults.port)?;
        let request_timeout = Duration::from_secs(parse_or(
            var("REQUEST_TIMEOUT_SECS"),
            "REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        )?);
        let image_upload_timeout = Duration::from_secs(parse_or(
            var("IMAGE_UPLOAD_TIMEOUT_SECS"),
            "IMAGE_UPLOAD_TIMEOUT_SECS",
            defaults.image_upload_timeout.as_secs(),
        )?);
        let profile_image_size = parse_or(
            var("PROFILE_IMAGE_SIZE"),
            "PROFILE_IMAGE_SIZE",
            defaults.profile_image_size,
        )?;
        if profile_image_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PROFILE_IMAGE_SIZE".into(),
                message: "must be greater than zero".into(),
            });
        }
        let require_welcome_code = parse_or(
            var("REQUIRE_WELCOME_CODE"),
            "REQUIRE_WELCOME_CODE",
            defaults.require_welcome_code,
        )?;
        let session_idle_timeout = Duration::from_secs(parse_or(
            var("SESSION_IDLE_TIMEOUT_SECS"),
            "SESSION_IDLE_TIMEOUT_SECS",
            defaults.session_idle_timeout.as_secs(),
        )?);

        Ok(Self {
            backend,
            port,
            request_timeout,
            image_upload_timeout,
            profile_image_size,
            image_pipeline_url: var("IMAGE_PIPELINE_URL"),
            require_welcome_code,
            session_idle_timeout,
            log_dir: var("LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
