//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::error::ConfigError;
use crate::worker::DEFAULT_WORKERS;

/// Default Hugging Face inference endpoint for zero-shot classification.
pub const DEFAULT_CLASSIFIER_URL: &str =
    "https://api-inference.huggingface.co/models/facebook/bart-large-mnli";

/// Default Gemini REST base (model name and method are appended).
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Default Gemini model used for reply drafting.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Service configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Port the HTTP server binds on 0.0.0.0.
    pub port: u16,
    /// Hugging Face API key.
    pub classifier_api_key: SecretString,
    /// Full URL of the zero-shot classification model.
    pub classifier_url: String,
    /// Timeout for a single classification call.
    pub classify_timeout: Duration,
    /// Google Generative Language API key.
    pub generator_api_key: SecretString,
    pub generator_base_url: String,
    pub generator_model: String,
    /// Optional timeout for reply generation. `None` waits indefinitely.
    pub generate_timeout: Option<Duration>,
    /// Number of remote calls allowed in flight at once.
    pub workers: usize,
    /// Entries per cache (classification and reply caches each).
    pub cache_capacity: usize,
}

impl ServiceConfig {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<SecretString, ConfigError> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let classifier_api_key = required("HF_API_KEY")?;
        let generator_api_key = required("GOOGLE_API")?;

        let generate_timeout_secs: Option<u64> =
            parse_optional(&lookup, "EMAIL_TRIAGE_GENERATE_TIMEOUT_SECS")?;
        let generate_timeout = generate_timeout_secs.map(Duration::from_secs);

        let workers: usize = parse_optional(&lookup, "EMAIL_TRIAGE_WORKERS")?.unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "EMAIL_TRIAGE_WORKERS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let cache_capacity: usize =
            parse_optional(&lookup, "EMAIL_TRIAGE_CACHE_CAPACITY")?.unwrap_or(DEFAULT_CACHE_CAPACITY);
        if cache_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "EMAIL_TRIAGE_CACHE_CAPACITY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            port: parse_optional(&lookup, "EMAIL_TRIAGE_PORT")?.unwrap_or(5000),
            classifier_api_key,
            classifier_url: lookup("EMAIL_TRIAGE_CLASSIFIER_URL")
                .unwrap_or_else(|| DEFAULT_CLASSIFIER_URL.to_string()),
            classify_timeout: Duration::from_secs(
                parse_optional(&lookup, "EMAIL_TRIAGE_CLASSIFY_TIMEOUT_SECS")?.unwrap_or(30),
            ),
            generator_api_key,
            generator_base_url: lookup("EMAIL_TRIAGE_GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            generator_model: lookup("EMAIL_TRIAGE_GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            generate_timeout,
            workers,
            cache_capacity,
        })
    }
}

fn parse_optional<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}
