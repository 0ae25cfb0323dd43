use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_ANALYSIS_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY (or API_KEY) must be set")]
    MissingApiKey,
    #[error("{name} is not a valid number: {value}")]
    InvalidNumber { name: &'static str, value: String },
}

#[derive(Clone)]
pub struct Settings {
    pub api_key: String,
    pub api_base: String,
    pub analysis_model: String,
    pub image_model: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    /// Idle sessions older than this are dropped from the store.
    pub session_ttl_secs: u64,
}

// Hand-written so the credential never reaches a log line.
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"***")
            .field("api_base", &self.api_base)
            .field("analysis_model", &self.analysis_model)
            .field("image_model", &self.image_model)
            .field("port", &self.port)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = get("GEMINI_API_KEY")
            .or_else(|| get("API_KEY"))
            .ok_or(ConfigError::MissingApiKey)?;

        Ok(Self {
            api_key,
            api_base: get("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            analysis_model: get("GEMINI_ANALYSIS_MODEL").unwrap_or_else(|| DEFAULT_ANALYSIS_MODEL.to_string()),
            image_model: get("GEMINI_IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            port: parse_number("PORT", get("PORT"), DEFAULT_PORT)?,
            max_upload_bytes: parse_number("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"), DEFAULT_MAX_UPLOAD_BYTES)?,
            session_ttl_secs: parse_number("SESSION_TTL_SECS", get("SESSION_TTL_SECS"), DEFAULT_SESSION_TTL_SECS)?,
        })
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}
