//! Application constants and generation-API settings.

use std::time::Duration;

use crate::quota::Tier;

pub const APP_NAME: &str = "Alimjang";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Daily call caps per generation tier.
pub const CAPABLE_DAILY_CAP: u64 = 200;
pub const ECONOMY_DAILY_CAP: u64 = 1000;

/// Quota counters expire on a rolling 24 h window instead of a midnight cron.
pub const QUOTA_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// A partial analysis stays retryable for 30 minutes.
pub const ANALYSIS_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
pub const ANALYSIS_CACHE_MAX_ENTRIES: u64 = 1024;

/// Uploads above 20 MB are rejected before the pipeline starts.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// A PDF text layer shorter than this is treated as scanned and sent to OCR.
pub const MIN_NATIVE_TEXT_LEN: usize = 50;

/// Rendering resolution for PDF pages routed to OCR.
pub const PDF_RENDER_DPI: u32 = 300;

/// Hard cap on difficult-expression entries, regardless of model output.
pub const MAX_DIFFICULT_EXPRESSIONS: usize = 10;

/// Documents longer than this (in characters) are clipped before prompting.
pub const MAX_PROMPT_CHARS: usize = 12_000;

/// Image MIME types the OCR path accepts.
pub const SUPPORTED_IMAGE_MIMES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/heic",
    "image/heif",
];

pub const PDF_MIME: &str = "application/pdf";

pub const DEFAULT_GENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CAPABLE_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_ECONOMY_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;
pub const GENAI_API_KEY_ENV: &str = "GENAI_API_KEY";

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info"
}

/// Connection settings for the external generation API.
#[derive(Debug, Clone)]
pub struct GenAiSettings {
    pub base_url: String,
    pub api_key: String,
    pub capable_model: String,
    pub economy_model: String,
    pub timeout_secs: u64,
}

impl GenAiSettings {
    /// Settings with default endpoint, models and timeout.
    pub fn new(api_key: &str) -> Self {
        Self {
            base_url: DEFAULT_GENAI_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            capable_model: DEFAULT_CAPABLE_MODEL.to_string(),
            economy_model: DEFAULT_ECONOMY_MODEL.to_string(),
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }

    /// Read the API key from `GENAI_API_KEY`. None if unset.
    pub fn from_env() -> Option<Self> {
        std::env::var(GENAI_API_KEY_ENV).ok().map(|key| Self::new(&key))
    }

    /// Model name serving a resolved tier.
    pub fn model_for(&self, tier: Tier) -> &str {
        match tier {
            Tier::Capable => &self.capable_model,
            Tier::Economy => &self.economy_model,
        }
    }
}
