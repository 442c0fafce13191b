//! Generation client: the single chokepoint for every model call.
//!
//! The HTTP transport sits behind `GenerationBackend` so tests (and any
//! future backend) can swap it out. `GenerationClient` owns tier resolution
//! against the quota tracker, defensive response parsing, usage accounting
//! and quota recording.

use std::sync::Arc;
use std::time::Duration;

use crate::config::GenAiSettings;
use crate::quota::{QuotaTracker, Tier};

use super::tokens::SessionTokenUsage;
use super::types::{GenerateRequest, GenerateResponse, UsageMetadata};
use super::GenAiError;

/// Raw transport to the generation API.
pub trait GenerationBackend: Send + Sync {
    fn generate(&self, model: &str, request: &GenerateRequest)
        -> Result<GenerateResponse, GenAiError>;
}

// ──────────────────────────────────────────────
// HTTP backend
// ──────────────────────────────────────────────

/// Production backend over `reqwest::blocking`.
pub struct HttpGenerationBackend {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl HttpGenerationBackend {
    pub fn new(settings: &GenAiSettings) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        }
    }
}

impl GenerationBackend for HttpGenerationBackend {
    fn generate(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, GenAiError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let response = self.http.post(&url).json(request).send().map_err(|e| {
            if e.is_connect() {
                GenAiError::Http(format!("cannot reach generation API at {}", self.base_url))
            } else if e.is_timeout() {
                GenAiError::Http("generation request timed out".into())
            } else {
                GenAiError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenAiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .map_err(|e| GenAiError::MalformedResponse(e.to_string()))
    }
}

// ──────────────────────────────────────────────
// Client
// ──────────────────────────────────────────────

/// One resolved, completed generation call.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub tier: Tier,
    pub usage: Option<UsageMetadata>,
}

pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    settings: GenAiSettings,
    quota: Arc<QuotaTracker>,
    session_tokens: SessionTokenUsage,
}

impl GenerationClient {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        settings: GenAiSettings,
        quota: Arc<QuotaTracker>,
    ) -> Self {
        Self {
            backend,
            settings,
            quota,
            session_tokens: SessionTokenUsage::new(),
        }
    }

    pub fn session_tokens(&self) -> &SessionTokenUsage {
        &self.session_tokens
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// Text generation. Resolves a tier (preferred first, fallback second),
    /// fails with `QuotaExhausted` when nothing resolves.
    pub fn generate_text(
        &self,
        prompt: &str,
        temperature: f32,
        max_output_tokens: u32,
        prefer_capable: bool,
    ) -> Result<Generation, GenAiError> {
        let tier = self
            .quota
            .resolve(prefer_capable)
            .ok_or(GenAiError::QuotaExhausted)?;
        let request = GenerateRequest::text(prompt, temperature, max_output_tokens);
        self.call(tier, &request)
    }

    /// Vision generation with an inline image. Pinned to the capable tier.
    pub fn generate_vision(
        &self,
        prompt: &str,
        image_bytes: &[u8],
        mime_type: &str,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Result<Generation, GenAiError> {
        let tier = self
            .quota
            .resolve_vision()
            .ok_or(GenAiError::QuotaExhausted)?;
        let request = GenerateRequest::with_image(
            prompt,
            image_bytes,
            mime_type,
            temperature,
            max_output_tokens,
        );
        self.call(tier, &request)
    }

    fn call(&self, tier: Tier, request: &GenerateRequest) -> Result<Generation, GenAiError> {
        let model = self.settings.model_for(tier);
        let _span = tracing::info_span!("generate", model, tier = tier.as_str()).entered();

        let response = self.backend.generate(model, request)?;

        // A 2xx body without the expected candidate shape is a service
        // failure, never an empty success.
        let text = response
            .first_text()
            .ok_or_else(|| {
                GenAiError::MalformedResponse("response has no candidate text part".into())
            })?
            .to_string();

        if let Some(usage) = &response.usage_metadata {
            self.session_tokens.accumulate(usage);
        }
        self.quota.record(tier);

        tracing::debug!(
            tier = tier.as_str(),
            response_len = text.len(),
            tokens = response.usage_metadata.map(|u| u.total_token_count),
            "generation complete"
        );

        Ok(Generation {
            text,
            model: model.to_string(),
            tier,
            usage: response.usage_metadata,
        })
    }
}

// ──────────────────────────────────────────────
// Mock backend (testing)
// ──────────────────────────────────────────────

/// Scriptable backend: queued responses are returned in call order, and
/// every call is recorded with its model and prompt text.
#[derive(Default)]
pub struct MockGenerationBackend {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<GenerateResponse, GenAiError>>>,
    calls: std::sync::Mutex<Vec<RecordedCall>>,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub prompt: String,
}

impl MockGenerationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(GenerateResponse::with_text(text)));
    }

    pub fn push_response(&self, response: GenerateResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_error(&self, error: GenAiError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl GenerationBackend for MockGenerationBackend {
    fn generate(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, GenAiError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            prompt: request.prompt_text().unwrap_or_default().to_string(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenAiError::Http("mock backend: no queued response".into())))
    }
}
