//! OCR engines.
//!
//! The production engine sends the page image to the vision model with a
//! Korean document-reading prompt. `OcrRouter` is the selection facade: an
//! ordered engine list, first `supports()` match wins, so a local engine can
//! be slotted in ahead of (or behind) the vision model without touching the
//! extractor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config;
use crate::genai::GenerationClient;

use super::types::OcrEngine;
use super::ExtractionError;

const VISION_OCR_PROMPT: &str = "\
이미지는 학교에서 가정으로 보낸 안내문입니다. 이미지에 보이는 모든 글자를 읽어 \
원문 그대로, 위에서 아래 순서로 출력하세요. 표는 줄 단위로 풀어 쓰세요. \
마크다운 서식, 코드 블록, 설명 문장은 넣지 말고 읽은 텍스트만 출력하세요.";

const OCR_TEMPERATURE: f32 = 0.1;
const OCR_MAX_OUTPUT_TOKENS: u32 = 4096;

/// OCR backed by the capable-tier vision model.
pub struct VisionModelOcr {
    client: Arc<GenerationClient>,
}

impl VisionModelOcr {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }
}

impl OcrEngine for VisionModelOcr {
    fn supports(&self, mime_type: &str) -> bool {
        config::SUPPORTED_IMAGE_MIMES.contains(&mime_type)
    }

    fn extract_text(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
    ) -> Result<String, ExtractionError> {
        let _span = tracing::info_span!("vision_ocr", mime_type, image_size = image_bytes.len())
            .entered();

        let generation = self
            .client
            .generate_vision(
                VISION_OCR_PROMPT,
                image_bytes,
                mime_type,
                OCR_TEMPERATURE,
                OCR_MAX_OUTPUT_TOKENS,
            )
            .map_err(|e| ExtractionError::OcrProcessing(e.to_string()))?;

        tracing::debug!(
            model = %generation.model,
            text_len = generation.text.len(),
            "vision OCR complete"
        );

        Ok(generation.text)
    }
}

/// Ordered OCR engine list; the first engine supporting the MIME type wins.
pub struct OcrRouter {
    engines: Vec<Box<dyn OcrEngine>>,
}

impl OcrRouter {
    pub fn new(engines: Vec<Box<dyn OcrEngine>>) -> Self {
        Self { engines }
    }

    pub fn single(engine: Box<dyn OcrEngine>) -> Self {
        Self::new(vec![engine])
    }
}

impl OcrEngine for OcrRouter {
    fn supports(&self, mime_type: &str) -> bool {
        self.engines.iter().any(|e| e.supports(mime_type))
    }

    fn extract_text(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
    ) -> Result<String, ExtractionError> {
        for engine in &self.engines {
            if engine.supports(mime_type) {
                return engine.extract_text(image_bytes, mime_type);
            }
        }
        Err(ExtractionError::UnsupportedFileType(mime_type.to_string()))
    }
}

/// Mock OCR engine for tests: fixed response, configurable MIME set, and a
/// shared call counter for asserting whether OCR ran at all.
pub struct MockOcrEngine {
    response: String,
    mimes: Option<Vec<String>>,
    calls: Arc<AtomicUsize>,
}

impl MockOcrEngine {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            mimes: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Restrict the engine to specific MIME types.
    pub fn with_mimes(mut self, mimes: &[&str]) -> Self {
        self.mimes = Some(mimes.iter().map(|m| m.to_string()).collect());
        self
    }

    /// Handle to the call counter, usable after the engine is boxed away.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl OcrEngine for MockOcrEngine {
    fn supports(&self, mime_type: &str) -> bool {
        match &self.mimes {
            Some(mimes) => mimes.iter().any(|m| m == mime_type),
            None => config::SUPPORTED_IMAGE_MIMES.contains(&mime_type),
        }
    }

    fn extract_text(
        &self,
        _image_bytes: &[u8],
        _mime_type: &str,
    ) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}
