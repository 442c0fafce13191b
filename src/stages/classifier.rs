//! Notice classification.
//!
//! Classification is useful but never essential: any failure (quota, API,
//! unparseable output) degrades to a neutral NOTICE result so the rest of
//! the pipeline keeps going.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;

use crate::context::PipelineContext;
use crate::genai::GenerationClient;
use crate::recovery;

use super::prompts;
use super::types::{ClassificationResult, DocumentType, StageOutcome, StageTrace};

const TEMPERATURE: f32 = 0.1;
const MAX_OUTPUT_TOKENS: u32 = 512;

pub struct Classifier {
    client: Arc<GenerationClient>,
}

impl Classifier {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }

    pub fn process(
        &self,
        text: &str,
        _ctx: &PipelineContext,
    ) -> (StageOutcome<ClassificationResult>, StageTrace) {
        let started = Instant::now();
        let mut trace = StageTrace::new(prompts::CLASSIFY_PROMPT_ID, TEMPERATURE, MAX_OUTPUT_TOKENS);

        let prompt = prompts::classification_prompt(text);
        let outcome = match self
            .client
            .generate_text(&prompt, TEMPERATURE, MAX_OUTPUT_TOKENS, false)
        {
            Ok(generation) => {
                trace.absorb(&generation);
                StageOutcome::Ok(parse_classification(&generation.text))
            }
            Err(e) => {
                tracing::warn!(error = %e, "classification degraded to NOTICE fallback");
                StageOutcome::Degraded(ClassificationResult::fallback("fallback"), e.to_string())
            }
        };

        trace.duration = started.elapsed();
        (outcome, trace)
    }
}

/// Parse the model's JSON. Schema gaps fall back field by field; an
/// unrecognized document type is a NOTICE.
fn parse_classification(raw: &str) -> ClassificationResult {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RawClassification {
        document_type: Option<String>,
        confidence: Option<f32>,
        #[serde(default)]
        keywords: Vec<String>,
        reasoning: Option<String>,
    }

    let json = recovery::extract_object(raw);
    match serde_json::from_str::<RawClassification>(&json) {
        Ok(parsed) => ClassificationResult {
            document_type: parsed
                .document_type
                .as_deref()
                .map(DocumentType::from_label)
                .unwrap_or(DocumentType::Notice),
            confidence: parsed.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            keywords: parsed.keywords,
            reasoning: parsed.reasoning.unwrap_or_default(),
        },
        Err(e) => {
            tracing::warn!(error = %e, preview = %recovery::preview(raw, 120), "unparseable classification output");
            ClassificationResult::fallback("unparseable model output")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenAiSettings;
    use crate::genai::{GenAiError, MockGenerationBackend};
    use crate::quota::{QuotaCaps, QuotaTracker};
    use crate::stages::types::TargetLanguage;

    fn classifier_with(backend: Arc<MockGenerationBackend>) -> Classifier {
        Classifier::new(Arc::new(GenerationClient::new(
            backend,
            GenAiSettings::new("test-key"),
            Arc::new(QuotaTracker::new(QuotaCaps::default())),
        )))
    }

    fn ctx() -> PipelineContext {
        PipelineContext::new(
            uuid::Uuid::new_v4(),
            TargetLanguage::english(),
            serde_json::Map::new(),
        )
    }

    #[test]
    fn parses_model_json_with_surrounding_noise() {
        let backend = Arc::new(MockGenerationBackend::new());
        backend.push_text(
            "분류 결과입니다:\n{\"documentType\": \"SCHEDULE\", \"confidence\": 0.93, \
             \"keywords\": [\"여름방학\"], \"reasoning\": \"방학 일정 안내\"} 감사합니다",
        );
        let classifier = classifier_with(backend);

        let (outcome, trace) = classifier.process("여름방학 안내문", &ctx());
        assert!(!outcome.is_degraded());
        let result = outcome.into_value();
        assert_eq!(result.document_type, DocumentType::Schedule);
        assert!((result.confidence - 0.93).abs() < 1e-6);
        assert_eq!(result.keywords, vec!["여름방학"]);
        assert!(trace.raw_response.is_some());
        assert_eq!(trace.prompt_id, prompts::CLASSIFY_PROMPT_ID);
    }

    #[test]
    fn service_failure_degrades_to_notice_fallback() {
        let backend = Arc::new(MockGenerationBackend::new());
        backend.push_error(GenAiError::Api {
            status: 503,
            body: "quota".into(),
        });
        let classifier = classifier_with(backend);

        let (outcome, _) = classifier.process("본문", &ctx());
        assert!(outcome.is_degraded());
        let result = outcome.into_value();
        assert_eq!(result.document_type, DocumentType::Notice);
        assert!((result.confidence - 0.5).abs() < f32::EPSILON);
        assert!(result.keywords.is_empty());
        assert_eq!(result.reasoning, "fallback");
    }

    #[test]
    fn unknown_document_type_becomes_notice() {
        let backend = Arc::new(MockGenerationBackend::new());
        backend.push_text("{\"documentType\": \"LUNCH_MENU\", \"confidence\": 0.8}");
        let classifier = classifier_with(backend);

        let (outcome, _) = classifier.process("본문", &ctx());
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.value().document_type, DocumentType::Notice);
    }

    #[test]
    fn confidence_clamped_into_unit_interval() {
        let backend = Arc::new(MockGenerationBackend::new());
        backend.push_text("{\"documentType\": \"EVENT\", \"confidence\": 3.2}");
        let classifier = classifier_with(backend);

        let (outcome, _) = classifier.process("본문", &ctx());
        assert!((outcome.value().confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn garbage_output_is_absorbed() {
        let backend = Arc::new(MockGenerationBackend::new());
        backend.push_text("죄송합니다, 분류할 수 없습니다.");
        let classifier = classifier_with(backend);

        let (outcome, _) = classifier.process("본문", &ctx());
        // Recovery yields "{}" which parses to an all-default classification.
        assert_eq!(outcome.value().document_type, DocumentType::Notice);
    }
}
