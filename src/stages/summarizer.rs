//! Short summary of the simplified notice in the target language.
//! Essential: a failure aborts the run as a retryable partial result.

use std::sync::Arc;
use std::time::Instant;

use crate::context::PipelineContext;
use crate::genai::GenerationClient;

use super::prompts;
use super::types::StageTrace;
use super::StageError;

const TEMPERATURE: f32 = 0.3;
const MAX_OUTPUT_TOKENS: u32 = 512;

pub struct Summarizer {
    client: Arc<GenerationClient>,
}

impl Summarizer {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }

    /// `text` is the simplified Korean, not the raw extraction.
    pub fn process(
        &self,
        text: &str,
        ctx: &PipelineContext,
    ) -> (Result<String, StageError>, StageTrace) {
        let started = Instant::now();
        let mut trace =
            StageTrace::new(prompts::SUMMARIZE_PROMPT_ID, TEMPERATURE, MAX_OUTPUT_TOKENS);

        let prompt = prompts::summarize_prompt(text, &ctx.target_language);
        let result = self
            .client
            .generate_text(&prompt, TEMPERATURE, MAX_OUTPUT_TOKENS, false)
            .map_err(StageError::from)
            .and_then(|generation| {
                trace.absorb(&generation);
                let summary = generation.text.trim().to_string();
                if summary.is_empty() {
                    Err(StageError::EmptyOutput("summarizer returned blank text"))
                } else {
                    Ok(summary)
                }
            });

        trace.duration = started.elapsed();
        (result, trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenAiSettings;
    use crate::genai::{GenAiError, MockGenerationBackend};
    use crate::quota::{QuotaCaps, QuotaTracker};
    use crate::stages::types::TargetLanguage;

    fn summarizer_with(backend: Arc<MockGenerationBackend>) -> Summarizer {
        Summarizer::new(Arc::new(GenerationClient::new(
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
    fn summarizes_in_target_language() {
        let backend = Arc::new(MockGenerationBackend::new());
        backend.push_text(
            "Summer vacation starts July 23 and ends August 17. School resumes August 18.",
        );
        let summarizer = summarizer_with(Arc::clone(&backend));

        let (result, trace) = summarizer.process("여름방학 안내", &ctx());
        assert!(result.unwrap().contains("July 23"));
        assert!(backend.calls()[0].prompt.contains("3~5문장"));
        assert_eq!(trace.prompt_id, prompts::SUMMARIZE_PROMPT_ID);
    }

    #[test]
    fn service_failure_propagates() {
        let backend = Arc::new(MockGenerationBackend::new());
        backend.push_error(GenAiError::Http("reset by peer".into()));
        let summarizer = summarizer_with(backend);

        let (result, _) = summarizer.process("본문", &ctx());
        assert!(matches!(result, Err(StageError::Service(_))));
    }

    #[test]
    fn blank_summary_is_an_error() {
        let backend = Arc::new(MockGenerationBackend::new());
        backend.push_text("  ");
        let summarizer = summarizer_with(backend);

        let (result, _) = summarizer.process("본문", &ctx());
        assert!(matches!(result, Err(StageError::EmptyOutput(_))));
    }
}
