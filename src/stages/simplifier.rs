//! Plain-Korean rewrite of the extracted notice text.
//!
//! This is the first essential stage: translation and summarization both
//! build on the simplified text, so a failure here aborts the run as a
//! retryable partial result.

use std::sync::Arc;
use std::time::Instant;

use crate::context::PipelineContext;
use crate::genai::GenerationClient;

use super::prompts;
use super::types::StageTrace;
use super::StageError;

const TEMPERATURE: f32 = 0.3;
const MAX_OUTPUT_TOKENS: u32 = 2048;

pub struct Simplifier {
    client: Arc<GenerationClient>,
}

impl Simplifier {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }

    pub fn process(
        &self,
        text: &str,
        ctx: &PipelineContext,
    ) -> (Result<String, StageError>, StageTrace) {
        let started = Instant::now();
        let mut trace = StageTrace::new(prompts::SIMPLIFY_PROMPT_ID, TEMPERATURE, MAX_OUTPUT_TOKENS);

        let prompt = prompts::simplify_prompt(text, ctx.simple_language_requested());
        let result = self
            .client
            .generate_text(&prompt, TEMPERATURE, MAX_OUTPUT_TOKENS, false)
            .map_err(StageError::from)
            .and_then(|generation| {
                trace.absorb(&generation);
                let simplified = generation.text.trim().to_string();
                if simplified.is_empty() {
                    Err(StageError::EmptyOutput("simplifier returned blank text"))
                } else {
                    Ok(simplified)
                }
            });

        trace.duration = started.elapsed();
        (result, trace)
    }
}
