//! Translation of the simplified text into the user's target language.
//! Essential: a failure aborts the run as a retryable partial result.

use std::sync::Arc;
use std::time::Instant;

use crate::context::PipelineContext;
use crate::genai::GenerationClient;

use super::prompts;
use super::types::StageTrace;
use super::StageError;

const TEMPERATURE: f32 = 0.2;
const MAX_OUTPUT_TOKENS: u32 = 2048;

pub struct Translator {
    client: Arc<GenerationClient>,
}

impl Translator {
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
            StageTrace::new(prompts::TRANSLATE_PROMPT_ID, TEMPERATURE, MAX_OUTPUT_TOKENS);

        let prompt = prompts::translate_prompt(text, &ctx.target_language);
        let result = self
            .client
            .generate_text(&prompt, TEMPERATURE, MAX_OUTPUT_TOKENS, false)
            .map_err(StageError::from)
            .and_then(|generation| {
                trace.absorb(&generation);
                let translated = generation.text.trim().to_string();
                if translated.is_empty() {
                    Err(StageError::EmptyOutput("translator returned blank text"))
                } else {
                    Ok(translated)
                }
            });

        trace.duration = started.elapsed();
        (result, trace)
    }
}
