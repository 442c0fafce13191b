//! Difficult-expression extraction: at most ten hard expressions, each with
//! a plain explanation in the user's target language. Failures degrade to an
//! empty list.

use std::sync::Arc;
use std::time::Instant;

use crate::config;
use crate::context::PipelineContext;
use crate::genai::GenerationClient;
use crate::recovery;

use super::prompts;
use super::types::{DifficultExpression, StageOutcome, StageTrace};

const TEMPERATURE: f32 = 0.3;
const MAX_OUTPUT_TOKENS: u32 = 1536;

pub struct DifficultExpressionExtractor {
    client: Arc<GenerationClient>,
}

impl DifficultExpressionExtractor {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }

    pub fn process(
        &self,
        text: &str,
        ctx: &PipelineContext,
    ) -> (StageOutcome<Vec<DifficultExpression>>, StageTrace) {
        let started = Instant::now();
        let mut trace =
            StageTrace::new(prompts::EXPRESSIONS_PROMPT_ID, TEMPERATURE, MAX_OUTPUT_TOKENS);

        let prompt = prompts::expressions_prompt(text, &ctx.target_language);
        let outcome = match self
            .client
            .generate_text(&prompt, TEMPERATURE, MAX_OUTPUT_TOKENS, false)
        {
            Ok(generation) => {
                trace.absorb(&generation);
                StageOutcome::Ok(parse_expressions(&generation.text))
            }
            Err(e) => {
                tracing::warn!(error = %e, "difficult-expression extraction degraded to empty list");
                StageOutcome::Degraded(Vec::new(), e.to_string())
            }
        };

        trace.duration = started.elapsed();
        (outcome, trace)
    }
}

/// Parse the JSON array leniently and enforce the hard cap, whatever the
/// model decided ten meant.
fn parse_expressions(raw: &str) -> Vec<DifficultExpression> {
    let json = recovery::extract_array(raw);
    let items: Vec<serde_json::Value> = match serde_json::from_str(&json) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(error = %e, preview = %recovery::preview(raw, 120), "unparseable expressions output");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|v| serde_json::from_value::<DifficultExpression>(v).ok())
        .filter(|e| !e.original.trim().is_empty())
        .take(config::MAX_DIFFICULT_EXPRESSIONS)
        .collect()
}
