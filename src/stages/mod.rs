pub mod classifier;
pub mod expressions;
pub mod extractor;
pub mod prompts;
pub mod simplifier;
pub mod summarizer;
pub mod translator;
pub mod types;

pub use classifier::*;
pub use expressions::*;
pub use extractor::*;
pub use simplifier::*;
pub use summarizer::*;
pub use translator::*;
pub use types::*;

use std::borrow::Cow;

use thiserror::Error;

use crate::config;
use crate::genai::GenAiError;

/// Failure of an essential stage. The structured-understanding stages never
/// return this; they degrade to defaults instead.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("generation service unavailable: {0}")]
    Service(#[from] GenAiError),

    #[error("stage produced no usable output: {0}")]
    EmptyOutput(&'static str),
}

/// Clip very long documents before prompting so one pathological upload
/// cannot blow the token budget.
pub(crate) fn clip_for_prompt(text: &str) -> Cow<'_, str> {
    if text.chars().count() <= config::MAX_PROMPT_CHARS {
        Cow::Borrowed(text)
    } else {
        tracing::warn!(
            chars = text.chars().count(),
            max = config::MAX_PROMPT_CHARS,
            "document clipped before prompting"
        );
        Cow::Owned(text.chars().take(config::MAX_PROMPT_CHARS).collect())
    }
}
