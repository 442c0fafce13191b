pub mod client;
pub mod tokens;
pub mod types;

pub use client::*;
pub use tokens::*;
pub use types::*;

use thiserror::Error;

/// Failures from the generation layer. Every variant is retryable from the
/// caller's point of view: the pipeline surfaces them as a partial result
/// and the analysis can be resumed later.
#[derive(Error, Debug, Clone)]
pub enum GenAiError {
    #[error("daily generation quota exhausted for every eligible tier")]
    QuotaExhausted,

    #[error("generation request failed: {0}")]
    Http(String),

    #[error("generation API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed generation response: {0}")]
    MalformedResponse(String),
}
