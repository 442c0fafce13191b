//! Alimjang: Korean school-notice analysis pipeline.
//!
//! Takes a scanned notice (image or PDF), extracts its text (native PDF
//! reader with vision-OCR fallback), then runs a resumable stage sequence
//! against an external generation API under a daily call budget:
//! classification, schedule extraction, difficult-expression explanations,
//! plain-Korean rewrite, translation and summary. Partial failures stay
//! retryable through the analysis cache for 30 minutes.
//!
//! Entry point: [`orchestrator::build_pipeline`] for production wiring, or
//! assemble [`orchestrator::AnalysisPipeline`] with your own backends.

pub mod cache;
pub mod config;
pub mod context;
pub mod extraction;
pub mod genai;
pub mod input;
pub mod orchestrator;
pub mod quota;
pub mod recovery;
pub mod stages;

use tracing_subscriber::EnvFilter;

/// Initialize tracing with `RUST_LOG` or the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
