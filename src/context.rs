//! Pipeline context: the serializable accumulator of one analysis attempt.
//!
//! The context is the unit of caching and the unit of retry: it carries
//! every intermediate artifact plus a monotonic stage marker. A stage is
//! considered done only when the marker has passed it AND its result field
//! is populated; both checks guard against a stale marker with missing data.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extraction::TextProvenance;
use crate::stages::types::{
    ClassificationResult, DifficultExpression, DocumentType, ScheduleExtraction, TargetLanguage,
};

/// Stage markers, totally ordered. Once advanced, a context's marker never
/// regresses within a retry chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    None,
    TextExtracted,
    Classified,
    Extracted,
    DifficultExpressionsExtracted,
    Simplified,
    Translated,
    Summarized,
    Completed,
}

impl PipelineStage {
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::TextExtracted => "TEXT_EXTRACTED",
            Self::Classified => "CLASSIFIED",
            Self::Extracted => "EXTRACTED",
            Self::DifficultExpressionsExtracted => "DIFFICULT_EXPRESSIONS_EXTRACTED",
            Self::Simplified => "SIMPLIFIED",
            Self::Translated => "TRANSLATED",
            Self::Summarized => "SUMMARIZED",
            Self::Completed => "COMPLETED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineContext {
    pub analysis_id: Uuid,

    pub original_text: Option<String>,
    pub simplified_korean: Option<String>,
    pub translated_text: Option<String>,
    pub summary: Option<String>,
    pub difficult_expressions: Option<Vec<DifficultExpression>>,
    pub classification: Option<ClassificationResult>,
    pub extraction: Option<ScheduleExtraction>,

    pub document_type: Option<DocumentType>,
    pub target_language: TargetLanguage,
    pub ocr_method: Option<TextProvenance>,
    pub page_count: Option<usize>,

    pub completed_stage: PipelineStage,

    /// Free-form run parameters, e.g. whether plain-language mode is on.
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Append-only, timestamped progress log.
    pub processing_logs: Vec<String>,
}

impl PipelineContext {
    pub fn new(
        analysis_id: Uuid,
        target_language: TargetLanguage,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            analysis_id,
            original_text: None,
            simplified_korean: None,
            translated_text: None,
            summary: None,
            difficult_expressions: None,
            classification: None,
            extraction: None,
            document_type: None,
            target_language,
            ocr_method: None,
            page_count: None,
            completed_stage: PipelineStage::None,
            metadata,
            processing_logs: Vec::new(),
        }
    }

    /// Advance the stage marker; regressions are ignored.
    pub fn advance(&mut self, stage: PipelineStage) {
        if stage > self.completed_stage {
            self.completed_stage = stage;
        }
    }

    /// A stage is skippable when its marker ordinal has been reached AND the
    /// corresponding result exists.
    pub fn stage_done(&self, stage: PipelineStage, has_result: bool) -> bool {
        self.completed_stage >= stage && has_result
    }

    /// Set the raw extracted text. Set-once: later calls are ignored.
    pub fn set_original_text(&mut self, text: String) {
        if self.original_text.is_none() {
            self.original_text = Some(text);
        }
    }

    /// Append a timestamped entry to the processing log.
    pub fn log(&mut self, message: impl AsRef<str>) {
        self.processing_logs.push(format!(
            "{} {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            message.as_ref()
        ));
    }

    pub fn simple_language_requested(&self) -> bool {
        self.metadata
            .get("simpleLanguage")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}
