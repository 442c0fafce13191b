//! Pipeline orchestrator.
//!
//! Drives a context through the fixed stage sequence, skipping stages that
//! are already complete, persisting the context after every attempted stage
//! and converting any stage failure into a partial, retryable outcome. The
//! structured-understanding stages (classification, unified extraction,
//! difficult expressions) degrade to defaults and never abort the run;
//! text extraction and the language-production stages do.
//!
//! A run is synchronous on the calling thread. Different analyses may run
//! concurrently; retries of the *same* analysis id must be serialized by
//! the caller.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::cache::AnalysisCache;
use crate::config::GenAiSettings;
use crate::context::{PipelineContext, PipelineStage};
use crate::extraction::{DocumentTextExtractor, TextExtractor, TextProvenance};
use crate::genai::{GenerationClient, HttpGenerationBackend, TokenUsageSnapshot};
use crate::input::{self, InputError, UploadedFile};
use crate::quota::QuotaTracker;
use crate::recovery;
use crate::stages::types::{
    ClassificationResult, DifficultExpression, DocumentType, ScheduleExtraction, StageTrace,
    TargetLanguage,
};
use crate::stages::{
    Classifier, DifficultExpressionExtractor, Simplifier, Summarizer, Translator, UnifiedExtractor,
};

// Stage names as they appear in partial responses and audit rows.
pub const TEXT_EXTRACTION: &str = "TEXT_EXTRACTION";
pub const CLASSIFICATION: &str = "CLASSIFICATION";
pub const EXTRACTION: &str = "EXTRACTION";
pub const DIFFICULT_EXPRESSIONS: &str = "DIFFICULT_EXPRESSIONS";
pub const SIMPLIFICATION: &str = "SIMPLIFICATION";
pub const TRANSLATION: &str = "TRANSLATION";
pub const SUMMARIZATION: &str = "SUMMARIZATION";

const PREVIEW_CHARS: usize = 200;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("invalid upload: {0}")]
    Input(#[from] InputError),

    #[error("analysis {0} not found (expired or unknown)")]
    NotFound(Uuid),
}

/// Per-run parameters supplied by the caller.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub target_language: TargetLanguage,
    /// Free-form run parameters copied into the context metadata,
    /// e.g. `simpleLanguage: true`.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            target_language: TargetLanguage::english(),
            metadata: serde_json::Map::new(),
        }
    }
}

// ──────────────────────────────────────────────
// Outcome types
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    Completed,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Success,
    Failure,
    Skipped,
}

/// One audit row per attempted (or skipped) stage, in pipeline order.
/// This is the exact surface the persistence collaborator consumes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageAudit {
    pub stage: String,
    pub order: u8,
    pub input_preview: String,
    pub prompt_id: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub response_preview: Option<String>,
    /// The stage's typed result, serialized for the audit log.
    pub parsed_result: Option<serde_json::Value>,
    pub output_summary: String,
    pub duration_ms: u64,
    pub status: StageStatus,
}

impl StageAudit {
    fn skipped(stage: &str, order: u8) -> Self {
        Self {
            stage: stage.to_string(),
            order,
            input_preview: String::new(),
            prompt_id: None,
            model: None,
            temperature: None,
            max_output_tokens: None,
            response_preview: None,
            parsed_result: None,
            output_summary: "skipped (already complete)".into(),
            duration_ms: 0,
            status: StageStatus::Skipped,
        }
    }

    fn with_parsed(mut self, parsed: Option<serde_json::Value>) -> Self {
        self.parsed_result = parsed;
        self
    }

    /// Row for a stage without a model trace (text extraction).
    fn plain(
        stage: &str,
        order: u8,
        input: &str,
        output_summary: String,
        duration_ms: u64,
        status: StageStatus,
    ) -> Self {
        Self {
            stage: stage.to_string(),
            order,
            input_preview: recovery::preview(input, PREVIEW_CHARS),
            prompt_id: None,
            model: None,
            temperature: None,
            max_output_tokens: None,
            response_preview: None,
            parsed_result: None,
            output_summary,
            duration_ms,
            status,
        }
    }

    fn from_trace(
        stage: &str,
        order: u8,
        input: &str,
        trace: StageTrace,
        output_summary: String,
        status: StageStatus,
    ) -> Self {
        Self {
            stage: stage.to_string(),
            order,
            input_preview: recovery::preview(input, PREVIEW_CHARS),
            prompt_id: Some(trace.prompt_id.to_string()),
            model: trace.model,
            temperature: Some(trace.temperature),
            max_output_tokens: Some(trace.max_output_tokens),
            response_preview: trace
                .raw_response
                .as_deref()
                .map(|r| recovery::preview(r, PREVIEW_CHARS)),
            parsed_result: None,
            output_summary,
            duration_ms: trace.duration.as_millis() as u64,
            status,
        }
    }
}

/// Everything the pipeline has produced so far for one analysis.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisArtifacts {
    pub original_text: Option<String>,
    pub classification: Option<ClassificationResult>,
    pub extraction: Option<ScheduleExtraction>,
    pub difficult_expressions: Option<Vec<DifficultExpression>>,
    pub simplified_korean: Option<String>,
    pub translated_text: Option<String>,
    pub summary: Option<String>,
    pub document_type: Option<DocumentType>,
    pub target_language: TargetLanguage,
    pub ocr_method: Option<TextProvenance>,
    pub page_count: Option<usize>,
}

impl AnalysisArtifacts {
    fn from_context(ctx: &PipelineContext) -> Self {
        Self {
            original_text: ctx.original_text.clone(),
            classification: ctx.classification.clone(),
            extraction: ctx.extraction.clone(),
            difficult_expressions: ctx.difficult_expressions.clone(),
            simplified_korean: ctx.simplified_korean.clone(),
            translated_text: ctx.translated_text.clone(),
            summary: ctx.summary.clone(),
            document_type: ctx.document_type,
            target_language: ctx.target_language.clone(),
            ocr_method: ctx.ocr_method,
            page_count: ctx.page_count,
        }
    }
}

/// Response contract: COMPLETED with all artifacts, or PARTIAL with
/// whatever exists plus the failed stage and error, the id staying valid
/// for retry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub analysis_id: Uuid,
    pub status: AnalysisStatus,
    pub failed_stage: Option<String>,
    pub error_message: Option<String>,
    pub artifacts: AnalysisArtifacts,
    pub stage_audits: Vec<StageAudit>,
    pub elapsed_ms: u64,
    pub token_usage: TokenUsageSnapshot,
}

// ──────────────────────────────────────────────
// Pipeline
// ──────────────────────────────────────────────

pub struct AnalysisPipeline {
    extractor: Box<dyn TextExtractor>,
    client: Arc<GenerationClient>,
    cache: AnalysisCache,
    classifier: Classifier,
    unified: UnifiedExtractor,
    expressions: DifficultExpressionExtractor,
    simplifier: Simplifier,
    translator: Translator,
    summarizer: Summarizer,
}

impl AnalysisPipeline {
    pub fn new(
        extractor: Box<dyn TextExtractor>,
        client: Arc<GenerationClient>,
        cache: AnalysisCache,
    ) -> Self {
        Self {
            extractor,
            classifier: Classifier::new(Arc::clone(&client)),
            unified: UnifiedExtractor::new(Arc::clone(&client)),
            expressions: DifficultExpressionExtractor::new(Arc::clone(&client)),
            simplifier: Simplifier::new(Arc::clone(&client)),
            translator: Translator::new(Arc::clone(&client)),
            summarizer: Summarizer::new(Arc::clone(&client)),
            client,
            cache,
        }
    }

    /// Start a fresh analysis. Upload validation failures are fatal and
    /// pre-pipeline: no context is created and nothing is cached.
    pub fn analyze(
        &self,
        file: &UploadedFile,
        options: AnalyzeOptions,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        input::validate(file)?;

        let analysis_id = Uuid::new_v4();
        let mut ctx =
            PipelineContext::new(analysis_id, options.target_language, options.metadata);
        ctx.log(format!("analysis started for {}", file.filename));

        Ok(self.run(&mut ctx, file))
    }

    /// Resume a partial analysis. The cached context decides which stages
    /// still need to run. Callers must serialize retries per analysis id.
    pub fn retry(
        &self,
        analysis_id: Uuid,
        file: &UploadedFile,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        input::validate(file)?;

        let mut ctx = self
            .cache
            .get(&analysis_id)
            .ok_or(AnalysisError::NotFound(analysis_id))?;
        ctx.log(format!("retry from {}", ctx.completed_stage.as_str()));

        Ok(self.run(&mut ctx, file))
    }

    fn run(&self, ctx: &mut PipelineContext, file: &UploadedFile) -> AnalysisOutcome {
        let run_started = Instant::now();
        self.client.session_tokens().reset();
        let mut audits: Vec<StageAudit> = Vec::new();

        tracing::info!(
            analysis_id = %ctx.analysis_id,
            resume_from = ctx.completed_stage.as_str(),
            "pipeline run started"
        );

        // ── 1. Text extraction ──────────────────
        if ctx.stage_done(PipelineStage::TextExtracted, ctx.original_text.is_some()) {
            audits.push(StageAudit::skipped(TEXT_EXTRACTION, 1));
        } else {
            let started = Instant::now();
            match self.extractor.extract(file) {
                Ok(extracted) => {
                    ctx.ocr_method = Some(extracted.provenance);
                    ctx.page_count = Some(extracted.page_count);
                    let summary = format!(
                        "{} pages via {}",
                        extracted.page_count,
                        extracted.provenance.as_str()
                    );
                    ctx.set_original_text(extracted.text);
                    ctx.advance(PipelineStage::TextExtracted);
                    ctx.log(format!("text extraction: {summary}"));
                    audits.push(StageAudit::plain(
                        TEXT_EXTRACTION,
                        1,
                        &file.filename,
                        summary,
                        started.elapsed().as_millis() as u64,
                        StageStatus::Success,
                    ));
                    self.cache.put(ctx);
                }
                Err(e) => {
                    ctx.log(format!("text extraction failed: {e}"));
                    audits.push(StageAudit::plain(
                        TEXT_EXTRACTION,
                        1,
                        &file.filename,
                        format!("failed: {e}"),
                        started.elapsed().as_millis() as u64,
                        StageStatus::Failure,
                    ));
                    self.cache.put(ctx);
                    return self.finish_partial(ctx, TEXT_EXTRACTION, e.to_string(), audits, run_started);
                }
            }
        }

        let original = ctx.original_text.clone().unwrap_or_default();

        // ── 2. Classification (degrades) ────────
        if ctx.stage_done(PipelineStage::Classified, ctx.classification.is_some()) {
            audits.push(StageAudit::skipped(CLASSIFICATION, 2));
        } else {
            let (outcome, trace) = self.classifier.process(&original, ctx);
            let summary = match outcome.degraded_reason() {
                Some(reason) => format!("degraded to fallback: {reason}"),
                None => format!(
                    "type={} confidence={:.2}",
                    outcome.value().document_type.as_str(),
                    outcome.value().confidence
                ),
            };
            let result = outcome.into_value();
            let parsed = serde_json::to_value(&result).ok();
            ctx.document_type = Some(result.document_type);
            ctx.classification = Some(result);
            ctx.advance(PipelineStage::Classified);
            ctx.log(format!("classification: {summary}"));
            audits.push(
                StageAudit::from_trace(
                    CLASSIFICATION,
                    2,
                    &original,
                    trace,
                    summary,
                    StageStatus::Success,
                )
                .with_parsed(parsed),
            );
            self.cache.put(ctx);
        }

        // ── 3. Unified extraction (degrades) ────
        if ctx.stage_done(PipelineStage::Extracted, ctx.extraction.is_some()) {
            audits.push(StageAudit::skipped(EXTRACTION, 3));
        } else {
            let (outcome, trace) = self.unified.process(&original, ctx);
            let summary = match outcome.degraded_reason() {
                Some(reason) => format!("degraded to empty extraction: {reason}"),
                None => format!(
                    "{} schedules, {} info keys",
                    outcome.value().schedules.len(),
                    outcome.value().additional_info.len()
                ),
            };
            let result = outcome.into_value();
            let parsed = serde_json::to_value(&result).ok();
            ctx.extraction = Some(result);
            ctx.advance(PipelineStage::Extracted);
            ctx.log(format!("unified extraction: {summary}"));
            audits.push(
                StageAudit::from_trace(
                    EXTRACTION,
                    3,
                    &original,
                    trace,
                    summary,
                    StageStatus::Success,
                )
                .with_parsed(parsed),
            );
            self.cache.put(ctx);
        }

        // ── 4. Difficult expressions (degrades) ─
        if ctx.stage_done(
            PipelineStage::DifficultExpressionsExtracted,
            ctx.difficult_expressions.is_some(),
        ) {
            audits.push(StageAudit::skipped(DIFFICULT_EXPRESSIONS, 4));
        } else {
            let (outcome, trace) = self.expressions.process(&original, ctx);
            let summary = match outcome.degraded_reason() {
                Some(reason) => format!("degraded to empty list: {reason}"),
                None => format!("{} expressions", outcome.value().len()),
            };
            let result = outcome.into_value();
            let parsed = serde_json::to_value(&result).ok();
            ctx.difficult_expressions = Some(result);
            ctx.advance(PipelineStage::DifficultExpressionsExtracted);
            ctx.log(format!("difficult expressions: {summary}"));
            audits.push(
                StageAudit::from_trace(
                    DIFFICULT_EXPRESSIONS,
                    4,
                    &original,
                    trace,
                    summary,
                    StageStatus::Success,
                )
                .with_parsed(parsed),
            );
            self.cache.put(ctx);
        }

        // ── 5. Simplification (essential) ───────
        if ctx.stage_done(PipelineStage::Simplified, ctx.simplified_korean.is_some()) {
            audits.push(StageAudit::skipped(SIMPLIFICATION, 5));
        } else {
            let (result, trace) = self.simplifier.process(&original, ctx);
            match result {
                Ok(simplified) => {
                    let summary = format!("{} chars", simplified.chars().count());
                    let parsed =
                        serde_json::Value::String(recovery::preview(&simplified, PREVIEW_CHARS));
                    ctx.simplified_korean = Some(simplified);
                    ctx.advance(PipelineStage::Simplified);
                    ctx.log(format!("simplification: {summary}"));
                    audits.push(
                        StageAudit::from_trace(
                            SIMPLIFICATION,
                            5,
                            &original,
                            trace,
                            summary,
                            StageStatus::Success,
                        )
                        .with_parsed(Some(parsed)),
                    );
                    self.cache.put(ctx);
                }
                Err(e) => {
                    ctx.log(format!("simplification failed: {e}"));
                    audits.push(StageAudit::from_trace(
                        SIMPLIFICATION,
                        5,
                        &original,
                        trace,
                        format!("failed: {e}"),
                        StageStatus::Failure,
                    ));
                    self.cache.put(ctx);
                    return self.finish_partial(ctx, SIMPLIFICATION, e.to_string(), audits, run_started);
                }
            }
        }

        let simplified = ctx.simplified_korean.clone().unwrap_or_default();

        // ── 6. Translation (essential) ──────────
        if ctx.stage_done(PipelineStage::Translated, ctx.translated_text.is_some()) {
            audits.push(StageAudit::skipped(TRANSLATION, 6));
        } else {
            let (result, trace) = self.translator.process(&simplified, ctx);
            match result {
                Ok(translated) => {
                    let summary =
                        format!("{} chars to {}", translated.chars().count(), ctx.target_language.code);
                    let parsed =
                        serde_json::Value::String(recovery::preview(&translated, PREVIEW_CHARS));
                    ctx.translated_text = Some(translated);
                    ctx.advance(PipelineStage::Translated);
                    ctx.log(format!("translation: {summary}"));
                    audits.push(
                        StageAudit::from_trace(
                            TRANSLATION,
                            6,
                            &simplified,
                            trace,
                            summary,
                            StageStatus::Success,
                        )
                        .with_parsed(Some(parsed)),
                    );
                    self.cache.put(ctx);
                }
                Err(e) => {
                    ctx.log(format!("translation failed: {e}"));
                    audits.push(StageAudit::from_trace(
                        TRANSLATION,
                        6,
                        &simplified,
                        trace,
                        format!("failed: {e}"),
                        StageStatus::Failure,
                    ));
                    self.cache.put(ctx);
                    return self.finish_partial(ctx, TRANSLATION, e.to_string(), audits, run_started);
                }
            }
        }

        // ── 7. Summarization (essential) ────────
        if ctx.stage_done(PipelineStage::Summarized, ctx.summary.is_some()) {
            audits.push(StageAudit::skipped(SUMMARIZATION, 7));
        } else {
            let (result, trace) = self.summarizer.process(&simplified, ctx);
            match result {
                Ok(summary_text) => {
                    let summary = format!("{} chars", summary_text.chars().count());
                    let parsed =
                        serde_json::Value::String(recovery::preview(&summary_text, PREVIEW_CHARS));
                    ctx.summary = Some(summary_text);
                    ctx.advance(PipelineStage::Summarized);
                    ctx.log(format!("summarization: {summary}"));
                    audits.push(
                        StageAudit::from_trace(
                            SUMMARIZATION,
                            7,
                            &simplified,
                            trace,
                            summary,
                            StageStatus::Success,
                        )
                        .with_parsed(Some(parsed)),
                    );
                    self.cache.put(ctx);
                }
                Err(e) => {
                    ctx.log(format!("summarization failed: {e}"));
                    audits.push(StageAudit::from_trace(
                        SUMMARIZATION,
                        7,
                        &simplified,
                        trace,
                        format!("failed: {e}"),
                        StageStatus::Failure,
                    ));
                    self.cache.put(ctx);
                    return self.finish_partial(ctx, SUMMARIZATION, e.to_string(), audits, run_started);
                }
            }
        }

        // ── Done ────────────────────────────────
        ctx.advance(PipelineStage::Completed);
        ctx.log("analysis completed");
        self.cache.evict(&ctx.analysis_id);

        tracing::info!(
            analysis_id = %ctx.analysis_id,
            elapsed_ms = run_started.elapsed().as_millis() as u64,
            "analysis completed"
        );

        AnalysisOutcome {
            analysis_id: ctx.analysis_id,
            status: AnalysisStatus::Completed,
            failed_stage: None,
            error_message: None,
            artifacts: AnalysisArtifacts::from_context(ctx),
            stage_audits: audits,
            elapsed_ms: run_started.elapsed().as_millis() as u64,
            token_usage: self.client.session_tokens().snapshot(),
        }
    }

    fn finish_partial(
        &self,
        ctx: &PipelineContext,
        failed_stage: &str,
        error_message: String,
        audits: Vec<StageAudit>,
        run_started: Instant,
    ) -> AnalysisOutcome {
        tracing::warn!(
            analysis_id = %ctx.analysis_id,
            failed_stage,
            error = %error_message,
            "analysis ended partial, id stays valid for retry"
        );

        AnalysisOutcome {
            analysis_id: ctx.analysis_id,
            status: AnalysisStatus::Partial,
            failed_stage: Some(failed_stage.to_string()),
            error_message: Some(error_message),
            artifacts: AnalysisArtifacts::from_context(ctx),
            stage_audits: audits,
            elapsed_ms: run_started.elapsed().as_millis() as u64,
            token_usage: self.client.session_tokens().snapshot(),
        }
    }
}

/// Production wiring: HTTP backend, default quota caps, default cache,
/// vision-OCR text extractor.
pub fn build_pipeline(settings: GenAiSettings) -> AnalysisPipeline {
    let quota = Arc::new(QuotaTracker::default());
    let backend = Arc::new(HttpGenerationBackend::new(&settings));
    let client = Arc::new(GenerationClient::new(backend, settings, quota));
    let extractor = Box::new(DocumentTextExtractor::with_defaults(Arc::clone(&client)));
    AnalysisPipeline::new(extractor, client, AnalysisCache::with_defaults())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{LopdfPageRenderer, MockOcrEngine, OcrRouter, PdfExtractReader};
    use crate::genai::{GenAiError, MockGenerationBackend};
    use crate::input::FileKind;
    use crate::quota::{QuotaCaps, QuotaTracker};

    fn png_upload() -> UploadedFile {
        UploadedFile {
            filename: "notice.png".into(),
            mime_type: "image/png".into(),
            kind: FileKind::Image,
            bytes: vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3],
        }
    }

    /// Pipeline whose OCR is a fixed mock and whose generation backend is
    /// the supplied scripted mock.
    fn pipeline_with_ocr(
        backend: Arc<MockGenerationBackend>,
        ocr: MockOcrEngine,
    ) -> AnalysisPipeline {
        let quota = Arc::new(QuotaTracker::new(QuotaCaps::default()));
        let client = Arc::new(GenerationClient::new(
            backend,
            GenAiSettings::new("test-key"),
            quota,
        ));
        let extractor = Box::new(DocumentTextExtractor::new(
            OcrRouter::single(Box::new(ocr)),
            Box::new(PdfExtractReader),
            Box::new(LopdfPageRenderer),
        ));
        AnalysisPipeline::new(extractor, client, AnalysisCache::with_defaults())
    }

    fn queue_happy_path_from_classification(backend: &MockGenerationBackend) {
        backend.push_text(
            r#"{"documentType": "NOTICE", "confidence": 0.9, "keywords": ["여름방학"], "reasoning": "방학 안내"}"#,
        );
        queue_happy_path_from_extraction(backend);
    }

    fn queue_happy_path_from_extraction(backend: &MockGenerationBackend) {
        backend.push_text(
            r#"{"schedules": [{"title": "여름방학", "memo": "", "startDate": "2025-07-23T00:00:00",
                "endDate": "2025-08-17T00:00:00", "isAllDay": true}], "additionalInfo": {}}"#,
        );
        backend.push_text(r#"[{"original": "하계", "explanation": "summer"}]"#);
        backend.push_text("여름방학은 7월 23일부터 8월 17일까지입니다.");
        queue_happy_path_from_translation(backend);
    }

    fn queue_happy_path_from_translation(backend: &MockGenerationBackend) {
        backend.push_text("Summer vacation runs from July 23 to August 17.");
        backend.push_text("Summer vacation lasts from July 23 to August 17. School resumes afterwards.");
    }

    // ── Scenario: classification outage degrades, run still completes ──

    #[test]
    fn classification_outage_still_completes_end_to_end() {
        let backend = Arc::new(MockGenerationBackend::new());
        // Classification call fails; everything downstream succeeds.
        backend.push_error(GenAiError::Api {
            status: 503,
            body: "tier exhausted".into(),
        });
        queue_happy_path_from_extraction(&backend);

        let pipeline = pipeline_with_ocr(
            Arc::clone(&backend),
            MockOcrEngine::new("여름방학 안내 7/23~8/17"),
        );

        let outcome = pipeline
            .analyze(&png_upload(), AnalyzeOptions::default())
            .unwrap();

        assert_eq!(outcome.status, AnalysisStatus::Completed);
        assert!(outcome.failed_stage.is_none());

        let artifacts = &outcome.artifacts;
        assert_eq!(artifacts.document_type, Some(DocumentType::Notice));
        let classification = artifacts.classification.as_ref().unwrap();
        assert_eq!(classification.document_type, DocumentType::Notice);
        assert!((classification.confidence - 0.5).abs() < f32::EPSILON);

        let extraction = artifacts.extraction.as_ref().unwrap();
        assert_eq!(extraction.schedules.len(), 1);
        assert_eq!(extraction.schedules[0].title, "여름방학");
        assert!(extraction.schedules[0].is_all_day);
        assert_eq!(
            extraction.schedules[0].start_date,
            chrono::NaiveDate::from_ymd_opt(2025, 7, 23)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );

        assert!(artifacts.translated_text.is_some());
        assert!(artifacts.summary.is_some());
        assert_eq!(artifacts.ocr_method, Some(TextProvenance::Ocr));
        assert_eq!(artifacts.page_count, Some(1));

        // Completed analyses are evicted: the id is gone for retry.
        let err = pipeline.retry(outcome.analysis_id, &png_upload()).unwrap_err();
        assert!(matches!(err, AnalysisError::NotFound(_)));
    }

    // ── Scenario: translation fails, retry resumes where it left off ──

    #[test]
    fn partial_translation_then_retry_resumes() {
        let backend = Arc::new(MockGenerationBackend::new());
        backend.push_text(
            r#"{"documentType": "SCHEDULE", "confidence": 0.95, "keywords": [], "reasoning": "일정"}"#,
        );
        backend.push_text(r#"{"schedules": [], "additionalInfo": {}}"#);
        backend.push_text("[]");
        backend.push_text("여름방학은 7월 23일부터입니다.");
        backend.push_error(GenAiError::Api {
            status: 503,
            body: "service unavailable".into(),
        });

        let ocr = MockOcrEngine::new("여름방학 안내 7/23~8/17");
        let ocr_calls = ocr.counter();
        let pipeline = pipeline_with_ocr(Arc::clone(&backend), ocr);

        let first = pipeline
            .analyze(&png_upload(), AnalyzeOptions::default())
            .unwrap();

        assert_eq!(first.status, AnalysisStatus::Partial);
        assert_eq!(first.failed_stage.as_deref(), Some(TRANSLATION));
        assert!(first.error_message.is_some());
        assert!(first.artifacts.simplified_korean.is_some());
        assert!(first.artifacts.translated_text.is_none());
        assert!(first.artifacts.summary.is_none());
        assert_eq!(backend.call_count(), 5);

        // Retry: only translation and summarization may run.
        queue_happy_path_from_translation(&backend);
        let second = pipeline.retry(first.analysis_id, &png_upload()).unwrap();

        assert_eq!(second.status, AnalysisStatus::Completed);
        assert_eq!(second.analysis_id, first.analysis_id);
        assert!(second.artifacts.translated_text.is_some());
        assert!(second.artifacts.summary.is_some());
        // Earlier artifacts survived the retry untouched.
        assert_eq!(
            second.artifacts.classification.as_ref().unwrap().document_type,
            DocumentType::Schedule
        );

        // 5 calls in run one, 2 in run two: nothing upstream re-executed.
        assert_eq!(backend.call_count(), 7);
        assert_eq!(ocr_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        // Audit rows show the resume: first five stages skipped.
        let statuses: Vec<StageStatus> =
            second.stage_audits.iter().map(|a| a.status).collect();
        assert_eq!(
            statuses,
            vec![
                StageStatus::Skipped,
                StageStatus::Skipped,
                StageStatus::Skipped,
                StageStatus::Skipped,
                StageStatus::Skipped,
                StageStatus::Success,
                StageStatus::Success,
            ]
        );
    }

    // ── Extraction failure ──

    #[test]
    fn extraction_failure_is_partial_and_id_stays_valid() {
        let backend = Arc::new(MockGenerationBackend::new());
        let pipeline = pipeline_with_ocr(Arc::clone(&backend), MockOcrEngine::new("  "));

        let outcome = pipeline
            .analyze(&png_upload(), AnalyzeOptions::default())
            .unwrap();

        assert_eq!(outcome.status, AnalysisStatus::Partial);
        assert_eq!(outcome.failed_stage.as_deref(), Some(TEXT_EXTRACTION));
        assert!(outcome.artifacts.original_text.is_none());
        assert_eq!(backend.call_count(), 0, "no generation call before text exists");

        // The id resolves on retry; with OCR still blank it fails the same way.
        let again = pipeline.retry(outcome.analysis_id, &png_upload()).unwrap();
        assert_eq!(again.status, AnalysisStatus::Partial);
        assert_eq!(again.failed_stage.as_deref(), Some(TEXT_EXTRACTION));
    }

    // ── Pre-pipeline validation ──

    #[test]
    fn invalid_upload_is_rejected_without_context() {
        let backend = Arc::new(MockGenerationBackend::new());
        let pipeline = pipeline_with_ocr(Arc::clone(&backend), MockOcrEngine::new("text"));

        let mut file = png_upload();
        file.bytes.clear();
        let err = pipeline.analyze(&file, AnalyzeOptions::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::Input(InputError::EmptyFile)));
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn retry_unknown_id_is_not_found() {
        let backend = Arc::new(MockGenerationBackend::new());
        let pipeline = pipeline_with_ocr(backend, MockOcrEngine::new("text"));

        let missing = Uuid::new_v4();
        let err = pipeline.retry(missing, &png_upload()).unwrap_err();
        assert!(matches!(err, AnalysisError::NotFound(id) if id == missing));
    }

    // ── Options and metadata ──

    #[test]
    fn target_language_and_metadata_flow_into_run() {
        let backend = Arc::new(MockGenerationBackend::new());
        queue_happy_path_from_classification(&backend);

        let pipeline = pipeline_with_ocr(
            Arc::clone(&backend),
            MockOcrEngine::new("현장학습 안내"),
        );

        let mut metadata = serde_json::Map::new();
        metadata.insert("simpleLanguage".into(), serde_json::Value::Bool(true));
        let options = AnalyzeOptions {
            target_language: TargetLanguage::new("Tiếng Việt", "vi"),
            metadata,
        };

        let outcome = pipeline.analyze(&png_upload(), options).unwrap();
        assert_eq!(outcome.status, AnalysisStatus::Completed);
        assert_eq!(outcome.artifacts.target_language.code, "vi");

        let calls = backend.calls();
        // Expressions prompt (call index 2) names the target language;
        // simplify prompt (index 3) honors the easy-language flag.
        assert!(calls[2].prompt.contains("Tiếng Việt"));
        assert!(calls[3].prompt.contains("초등학생"));
        // Translation prompt carries the simplified text, not the original.
        assert!(calls[4].prompt.contains("여름방학은 7월 23일부터"));
    }

    // ── Audit surface ──

    #[test]
    fn audit_rows_cover_every_stage_in_order() {
        let backend = Arc::new(MockGenerationBackend::new());
        queue_happy_path_from_classification(&backend);

        let pipeline = pipeline_with_ocr(
            Arc::clone(&backend),
            MockOcrEngine::new("알림장 본문"),
        );
        let outcome = pipeline
            .analyze(&png_upload(), AnalyzeOptions::default())
            .unwrap();

        let stages: Vec<&str> = outcome.stage_audits.iter().map(|a| a.stage.as_str()).collect();
        assert_eq!(
            stages,
            vec![
                TEXT_EXTRACTION,
                CLASSIFICATION,
                EXTRACTION,
                DIFFICULT_EXPRESSIONS,
                SIMPLIFICATION,
                TRANSLATION,
                SUMMARIZATION,
            ]
        );
        let orders: Vec<u8> = outcome.stage_audits.iter().map(|a| a.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4, 5, 6, 7]);

        // Model-backed stages expose their prompt identifier and model.
        let classification_row = &outcome.stage_audits[1];
        assert!(classification_row.prompt_id.is_some());
        assert!(classification_row.model.is_some());
        assert!(classification_row.response_preview.is_some());
        assert_eq!(classification_row.status, StageStatus::Success);
        let parsed = classification_row.parsed_result.as_ref().unwrap();
        assert_eq!(parsed["documentType"], "NOTICE");

        // The serialized outcome is the response contract.
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "COMPLETED");
        assert!(json["stageAudits"].as_array().unwrap().len() == 7);
        assert!(json.get("tokenUsage").is_some());
    }
}
