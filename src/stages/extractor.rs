//! Unified structured extraction: calendar schedules plus free-form
//! additional info, in one capable-tier call.
//!
//! Failures degrade to an empty extraction; a notice without recognizable
//! dates is still worth simplifying and translating.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;

use crate::context::PipelineContext;
use crate::genai::GenerationClient;
use crate::recovery;

use super::prompts;
use super::types::{ExtractedSchedule, ScheduleExtraction, StageOutcome, StageTrace};

const TEMPERATURE: f32 = 0.1;
const MAX_OUTPUT_TOKENS: u32 = 2048;

pub struct UnifiedExtractor {
    client: Arc<GenerationClient>,
}

impl UnifiedExtractor {
    pub fn new(client: Arc<GenerationClient>) -> Self {
        Self { client }
    }

    pub fn process(
        &self,
        text: &str,
        _ctx: &PipelineContext,
    ) -> (StageOutcome<ScheduleExtraction>, StageTrace) {
        let started = Instant::now();
        let mut trace = StageTrace::new(prompts::EXTRACT_PROMPT_ID, TEMPERATURE, MAX_OUTPUT_TOKENS);

        let today = chrono::Utc::now().date_naive();
        let prompt = prompts::extraction_prompt(text, today);

        // Structured extraction is the one text stage that prefers the
        // capable tier; date arithmetic is where the economy model slips.
        let outcome = match self
            .client
            .generate_text(&prompt, TEMPERATURE, MAX_OUTPUT_TOKENS, true)
        {
            Ok(generation) => {
                trace.absorb(&generation);
                StageOutcome::Ok(parse_extraction(&generation.text))
            }
            Err(e) => {
                tracing::warn!(error = %e, "schedule extraction degraded to empty result");
                StageOutcome::Degraded(ScheduleExtraction::default(), e.to_string())
            }
        };

        trace.duration = started.elapsed();
        (outcome, trace)
    }
}

/// Parse leniently: malformed schedule entries are skipped one by one
/// instead of discarding the whole extraction.
fn parse_extraction(raw: &str) -> ScheduleExtraction {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RawExtraction {
        #[serde(default)]
        schedules: Vec<serde_json::Value>,
        #[serde(default)]
        additional_info: serde_json::Map<String, serde_json::Value>,
    }

    let json = recovery::extract_object(raw);
    let parsed: RawExtraction = match serde_json::from_str(&json) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, preview = %recovery::preview(raw, 120), "unparseable extraction output");
            return ScheduleExtraction::default();
        }
    };

    let total = parsed.schedules.len();
    let schedules: Vec<ExtractedSchedule> = parsed
        .schedules
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();

    if schedules.len() < total {
        tracing::warn!(
            dropped = total - schedules.len(),
            kept = schedules.len(),
            "skipped malformed schedule entries"
        );
    }

    ScheduleExtraction {
        schedules,
        additional_info: parsed.additional_info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenAiSettings;
    use crate::genai::{GenAiError, MockGenerationBackend};
    use crate::quota::{QuotaCaps, QuotaTracker, Tier};
    use crate::stages::types::TargetLanguage;

    fn extractor_with(backend: Arc<MockGenerationBackend>) -> (UnifiedExtractor, Arc<QuotaTracker>) {
        let quota = Arc::new(QuotaTracker::new(QuotaCaps::default()));
        let extractor = UnifiedExtractor::new(Arc::new(GenerationClient::new(
            backend,
            GenAiSettings::new("test-key"),
            Arc::clone(&quota),
        )));
        (extractor, quota)
    }

    fn ctx() -> PipelineContext {
        PipelineContext::new(
            uuid::Uuid::new_v4(),
            TargetLanguage::english(),
            serde_json::Map::new(),
        )
    }

    #[test]
    fn parses_schedules_and_additional_info() {
        let backend = Arc::new(MockGenerationBackend::new());
        backend.push_text(
            r#"{"schedules": [{"title": "여름방학", "memo": "", "startDate": "2025-07-23T00:00:00",
                "endDate": "2025-08-17T00:00:00", "isAllDay": true}],
               "additionalInfo": {"개학일": "2025-08-18"}}"#,
        );
        let (extractor, quota) = extractor_with(Arc::clone(&backend));

        let (outcome, trace) = extractor.process("여름방학 안내 7/23~8/17", &ctx());
        assert!(!outcome.is_degraded());
        let extraction = outcome.into_value();
        assert_eq!(extraction.schedules.len(), 1);
        let schedule = &extraction.schedules[0];
        assert_eq!(schedule.title, "여름방학");
        assert!(schedule.is_all_day);
        assert_eq!(
            schedule.start_date,
            chrono::NaiveDate::from_ymd_opt(2025, 7, 23)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
        assert_eq!(extraction.additional_info["개학일"], "2025-08-18");
        // Capable tier preferred for structured extraction.
        assert_eq!(trace.tier, Some(Tier::Capable));
        assert_eq!(quota.usage(Tier::Capable), 1);
    }

    #[test]
    fn malformed_entries_are_skipped_not_fatal() {
        let backend = Arc::new(MockGenerationBackend::new());
        backend.push_text(
            r#"{"schedules": [
                {"title": "운동회", "startDate": "2025-10-02T09:00:00", "endDate": "2025-10-02T13:00:00"},
                {"title": "날짜 없는 항목"},
                {"broken": true}
            ]}"#,
        );
        let (extractor, _) = extractor_with(backend);

        let (outcome, _) = extractor.process("본문", &ctx());
        let extraction = outcome.into_value();
        assert_eq!(extraction.schedules.len(), 1);
        assert_eq!(extraction.schedules[0].title, "운동회");
        assert!(!extraction.schedules[0].is_all_day);
    }

    #[test]
    fn service_failure_degrades_to_empty_extraction() {
        let backend = Arc::new(MockGenerationBackend::new());
        backend.push_error(GenAiError::QuotaExhausted);
        let (extractor, _) = extractor_with(backend);

        let (outcome, _) = extractor.process("본문", &ctx());
        assert!(outcome.is_degraded());
        assert_eq!(outcome.value(), &ScheduleExtraction::default());
    }

    #[test]
    fn non_json_output_becomes_empty_extraction() {
        let backend = Arc::new(MockGenerationBackend::new());
        backend.push_text("일정이 없습니다.");
        let (extractor, _) = extractor_with(backend);

        let (outcome, _) = extractor.process("본문", &ctx());
        assert!(!outcome.is_degraded());
        assert!(outcome.value().schedules.is_empty());
        assert!(outcome.value().additional_info.is_empty());
    }

    #[test]
    fn extraction_prompt_carries_document() {
        let backend = Arc::new(MockGenerationBackend::new());
        backend.push_text("{}");
        let (extractor, _) = extractor_with(Arc::clone(&backend));

        extractor.process("현장학습 10월 2일", &ctx());
        assert!(backend.calls()[0].prompt.contains("현장학습 10월 2일"));
    }
}
