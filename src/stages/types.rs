//! Typed results shared by the stage modules and the pipeline context.

use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::genai::Generation;
use crate::quota::Tier;

/// Category of a school notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Schedule,
    Penalty,
    Event,
    Notice,
}

impl DocumentType {
    /// Lenient parse of a model-produced label. Anything unrecognized is a
    /// plain notice.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "SCHEDULE" => Self::Schedule,
            "PENALTY" => Self::Penalty,
            "EVENT" => Self::Event,
            _ => Self::Notice,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schedule => "SCHEDULE",
            Self::Penalty => "PENALTY",
            Self::Event => "EVENT",
            Self::Notice => "NOTICE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub document_type: DocumentType,
    pub confidence: f32,
    pub keywords: Vec<String>,
    pub reasoning: String,
}

impl ClassificationResult {
    /// Default used when classification cannot run or cannot be parsed.
    pub fn fallback(reasoning: &str) -> Self {
        Self {
            document_type: DocumentType::Notice,
            confidence: 0.5,
            keywords: Vec::new(),
            reasoning: reasoning.to_string(),
        }
    }
}

/// One calendar event pulled out of the notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSchedule {
    pub title: String,
    #[serde(default)]
    pub memo: String,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    #[serde(default)]
    pub is_all_day: bool,
}

/// Schedules plus whatever else the model found worth keeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleExtraction {
    #[serde(default)]
    pub schedules: Vec<ExtractedSchedule>,
    #[serde(default)]
    pub additional_info: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultExpression {
    pub original: String,
    pub explanation: String,
}

/// Language the user wants derived artifacts in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetLanguage {
    /// Display name, e.g. "English".
    pub name: String,
    /// ISO-639 code, e.g. "en".
    pub code: String,
}

impl TargetLanguage {
    pub fn new(name: &str, code: &str) -> Self {
        Self {
            name: name.to_string(),
            code: code.to_string(),
        }
    }

    pub fn english() -> Self {
        Self::new("English", "en")
    }
}

impl Default for TargetLanguage {
    fn default() -> Self {
        Self::english()
    }
}

/// Outcome of a stage that absorbs failures: the fallback path is part of
/// the type instead of a swallowed exception.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Ok(T),
    Degraded(T, String),
}

impl<T> StageOutcome<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Ok(v) | Self::Degraded(v, _) => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Ok(v) | Self::Degraded(v, _) => v,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(..))
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        match self {
            Self::Ok(_) => None,
            Self::Degraded(_, reason) => Some(reason),
        }
    }
}

/// Audit data every stage records about its last model interaction.
#[derive(Debug, Clone)]
pub struct StageTrace {
    pub prompt_id: &'static str,
    pub model: Option<String>,
    pub tier: Option<Tier>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub raw_response: Option<String>,
    pub duration: Duration,
}

impl StageTrace {
    pub fn new(prompt_id: &'static str, temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            prompt_id,
            model: None,
            tier: None,
            temperature,
            max_output_tokens,
            raw_response: None,
            duration: Duration::ZERO,
        }
    }

    /// Copy model/tier/raw-response details out of a completed call.
    pub(crate) fn absorb(&mut self, generation: &Generation) {
        self.model = Some(generation.model.clone());
        self.tier = Some(generation.tier);
        self.raw_response = Some(generation.text.clone());
    }
}
