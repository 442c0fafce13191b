//! Session-scoped token accounting.
//!
//! One pipeline run resets the counters at start and reads a snapshot at the
//! end; nothing here is persisted.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::types::UsageMetadata;

#[derive(Debug, Default)]
pub struct SessionTokenUsage {
    prompt: AtomicU64,
    candidates: AtomicU64,
    total: AtomicU64,
}

impl SessionTokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero all counters. Called at the start of each pipeline run.
    pub fn reset(&self) {
        self.prompt.store(0, Ordering::SeqCst);
        self.candidates.store(0, Ordering::SeqCst);
        self.total.store(0, Ordering::SeqCst);
    }

    /// Fold one response's usage metadata into the session totals.
    pub fn accumulate(&self, usage: &UsageMetadata) {
        self.prompt.fetch_add(usage.prompt_token_count, Ordering::SeqCst);
        self.candidates
            .fetch_add(usage.candidates_token_count, Ordering::SeqCst);
        self.total.fetch_add(usage.total_token_count, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> TokenUsageSnapshot {
        TokenUsageSnapshot {
            prompt_tokens: self.prompt.load(Ordering::SeqCst),
            candidate_tokens: self.candidates.load(Ordering::SeqCst),
            total_tokens: self.total.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsageSnapshot {
    pub prompt_tokens: u64,
    pub candidate_tokens: u64,
    pub total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt: u64, candidates: u64) -> UsageMetadata {
        UsageMetadata {
            prompt_token_count: prompt,
            candidates_token_count: candidates,
            total_token_count: prompt + candidates,
        }
    }

    #[test]
    fn accumulates_across_calls() {
        let counters = SessionTokenUsage::new();
        counters.accumulate(&usage(100, 40));
        counters.accumulate(&usage(50, 10));

        let snap = counters.snapshot();
        assert_eq!(snap.prompt_tokens, 150);
        assert_eq!(snap.candidate_tokens, 50);
        assert_eq!(snap.total_tokens, 200);
    }

    #[test]
    fn reset_zeroes_counters() {
        let counters = SessionTokenUsage::new();
        counters.accumulate(&usage(100, 40));
        counters.reset();
        assert_eq!(counters.snapshot(), TokenUsageSnapshot::default());
    }
}
