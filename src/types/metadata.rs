use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Add another usage report to this one.
    pub fn merge(&mut self, other: &Usage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// Timing and usage accumulated over one pipeline run.
///
/// Counters only ever grow; timestamps are set once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestMetadata {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub usage: Usage,
    pub cost: f64,
    /// Upstream attempts made, retries included
    pub attempts: u32,
}

impl RequestMetadata {
    pub fn mark_started(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub fn mark_ended(&mut self) {
        if self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn add_usage(&mut self, usage: &Usage) {
        self.usage.merge(usage);
    }

    pub fn add_cost(&mut self, cost: f64) {
        if cost.is_finite() && cost > 0.0 {
            self.cost += cost;
        }
    }

    pub fn add_attempts(&mut self, attempts: u32) {
        self.attempts = self.attempts.saturating_add(attempts);
    }

    /// Wall time between start and end, when both are known
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.ended_at? - self.started_at?)
    }
}
