//! Token usage and cost accounting for one case.

use claimsight_core::ModelUsage;
use parking_lot::RwLock;

use crate::providers::TokenUsage;

/// Accumulates usage across the concurrent calls of a case.
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: RwLock<ModelUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one model call. Counters saturate instead of wrapping.
    pub fn record(&self, usage: &TokenUsage, model: &str) {
        let mut total = self.usage.write();
        total.model_calls = total.model_calls.saturating_add(1);
        total.prompt_tokens = total.prompt_tokens.saturating_add(usage.prompt_tokens);
        total.completion_tokens = total.completion_tokens.saturating_add(usage.completion_tokens);
        total.total_tokens = total.total_tokens.saturating_add(usage.total());
        total.estimated_cost_usd += estimate_cost(usage, model);
    }

    pub fn snapshot(&self) -> ModelUsage {
        self.usage.read().clone()
    }
}

/// Estimated USD cost of one call.
pub fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
    // Per million tokens, (input, output)
    let (input_rate, output_rate) = match model {
        m if m.contains("flash-lite") => (0.10, 0.40),
        m if m.contains("2.5-flash") => (0.30, 2.50),
        m if m.contains("2.5-pro") => (1.25, 10.0),
        m if m.contains("2.0-flash") => (0.10, 0.40),
        _ => (1.25, 10.0),
    };

    let input_cost = (usage.prompt_tokens as f64 / 1_000_000.0) * input_rate;
    let output_cost = (usage.completion_tokens as f64 / 1_000_000.0) * output_rate;
    input_cost + output_cost
}
