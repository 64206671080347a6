pub use spotter_core::{
    FailoverPhase, FailoverTrace, InstanceTypeCandidate, InterruptionSignal, LaunchRequest,
    LaunchTemplateRef, OnDemandPrice, PricedCandidate, Recommendation, ReplacementInstance,
    SpotPriceQuote, SpotterConfig,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Why an evaluation cycle left the stored recommendation untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoQualifyingCandidate,
    PriceSourceUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Published { recommendation: Recommendation },
    Unchanged { reason: SkipReason },
}

/// A candidate dropped from this cycle, with the reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedCandidate {
    pub instance_type: String,
    pub reason: String,
    pub source_error: bool,
}

/// Everything one evaluation cycle saw and decided
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub min_savings_percent: f64,
    pub priced: Vec<PricedCandidate>,
    pub skipped: Vec<SkippedCandidate>,
    pub outcome: EvaluationOutcome,
}

impl EvaluationReport {
    pub fn published(&self) -> Option<&Recommendation> {
        match &self.outcome {
            EvaluationOutcome::Published { recommendation } => Some(recommendation),
            EvaluationOutcome::Unchanged { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FailoverOutcome {
    Launched {
        replacement: ReplacementInstance,
        recommendation: Recommendation,
        trace: FailoverTrace,
    },
    /// The interrupted instance is not one of ours; nothing was read or launched.
    Ignored { instance_id: String, reason: String },
}

impl FailoverOutcome {
    pub fn replacement(&self) -> Option<&ReplacementInstance> {
        match self {
            FailoverOutcome::Launched { replacement, .. } => Some(replacement),
            FailoverOutcome::Ignored { .. } => None,
        }
    }
}
