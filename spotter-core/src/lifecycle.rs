//! Failover invocation lifecycle.
//!
//! One trace per interruption, held in memory for the length of the
//! invocation and handed back to the caller. There is no retry edge: once a
//! trace reaches `Succeeded` or `Failed` it is closed.

use crate::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverPhase {
    Received,
    RecommendationLookup,
    LaunchRequested,
    Succeeded,
    Failed,
}

impl FailoverPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, FailoverPhase::Succeeded | FailoverPhase::Failed)
    }

    pub fn can_transition_to(self, next: FailoverPhase) -> bool {
        use FailoverPhase::*;

        match (self, next) {
            (Received, RecommendationLookup) => true,
            (RecommendationLookup, LaunchRequested) => true,
            (LaunchRequested, Succeeded) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: FailoverPhase,
    pub to: FailoverPhase,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverTrace {
    pub invocation_id: Uuid,
    pub instance_id: String,
    pub started_at: DateTime<Utc>,
    phase: FailoverPhase,
    transitions: Vec<PhaseTransition>,
}

impl FailoverTrace {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            instance_id: instance_id.into(),
            started_at: Utc::now(),
            phase: FailoverPhase::Received,
            transitions: Vec::new(),
        }
    }

    pub fn phase(&self) -> FailoverPhase {
        self.phase
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    pub fn advance(&mut self, next: FailoverPhase) -> Result<()> {
        self.record(next, None)
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.record(FailoverPhase::Failed, Some(reason.into()))
    }

    /// Reason recorded on the transition into `Failed`, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.transitions
            .iter()
            .rev()
            .find(|t| t.to == FailoverPhase::Failed)
            .and_then(|t| t.note.as_deref())
    }

    fn record(&mut self, next: FailoverPhase, note: Option<String>) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(CoreError::InvalidTransition(format!(
                "{:?} -> {:?} for instance {}",
                self.phase, next, self.instance_id
            )));
        }

        self.transitions.push(PhaseTransition {
            from: self.phase,
            to: next,
            at: Utc::now(),
            note,
        });
        self.phase = next;
        Ok(())
    }
}
