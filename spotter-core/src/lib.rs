pub mod config;
pub mod event;
pub mod lifecycle;
pub mod selection;
pub mod tags;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

pub use config::SpotterConfig;
pub use event::InterruptionSignal;
pub use lifecycle::{FailoverPhase, FailoverTrace, PhaseTransition};
pub use selection::{savings_percent, select_best, PricedCandidate};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// A compute SKU the evaluator may recommend. Static catalog input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceTypeCandidate {
    pub instance_type: String,
    pub vcpus: Option<u32>,
    pub memory_gib: Option<f64>,
}

impl InstanceTypeCandidate {
    pub fn new(instance_type: impl Into<String>) -> Self {
        Self {
            instance_type: instance_type.into(),
            vcpus: None,
            memory_gib: None,
        }
    }

    pub fn with_profile(mut self, vcpus: u32, memory_gib: f64) -> Self {
        self.vcpus = Some(vcpus);
        self.memory_gib = Some(memory_gib);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotPriceQuote {
    pub instance_type: String,
    pub price: f64,
    pub currency: String,
    pub observed_at: DateTime<Utc>,
}

impl SpotPriceQuote {
    pub fn new(instance_type: impl Into<String>, price: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            instance_type: instance_type.into(),
            price,
            currency: "USD".to_string(),
            observed_at,
        }
    }

    /// A quote is usable only inside the recency window. Quotes stamped in
    /// the future (clock skew) count as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.observed_at) <= max_age
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnDemandPrice {
    pub instance_type: String,
    pub price: f64,
}

impl OnDemandPrice {
    pub fn new(instance_type: impl Into<String>, price: f64) -> Self {
        Self {
            instance_type: instance_type.into(),
            price,
        }
    }
}

/// The single durable piece of cross-component state: the instance type to
/// launch on the next interruption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub instance_type: String,
    pub savings_percent: f64,
    pub spot_price: f64,
    pub on_demand_price: f64,
    pub region: String,
    pub decided_at: DateTime<Utc>,
}

impl Recommendation {
    pub fn from_candidate(
        candidate: &PricedCandidate,
        region: impl Into<String>,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self {
            instance_type: candidate.instance_type.clone(),
            savings_percent: candidate.savings_percent,
            spot_price: candidate.spot_price,
            on_demand_price: candidate.on_demand_price,
            region: region.into(),
            decided_at,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CoreError::SerializationError(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| CoreError::SerializationError(e.to_string()))
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.decided_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchTemplateRef {
    pub id: String,
    pub version: String,
}

impl LaunchTemplateRef {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }
}

/// What the failover actor hands to the compute launch API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub instance_type: String,
    pub launch_template: LaunchTemplateRef,
    /// Ordered; the launcher places the instance in the first subnet with capacity.
    pub subnet_candidates: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub desired_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementInstance {
    pub instance_id: String,
    pub instance_type: String,
    pub launch_template: LaunchTemplateRef,
    pub subnet_candidates: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub desired_count: u32,
    pub tagged: bool,
}

impl ReplacementInstance {
    pub fn launched(instance_id: impl Into<String>, request: LaunchRequest, tagged: bool) -> Self {
        Self {
            instance_id: instance_id.into(),
            instance_type: request.instance_type,
            launch_template: request.launch_template,
            subnet_candidates: request.subnet_candidates,
            tags: request.tags,
            desired_count: request.desired_count,
            tagged,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
    pub details: Option<HashMap<String, String>>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: HashMap<String, String>) -> Self {
        self.details = Some(details);
        self
    }
}
