//! Interruption events.
//!
//! The delivery layer hands us the provider's event envelope as JSON. Only
//! spot interruption warnings become an [`InterruptionSignal`]; anything
//! else is rejected so the failover actor never launches on a stray event.

use crate::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const INTERRUPTION_SOURCE: &str = "aws.ec2";
pub const INTERRUPTION_DETAIL_TYPE: &str = "EC2 Spot Instance Interruption Warning";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptionSignal {
    pub instance_id: String,
    pub cluster: String,
    pub availability_zone: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl InterruptionSignal {
    pub fn new(instance_id: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            cluster: cluster.into(),
            availability_zone: None,
            received_at: Utc::now(),
        }
    }

    pub fn from_event(event: &Value, cluster: &str, received_at: DateTime<Utc>) -> Result<Self> {
        let source = event.get("source").and_then(Value::as_str);
        let detail_type = event.get("detail-type").and_then(Value::as_str);

        if source != Some(INTERRUPTION_SOURCE) || detail_type != Some(INTERRUPTION_DETAIL_TYPE) {
            return Err(CoreError::InvalidEvent(format!(
                "not a spot interruption warning (source={}, detail-type={})",
                source.unwrap_or("<missing>"),
                detail_type.unwrap_or("<missing>")
            )));
        }

        let resource_arn = event
            .get("resources")
            .and_then(Value::as_array)
            .and_then(|resources| resources.first())
            .and_then(Value::as_str);

        let instance_id = event
            .get("detail")
            .and_then(|detail| detail.get("instance-id"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .or_else(|| resource_arn.and_then(instance_id_from_arn))
            .ok_or_else(|| CoreError::InvalidEvent("event names no instance".to_string()))?;

        Ok(Self {
            instance_id,
            cluster: cluster.to_string(),
            availability_zone: resource_arn.and_then(zone_from_arn),
            received_at,
        })
    }
}

fn instance_id_from_arn(arn: &str) -> Option<String> {
    arn.rsplit('/')
        .next()
        .filter(|id| id.starts_with("i-"))
        .map(ToString::to_string)
}

// arn:aws:ec2:<zone-or-region>:<account>:instance/<id>
fn zone_from_arn(arn: &str) -> Option<String> {
    arn.split(':')
        .nth(3)
        .filter(|zone| !zone.is_empty())
        .map(ToString::to_string)
}
