//! Invocation configuration.
//!
//! Every tunable lives in [`SpotterConfig`]. It is read once (normally from
//! the environment) and validated before either actor does any work.

use crate::{CoreError, InstanceTypeCandidate, LaunchTemplateRef, Result};
use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_MIN_SAVINGS_PERCENT: u8 = 80;
pub const DEFAULT_CHECK_FREQUENCY_MINUTES: u64 = 10;
pub const DEFAULT_DESIRED_COUNT: u32 = 1;
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_LAUNCH_TEMPLATE_VERSION: &str = "$Latest";
pub const DEFAULT_SPOT_PRICE_MAX_AGE_MINUTES: u64 = 60;
pub const DEFAULT_ON_DEMAND_CACHE_TTL_MINUTES: u64 = 24 * 60;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_INVOCATION_DEADLINE_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct SpotterConfig {
    pub min_savings_percent: u8,
    pub check_frequency_minutes: u64,
    pub launch_template_id: String,
    pub launch_template_version: String,
    pub cluster_name: String,
    pub subnet_ids: Vec<String>,
    pub desired_count: u32,
    pub region: String,
    pub candidates: Vec<InstanceTypeCandidate>,
    pub spot_price_max_age_minutes: u64,
    pub on_demand_cache_ttl_minutes: u64,
    pub call_timeout_secs: u64,
    pub invocation_deadline_secs: u64,
    pub managed_instances_only: bool,
}

impl SpotterConfig {
    /// Config with every optional field at its default.
    pub fn new(
        cluster_name: impl Into<String>,
        launch_template_id: impl Into<String>,
        subnet_ids: Vec<String>,
        candidates: Vec<InstanceTypeCandidate>,
    ) -> Self {
        Self {
            min_savings_percent: DEFAULT_MIN_SAVINGS_PERCENT,
            check_frequency_minutes: DEFAULT_CHECK_FREQUENCY_MINUTES,
            launch_template_id: launch_template_id.into(),
            launch_template_version: DEFAULT_LAUNCH_TEMPLATE_VERSION.to_string(),
            cluster_name: cluster_name.into(),
            subnet_ids,
            desired_count: DEFAULT_DESIRED_COUNT,
            region: DEFAULT_REGION.to_string(),
            candidates,
            spot_price_max_age_minutes: DEFAULT_SPOT_PRICE_MAX_AGE_MINUTES,
            on_demand_cache_ttl_minutes: DEFAULT_ON_DEMAND_CACHE_TTL_MINUTES,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            invocation_deadline_secs: DEFAULT_INVOCATION_DEADLINE_SECS,
            managed_instances_only: false,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing optional keys fall back to
    /// their defaults; the result is not yet validated.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let cluster_name = get("CLUSTER_NAME")
            .or_else(|| get("EKS_CLUSTER_NAME"))
            .unwrap_or_default();
        let launch_template_id = get("LAUNCH_TEMPLATE_ID").unwrap_or_default();
        let subnet_ids = get("SUBNET_IDS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();
        let candidates = match get("INSTANCE_TYPES") {
            Some(raw) => parse_candidates(&raw)?,
            None => Vec::new(),
        };

        let mut config = Self::new(cluster_name, launch_template_id, subnet_ids, candidates);

        if let Some(raw) = get("MIN_SAVINGS_PERCENT") {
            config.min_savings_percent = parse_number("MIN_SAVINGS_PERCENT", &raw)?;
        }
        if let Some(raw) = get("CHECK_FREQUENCY_MINUTES") {
            config.check_frequency_minutes = parse_number("CHECK_FREQUENCY_MINUTES", &raw)?;
        }
        if let Some(version) = get("LAUNCH_TEMPLATE_VERSION") {
            config.launch_template_version = version;
        }
        if let Some(raw) = get("DESIRED_INSTANCE_COUNT") {
            config.desired_count = parse_number("DESIRED_INSTANCE_COUNT", &raw)?;
        }
        if let Some(region) = get("AWS_REGION") {
            config.region = region;
        }
        if let Some(raw) = get("SPOT_PRICE_MAX_AGE_MINUTES") {
            config.spot_price_max_age_minutes = parse_number("SPOT_PRICE_MAX_AGE_MINUTES", &raw)?;
        }
        if let Some(raw) = get("ON_DEMAND_CACHE_TTL_MINUTES") {
            config.on_demand_cache_ttl_minutes =
                parse_number("ON_DEMAND_CACHE_TTL_MINUTES", &raw)?;
        }
        if let Some(raw) = get("CALL_TIMEOUT_SECS") {
            config.call_timeout_secs = parse_number("CALL_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = get("INVOCATION_DEADLINE_SECS") {
            config.invocation_deadline_secs = parse_number("INVOCATION_DEADLINE_SECS", &raw)?;
        }
        if let Some(raw) = get("MANAGED_INSTANCES_ONLY") {
            config.managed_instances_only = parse_bool("MANAGED_INSTANCES_ONLY", &raw)?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_savings_percent > 100 {
            return invalid("min_savings_percent must be between 0 and 100");
        }
        if self.check_frequency_minutes == 0 {
            return invalid("check_frequency_minutes must be at least 1");
        }
        if self.launch_template_id.is_empty() {
            return invalid("launch template id is required");
        }
        if self.launch_template_version.is_empty() {
            return invalid("launch template version cannot be empty");
        }
        if self.cluster_name.is_empty() {
            return invalid("cluster name is required");
        }
        if self.subnet_ids.is_empty() || self.subnet_ids.iter().any(|s| s.is_empty()) {
            return invalid("at least one subnet id is required");
        }
        if self.desired_count == 0 {
            return invalid("desired_count must be at least 1");
        }
        if self.region.is_empty() {
            return invalid("region cannot be empty");
        }
        if self.candidates.is_empty() {
            return invalid("at least one candidate instance type is required");
        }

        let mut seen = HashSet::new();
        for candidate in &self.candidates {
            if candidate.instance_type.is_empty() {
                return invalid("candidate instance type cannot be empty");
            }
            if !seen.insert(candidate.instance_type.as_str()) {
                return Err(CoreError::InvalidConfiguration(format!(
                    "duplicate candidate instance type '{}'",
                    candidate.instance_type
                )));
            }
        }

        if self.spot_price_max_age_minutes == 0 {
            return invalid("spot_price_max_age_minutes must be at least 1");
        }
        if self.call_timeout_secs == 0 || self.invocation_deadline_secs == 0 {
            return invalid("timeouts must be at least one second");
        }
        if self.call_timeout_secs >= self.invocation_deadline_secs {
            return invalid("call timeout must be shorter than the invocation deadline");
        }

        Ok(())
    }

    pub fn launch_template(&self) -> LaunchTemplateRef {
        LaunchTemplateRef::new(&self.launch_template_id, &self.launch_template_version)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_frequency_minutes * 60)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn invocation_deadline(&self) -> Duration {
        Duration::from_secs(self.invocation_deadline_secs)
    }

    pub fn on_demand_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.on_demand_cache_ttl_minutes * 60)
    }

    pub fn spot_price_max_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.spot_price_max_age_minutes as i64)
    }
}

fn invalid<T>(message: &str) -> Result<T> {
    Err(CoreError::InvalidConfiguration(message.to_string()))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| CoreError::InvalidConfiguration(format!("{key} is not a valid number: {raw}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(CoreError::InvalidConfiguration(format!(
            "{key} is not a valid boolean: {raw}"
        ))),
    }
}

/// Parses `type[:vcpus:memory_gib]` entries, e.g. `t3.medium:2:4,m5.large`.
pub fn parse_candidates(raw: &str) -> Result<Vec<InstanceTypeCandidate>> {
    split_list(raw)
        .into_iter()
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            match parts.as_slice() {
                [instance_type] => Ok(InstanceTypeCandidate::new(*instance_type)),
                [instance_type, vcpus, memory] => {
                    let vcpus = parse_number::<u32>("INSTANCE_TYPES vcpus", vcpus)?;
                    let memory = parse_number::<f64>("INSTANCE_TYPES memory", memory)?;
                    Ok(InstanceTypeCandidate::new(*instance_type).with_profile(vcpus, memory))
                }
                _ => Err(CoreError::InvalidConfiguration(format!(
                    "malformed instance type entry '{entry}'"
                ))),
            }
        })
        .collect()
}
