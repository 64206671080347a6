pub mod http;

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::shared::error::{SpotterError, SpotterResult};
use crate::shared::types::LaunchRequest;

/// The cloud compute provisioning API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ComputeLaunchRepository: Send + Sync {
    /// Launch from the request; returns the new instance id.
    async fn launch_instance(&self, request: &LaunchRequest) -> SpotterResult<String>;

    async fn tag_instance(
        &self,
        instance_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> SpotterResult<()>;

    /// Tags currently on `instance_id`, `None` if the instance is unknown.
    async fn instance_tags(&self, instance_id: &str)
        -> SpotterResult<Option<HashMap<String, String>>>;
}

#[derive(Default)]
struct RecordedState {
    launches: Vec<LaunchRequest>,
    tags: HashMap<String, HashMap<String, String>>,
    launch_failure: Option<String>,
    tag_failure: Option<String>,
}

/// In-memory launcher that records every request. Instance ids are
/// sequential (`i-spotter-000001`, ...).
#[derive(Clone, Default)]
pub struct RecordingComputeLauncher {
    state: Arc<RwLock<RecordedState>>,
    next_id: Arc<AtomicU64>,
}

impl RecordingComputeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn launches(&self) -> Vec<LaunchRequest> {
        self.state.read().await.launches.clone()
    }

    pub async fn launch_count(&self) -> usize {
        self.state.read().await.launches.len()
    }

    /// Register an existing instance and its tags.
    pub async fn register_instance(&self, instance_id: &str, tags: HashMap<String, String>) {
        let mut state = self.state.write().await;
        state.tags.insert(instance_id.to_string(), tags);
    }

    /// Fail every following launch with `reason` (capacity, permissions, ...).
    pub async fn fail_launches(&self, reason: &str) {
        self.state.write().await.launch_failure = Some(reason.to_string());
    }

    pub async fn fail_tagging(&self, reason: &str) {
        self.state.write().await.tag_failure = Some(reason.to_string());
    }
}

#[async_trait]
impl ComputeLaunchRepository for RecordingComputeLauncher {
    async fn launch_instance(&self, request: &LaunchRequest) -> SpotterResult<String> {
        let mut state = self.state.write().await;
        state.launches.push(request.clone());

        if let Some(reason) = &state.launch_failure {
            return Err(SpotterError::LaunchFailed(reason.clone()));
        }

        let sequence = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let instance_id = format!("i-spotter-{sequence:06}");
        let tags = request
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        state.tags.insert(instance_id.clone(), tags);

        Ok(instance_id)
    }

    async fn tag_instance(
        &self,
        instance_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> SpotterResult<()> {
        let mut state = self.state.write().await;
        if let Some(reason) = &state.tag_failure {
            return Err(SpotterError::LaunchFailed(reason.clone()));
        }

        let existing = state.tags.get_mut(instance_id).ok_or_else(|| {
            SpotterError::LaunchFailed(format!("instance {instance_id} not found"))
        })?;
        existing.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn instance_tags(
        &self,
        instance_id: &str,
    ) -> SpotterResult<Option<HashMap<String, String>>> {
        Ok(self.state.read().await.tags.get(instance_id).cloned())
    }
}
