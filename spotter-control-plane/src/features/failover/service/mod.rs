use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::features::failover::repo::ComputeLaunchRepository;
use crate::features::recommendation_store::service::RecommendationStore;
use crate::shared::bounded::bounded;
use crate::shared::error::{SpotterError, SpotterResult};
use crate::shared::types::{
    FailoverOutcome, FailoverPhase, FailoverTrace, InterruptionSignal, LaunchRequest,
    LaunchTemplateRef, Recommendation, ReplacementInstance, SpotterConfig,
};
use spotter_core::tags::{cluster_tags, is_spotter_managed};

/// The FailoverActor. Holds no state between invocations, so concurrent
/// `handle_interruption` calls for different instances never interact.
pub struct FailoverService {
    store: Arc<RecommendationStore>,
    compute: Arc<dyn ComputeLaunchRepository>,
    cluster: String,
    launch_template: LaunchTemplateRef,
    subnet_ids: Vec<String>,
    desired_count: u32,
    managed_instances_only: bool,
    call_timeout: Duration,
}

impl FailoverService {
    pub fn new(
        store: Arc<RecommendationStore>,
        compute: Arc<dyn ComputeLaunchRepository>,
        config: &SpotterConfig,
    ) -> Self {
        Self {
            store,
            compute,
            cluster: config.cluster_name.clone(),
            launch_template: config.launch_template(),
            subnet_ids: config.subnet_ids.clone(),
            desired_count: config.desired_count,
            managed_instances_only: config.managed_instances_only,
            call_timeout: config.call_timeout(),
        }
    }

    /// Launch one replacement for the interrupted instance using the stored
    /// recommendation.
    ///
    /// Exactly one launch request is issued once a recommendation has been
    /// read. A missing or unreadable recommendation ends the invocation
    /// before any launch. Nothing is retried here.
    pub async fn handle_interruption(
        &self,
        signal: InterruptionSignal,
    ) -> SpotterResult<FailoverOutcome> {
        if signal.cluster != self.cluster {
            return Err(SpotterError::InvalidRequest(format!(
                "signal for cluster '{}' delivered to cluster '{}'",
                signal.cluster, self.cluster
            )));
        }

        let mut trace = FailoverTrace::new(signal.instance_id.clone());
        info!(
            invocation_id = %trace.invocation_id,
            instance_id = %signal.instance_id,
            cluster = %signal.cluster,
            availability_zone = signal.availability_zone.as_deref().unwrap_or("unknown"),
            "Interruption received"
        );

        if self.managed_instances_only {
            if let Some(reason) = self.unmanaged_reason(&signal.instance_id).await {
                info!(instance_id = %signal.instance_id, %reason, "Ignoring interruption");
                return Ok(FailoverOutcome::Ignored {
                    instance_id: signal.instance_id,
                    reason,
                });
            }
        }

        trace.advance(FailoverPhase::RecommendationLookup)?;
        let recommendation = match self.store.current(&self.cluster).await {
            Ok(Some(recommendation)) => recommendation,
            Ok(None) => {
                let err = SpotterError::NoRecommendationAvailable(self.cluster.clone());
                return Err(abort(&mut trace, err));
            }
            Err(err) => return Err(abort(&mut trace, err)),
        };

        let request = self.launch_request(&recommendation);
        trace.advance(FailoverPhase::LaunchRequested)?;
        info!(
            invocation_id = %trace.invocation_id,
            instance_type = %request.instance_type,
            subnets = ?request.subnet_candidates,
            desired_count = request.desired_count,
            "Requesting replacement instance"
        );

        let launched = bounded(
            self.call_timeout,
            |limit| SpotterError::LaunchFailed(format!("launch request exceeded {limit:?}")),
            self.compute.launch_instance(&request),
        )
        .await;

        let instance_id = match launched {
            Ok(instance_id) => instance_id,
            Err(e @ SpotterError::LaunchFailed(_)) => return Err(abort(&mut trace, e)),
            Err(other) => {
                return Err(abort(&mut trace, SpotterError::LaunchFailed(other.to_string())))
            }
        };

        let tagged = self.apply_tags(&instance_id, &request).await;
        trace.advance(FailoverPhase::Succeeded)?;

        info!(
            invocation_id = %trace.invocation_id,
            replaced = %signal.instance_id,
            %instance_id,
            instance_type = %request.instance_type,
            tagged,
            "Replacement instance launched"
        );

        Ok(FailoverOutcome::Launched {
            replacement: ReplacementInstance::launched(instance_id, request, tagged),
            recommendation,
            trace,
        })
    }

    fn launch_request(&self, recommendation: &Recommendation) -> LaunchRequest {
        LaunchRequest {
            instance_type: recommendation.instance_type.clone(),
            launch_template: self.launch_template.clone(),
            subnet_candidates: self.subnet_ids.clone(),
            tags: cluster_tags(&self.cluster),
            desired_count: self.desired_count,
        }
    }

    /// Tags go out with the launch request too; this post-launch pass only
    /// makes sure they stuck. A failure here never undoes the launch.
    async fn apply_tags(&self, instance_id: &str, request: &LaunchRequest) -> bool {
        let result = bounded(
            self.call_timeout,
            |limit| SpotterError::LaunchFailed(format!("tagging exceeded {limit:?}")),
            self.compute.tag_instance(instance_id, &request.tags),
        )
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(%instance_id, error = %e, "Replacement launched but tagging failed");
                false
            }
        }
    }

    /// `Some(reason)` when the interrupted instance is not ours. A failed tag
    /// lookup counts as not ours.
    async fn unmanaged_reason(&self, instance_id: &str) -> Option<String> {
        let lookup = bounded(
            self.call_timeout,
            |limit| SpotterError::LaunchFailed(format!("tag lookup exceeded {limit:?}")),
            self.compute.instance_tags(instance_id),
        )
        .await;

        match lookup {
            Ok(Some(tags)) if is_spotter_managed(&tags, &self.cluster) => None,
            Ok(Some(_)) => Some(format!("instance {instance_id} is not managed by Spotter")),
            Ok(None) => Some(format!("instance {instance_id} is unknown")),
            Err(e) => {
                warn!(%instance_id, error = %e, "Could not read instance tags");
                Some(format!("tags for {instance_id} unavailable: {e}"))
            }
        }
    }
}

fn abort(trace: &mut FailoverTrace, err: SpotterError) -> SpotterError {
    if let Err(transition) = trace.fail(err.to_string()) {
        warn!(error = %transition, "Could not record failed phase");
    }
    error!(
        invocation_id = %trace.invocation_id,
        instance_id = %trace.instance_id,
        code = err.error_code(),
        error = %err,
        "Failover failed"
    );
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::failover::repo::{MockComputeLaunchRepository, RecordingComputeLauncher};
    use crate::features::recommendation_store::repo::{
        InMemoryRecommendationRepository, MockRecommendationRepository,
    };
    use crate::shared::types::{InstanceTypeCandidate, PricedCandidate};
    use chrono::Utc;
    use std::collections::HashMap;

    fn config() -> SpotterConfig {
        SpotterConfig::new(
            "prod",
            "lt-0abc",
            vec!["subnet-a".to_string(), "subnet-b".to_string()],
            vec![InstanceTypeCandidate::new("m5.large")],
        )
    }

    async fn store_with(instance_type: Option<&str>) -> Arc<RecommendationStore> {
        let store = Arc::new(RecommendationStore::new(
            Arc::new(InMemoryRecommendationRepository::new()),
            Duration::from_secs(1),
        ));
        if let Some(instance_type) = instance_type {
            let candidate = PricedCandidate::from_prices(instance_type, 0.02, 0.12).unwrap();
            store
                .publish(
                    "prod",
                    &Recommendation::from_candidate(&candidate, "us-east-1", Utc::now()),
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_launches_recommended_type() {
        let launcher = RecordingComputeLauncher::new();
        let service = FailoverService::new(
            store_with(Some("m5.large")).await,
            Arc::new(launcher.clone()),
            &config(),
        );

        let outcome = service
            .handle_interruption(InterruptionSignal::new("i-0123", "prod"))
            .await
            .unwrap();

        let replacement = outcome.replacement().unwrap();
        assert_eq!(replacement.instance_type, "m5.large");
        assert_eq!(replacement.launch_template.version, "$Latest");
        assert_eq!(replacement.subnet_candidates, vec!["subnet-a", "subnet-b"]);
        assert_eq!(replacement.desired_count, 1);
        assert!(replacement.tagged);
        assert_eq!(
            replacement.tags.get("kubernetes.io/cluster/prod").map(String::as_str),
            Some("owned")
        );
        assert_eq!(launcher.launch_count().await, 1);

        match outcome {
            FailoverOutcome::Launched { trace, .. } => {
                assert_eq!(trace.phase(), FailoverPhase::Succeeded);
                assert_eq!(trace.transitions().len(), 3);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cold_start_fails_without_launch() {
        let mut compute = MockComputeLaunchRepository::new();
        compute.expect_launch_instance().times(0);
        let service = FailoverService::new(store_with(None).await, Arc::new(compute), &config());

        let result = service
            .handle_interruption(InterruptionSignal::new("i-0123", "prod"))
            .await;

        match result {
            Err(SpotterError::NoRecommendationAvailable(cluster)) => assert_eq!(cluster, "prod"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_without_launch() {
        let mut repo = MockRecommendationRepository::new();
        repo.expect_get()
            .times(1)
            .returning(|_| Err(SpotterError::StoreUnavailable("etcd down".to_string())));
        let store = Arc::new(RecommendationStore::new(Arc::new(repo), Duration::from_secs(1)));

        let mut compute = MockComputeLaunchRepository::new();
        compute.expect_launch_instance().times(0);
        let service = FailoverService::new(store, Arc::new(compute), &config());

        let result = service
            .handle_interruption(InterruptionSignal::new("i-0123", "prod"))
            .await;
        assert!(matches!(result, Err(SpotterError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported_once() {
        let mut compute = MockComputeLaunchRepository::new();
        compute
            .expect_launch_instance()
            .times(1)
            .returning(|_| Err(SpotterError::LaunchFailed("InsufficientInstanceCapacity".to_string())));
        compute.expect_tag_instance().times(0);
        let service = FailoverService::new(
            store_with(Some("m5.large")).await,
            Arc::new(compute),
            &config(),
        );

        let result = service
            .handle_interruption(InterruptionSignal::new("i-0123", "prod"))
            .await;

        match result {
            Err(SpotterError::LaunchFailed(msg)) => {
                assert!(msg.contains("InsufficientInstanceCapacity"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tagging_failure_still_succeeds() {
        let launcher = RecordingComputeLauncher::new();
        launcher.fail_tagging("throttled").await;
        let service = FailoverService::new(
            store_with(Some("m5.large")).await,
            Arc::new(launcher.clone()),
            &config(),
        );

        let outcome = service
            .handle_interruption(InterruptionSignal::new("i-0123", "prod"))
            .await
            .unwrap();

        assert!(!outcome.replacement().unwrap().tagged);
        assert_eq!(launcher.launch_count().await, 1);
    }

    #[tokio::test]
    async fn test_signal_for_other_cluster_is_rejected() {
        let mut compute = MockComputeLaunchRepository::new();
        compute.expect_launch_instance().times(0);
        let service = FailoverService::new(
            store_with(Some("m5.large")).await,
            Arc::new(compute),
            &config(),
        );

        let result = service
            .handle_interruption(InterruptionSignal::new("i-0123", "staging"))
            .await;
        assert!(matches!(result, Err(SpotterError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_unmanaged_instance_is_ignored() {
        let launcher = RecordingComputeLauncher::new();
        launcher
            .register_instance(
                "i-foreign",
                HashMap::from([("team".to_string(), "data".to_string())]),
            )
            .await;
        let mut config = config();
        config.managed_instances_only = true;
        let service = FailoverService::new(
            store_with(Some("m5.large")).await,
            Arc::new(launcher.clone()),
            &config,
        );

        let outcome = service
            .handle_interruption(InterruptionSignal::new("i-foreign", "prod"))
            .await
            .unwrap();

        assert!(matches!(outcome, FailoverOutcome::Ignored { .. }));
        assert_eq!(launcher.launch_count().await, 0);
    }

    #[tokio::test]
    async fn test_managed_instance_is_replaced() {
        let launcher = RecordingComputeLauncher::new();
        launcher
            .register_instance("i-ours", cluster_tags("prod").into_iter().collect())
            .await;
        let mut config = config();
        config.managed_instances_only = true;
        let service = FailoverService::new(
            store_with(Some("c5.large")).await,
            Arc::new(launcher.clone()),
            &config,
        );

        let outcome = service
            .handle_interruption(InterruptionSignal::new("i-ours", "prod"))
            .await
            .unwrap();

        assert_eq!(outcome.replacement().unwrap().instance_type, "c5.large");
        assert_eq!(launcher.launch_count().await, 1);
    }

    #[tokio::test]
    async fn test_tag_lookup_failure_is_ignored() {
        let mut compute = MockComputeLaunchRepository::new();
        compute
            .expect_instance_tags()
            .times(1)
            .returning(|_| Err(SpotterError::LaunchFailed("access denied".to_string())));
        compute.expect_launch_instance().times(0);
        let mut config = config();
        config.managed_instances_only = true;
        let service = FailoverService::new(
            store_with(Some("m5.large")).await,
            Arc::new(compute),
            &config,
        );

        let outcome = service
            .handle_interruption(InterruptionSignal::new("i-0123", "prod"))
            .await
            .unwrap();
        assert!(matches!(outcome, FailoverOutcome::Ignored { .. }));
    }

    /// Accepts launches but never answers them.
    struct StalledLauncher;

    #[async_trait::async_trait]
    impl ComputeLaunchRepository for StalledLauncher {
        async fn launch_instance(&self, _request: &LaunchRequest) -> SpotterResult<String> {
            std::future::pending().await
        }

        async fn tag_instance(
            &self,
            _instance_id: &str,
            _tags: &std::collections::BTreeMap<String, String>,
        ) -> SpotterResult<()> {
            Ok(())
        }

        async fn instance_tags(
            &self,
            _instance_id: &str,
        ) -> SpotterResult<Option<HashMap<String, String>>> {
            Ok(None)
        }
    }

    /// A store that accepts connections and then goes silent.
    struct StalledStore;

    #[async_trait::async_trait]
    impl crate::features::recommendation_store::repo::RecommendationRepository for StalledStore {
        async fn put(&self, _key: &str, _recommendation: &Recommendation) -> SpotterResult<()> {
            std::future::pending().await
        }

        async fn get(&self, _key: &str) -> SpotterResult<Option<Recommendation>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stalled_launch_is_launch_failure() {
        let mut config = config();
        config.call_timeout_secs = 1;
        let service = FailoverService::new(
            store_with(Some("m5.large")).await,
            Arc::new(StalledLauncher),
            &config,
        );

        let result = service
            .handle_interruption(InterruptionSignal::new("i-0123", "prod"))
            .await;

        match result {
            Err(SpotterError::LaunchFailed(msg)) => assert!(msg.contains("exceeded")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stalled_store_read_is_store_failure() {
        let store = Arc::new(RecommendationStore::new(
            Arc::new(StalledStore),
            Duration::from_millis(50),
        ));
        let mut compute = MockComputeLaunchRepository::new();
        compute.expect_launch_instance().times(0);
        let service = FailoverService::new(store, Arc::new(compute), &config());

        let result = service
            .handle_interruption(InterruptionSignal::new("i-0123", "prod"))
            .await;

        match result {
            Err(SpotterError::StoreUnavailable(msg)) => assert!(msg.contains("exceeded")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
