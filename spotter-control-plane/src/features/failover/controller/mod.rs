use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use spotter_core::ErrorResponse;
use tracing::{error, info};

use crate::features::failover::service::FailoverService;
use crate::shared::bounded::bounded;
use crate::shared::error::SpotterError;
use crate::shared::types::{FailoverOutcome, InterruptionSignal};

pub struct FailoverController {
    service: Arc<FailoverService>,
    cluster: String,
    deadline: Duration,
}

impl FailoverController {
    pub fn new(service: Arc<FailoverService>, cluster: impl Into<String>, deadline: Duration) -> Self {
        Self {
            service,
            cluster: cluster.into(),
            deadline,
        }
    }

    /// Handle a raw interruption event as delivered by the event bus.
    pub async fn handle_event(&self, event: &Value) -> Result<FailoverOutcome, ErrorResponse> {
        let signal = match InterruptionSignal::from_event(event, &self.cluster, Utc::now()) {
            Ok(signal) => signal,
            Err(e) => {
                let err = SpotterError::from(e);
                error!(error = %err, "Rejected interruption event");
                return Err(err.into());
            }
        };

        self.handle_signal(signal).await
    }

    pub async fn handle_signal(
        &self,
        signal: InterruptionSignal,
    ) -> Result<FailoverOutcome, ErrorResponse> {
        info!(instance_id = %signal.instance_id, "Received interruption signal");

        bounded(
            self.deadline,
            |limit| SpotterError::Timeout(format!("failover invocation exceeded {limit:?}")),
            self.service.handle_interruption(signal),
        )
        .await
        .map_err(|e| {
            if matches!(e, SpotterError::Timeout(_)) {
                error!(error = %e, "Failover invocation timed out");
            }
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::failover::repo::{ComputeLaunchRepository, RecordingComputeLauncher};
    use crate::features::recommendation_store::repo::InMemoryRecommendationRepository;
    use crate::features::recommendation_store::service::RecommendationStore;
    use crate::shared::error::SpotterResult;
    use crate::shared::types::{
        InstanceTypeCandidate, LaunchRequest, PricedCandidate, Recommendation, SpotterConfig,
    };
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    async fn create_test_controller(
        launcher: RecordingComputeLauncher,
        published: bool,
    ) -> FailoverController {
        let config = SpotterConfig::new(
            "prod",
            "lt-0abc",
            vec!["subnet-a".to_string()],
            vec![InstanceTypeCandidate::new("m5.large")],
        );
        let store = Arc::new(RecommendationStore::new(
            Arc::new(InMemoryRecommendationRepository::new()),
            Duration::from_secs(1),
        ));
        if published {
            let candidate = PricedCandidate::from_prices("m5.large", 0.02, 0.12).unwrap();
            store
                .publish(
                    "prod",
                    &Recommendation::from_candidate(&candidate, "us-east-1", Utc::now()),
                )
                .await
                .unwrap();
        }

        let service = Arc::new(FailoverService::new(store, Arc::new(launcher), &config));
        FailoverController::new(service, "prod", Duration::from_secs(5))
    }

    fn interruption_event(instance_id: &str) -> Value {
        json!({
            "version": "0",
            "source": "aws.ec2",
            "detail-type": "EC2 Spot Instance Interruption Warning",
            "region": "us-east-1",
            "resources": [format!("arn:aws:ec2:us-east-1a:123456789012:instance/{instance_id}")],
            "detail": {
                "instance-id": instance_id,
                "instance-action": "terminate"
            }
        })
    }

    #[tokio::test]
    async fn test_handle_event_launches() {
        let launcher = RecordingComputeLauncher::new();
        let controller = create_test_controller(launcher.clone(), true).await;

        let outcome = controller
            .handle_event(&interruption_event("i-0123"))
            .await
            .unwrap();

        assert_eq!(outcome.replacement().unwrap().instance_type, "m5.large");
        assert_eq!(launcher.launch_count().await, 1);
    }

    #[tokio::test]
    async fn test_handle_event_rejects_other_events() {
        let launcher = RecordingComputeLauncher::new();
        let controller = create_test_controller(launcher.clone(), true).await;

        let error = controller
            .handle_event(&json!({"source": "aws.autoscaling", "detail-type": "EC2 Instance Launch Successful"}))
            .await
            .unwrap_err();

        assert_eq!(error.error_code, "INVALID_REQUEST");
        assert_eq!(launcher.launch_count().await, 0);
    }

    #[tokio::test]
    async fn test_cold_start_error_response() {
        let controller = create_test_controller(RecordingComputeLauncher::new(), false).await;

        let error = controller
            .handle_event(&interruption_event("i-0123"))
            .await
            .unwrap_err();

        assert_eq!(error.error_code, "NO_RECOMMENDATION_AVAILABLE");
    }

    struct StalledLauncher;

    #[async_trait::async_trait]
    impl ComputeLaunchRepository for StalledLauncher {
        async fn launch_instance(&self, _request: &LaunchRequest) -> SpotterResult<String> {
            std::future::pending().await
        }

        async fn tag_instance(
            &self,
            _instance_id: &str,
            _tags: &BTreeMap<String, String>,
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

    #[tokio::test]
    async fn test_invocation_deadline_is_timeout() {
        let config = SpotterConfig::new(
            "prod",
            "lt-0abc",
            vec!["subnet-a".to_string()],
            vec![InstanceTypeCandidate::new("m5.large")],
        );
        let store = Arc::new(RecommendationStore::new(
            Arc::new(InMemoryRecommendationRepository::new()),
            Duration::from_secs(1),
        ));
        let candidate = PricedCandidate::from_prices("m5.large", 0.02, 0.12).unwrap();
        store
            .publish(
                "prod",
                &Recommendation::from_candidate(&candidate, "us-east-1", Utc::now()),
            )
            .await
            .unwrap();
        let service = Arc::new(FailoverService::new(store, Arc::new(StalledLauncher), &config));
        let controller = FailoverController::new(service, "prod", Duration::from_millis(50));

        let error = controller
            .handle_event(&interruption_event("i-0123"))
            .await
            .unwrap_err();

        assert_eq!(error.error_code, "TIMEOUT");
    }
}
