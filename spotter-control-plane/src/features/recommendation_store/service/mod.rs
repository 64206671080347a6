use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::features::recommendation_store::repo::{recommendation_key, RecommendationRepository};
use crate::shared::bounded::bounded;
use crate::shared::error::{SpotterError, SpotterResult};
use crate::shared::types::Recommendation;

/// Client for the recommendation store shared by both actors.
///
/// Every repository failure, including a timed-out call, surfaces as
/// `StoreUnavailable`.
pub struct RecommendationStore {
    repo: Arc<dyn RecommendationRepository>,
    call_timeout: Duration,
}

impl RecommendationStore {
    pub fn new(repo: Arc<dyn RecommendationRepository>, call_timeout: Duration) -> Self {
        Self { repo, call_timeout }
    }

    fn key_for(cluster: &str) -> SpotterResult<String> {
        if cluster.is_empty() || cluster.contains('/') {
            return Err(SpotterError::InvalidRequest(format!(
                "invalid cluster name for recommendation key: '{cluster}'"
            )));
        }
        Ok(recommendation_key(cluster))
    }

    /// Overwrite the cluster's recommendation.
    pub async fn publish(&self, cluster: &str, recommendation: &Recommendation) -> SpotterResult<()> {
        let key = Self::key_for(cluster)?;

        bounded(
            self.call_timeout,
            |limit| SpotterError::StoreUnavailable(format!("write to {key} exceeded {limit:?}")),
            self.repo.put(&key, recommendation),
        )
        .await
        .map_err(into_store_error)?;

        info!(
            %key,
            instance_type = %recommendation.instance_type,
            savings_percent = recommendation.savings_percent,
            "Recommendation published"
        );
        Ok(())
    }

    /// The cluster's current recommendation, `None` if nothing was ever published.
    pub async fn current(&self, cluster: &str) -> SpotterResult<Option<Recommendation>> {
        let key = Self::key_for(cluster)?;

        let current = bounded(
            self.call_timeout,
            |limit| SpotterError::StoreUnavailable(format!("read of {key} exceeded {limit:?}")),
            self.repo.get(&key),
        )
        .await
        .map_err(into_store_error)?;

        debug!(%key, found = current.is_some(), "Recommendation lookup");
        Ok(current)
    }
}

fn into_store_error(err: SpotterError) -> SpotterError {
    match err {
        SpotterError::StoreUnavailable(_) | SpotterError::InvalidRequest(_) => err,
        other => SpotterError::StoreUnavailable(other.to_string()),
    }
}
