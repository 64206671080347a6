use crate::features::recommendation_store::service::RecommendationStore;
use crate::shared::types::Recommendation;
use spotter_core::ErrorResponse;
use std::sync::Arc;
use tracing::info;

/// Read-only view of the store for operators.
pub struct RecommendationController {
    store: Arc<RecommendationStore>,
    cluster: String,
}

impl RecommendationController {
    pub fn new(store: Arc<RecommendationStore>, cluster: impl Into<String>) -> Self {
        Self {
            store,
            cluster: cluster.into(),
        }
    }

    pub async fn current(&self) -> Result<Option<Recommendation>, ErrorResponse> {
        info!(cluster = %self.cluster, "Received recommendation query");

        self.store.current(&self.cluster).await.map_err(|e| e.into())
    }
}
