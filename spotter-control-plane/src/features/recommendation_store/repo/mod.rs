pub mod etcd;
pub mod file;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::shared::error::SpotterResult;
use crate::shared::types::Recommendation;

pub const RECOMMENDATION_KEY_PREFIX: &str = "/spotter/recommendation/";

pub fn recommendation_key(cluster: &str) -> String {
    format!("{RECOMMENDATION_KEY_PREFIX}{cluster}")
}

pub fn is_recommendation_key(key: &str) -> bool {
    key.strip_prefix(RECOMMENDATION_KEY_PREFIX)
        .is_some_and(|cluster| !cluster.is_empty() && !cluster.contains('/'))
}

/// Single-key durable store for the current recommendation.
///
/// `put` is an atomic overwrite and `get` observes the last committed value;
/// readers never see a partially written recommendation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecommendationRepository: Send + Sync {
    async fn put(&self, key: &str, recommendation: &Recommendation) -> SpotterResult<()>;
    async fn get(&self, key: &str) -> SpotterResult<Option<Recommendation>>;
}

#[derive(Clone, Default)]
pub struct InMemoryRecommendationRepository {
    storage: Arc<RwLock<HashMap<String, Recommendation>>>,
}

impl InMemoryRecommendationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn keys(&self) -> Vec<String> {
        let storage = self.storage.read().await;
        storage.keys().cloned().collect()
    }
}

#[async_trait]
impl RecommendationRepository for InMemoryRecommendationRepository {
    async fn put(&self, key: &str, recommendation: &Recommendation) -> SpotterResult<()> {
        let mut storage = self.storage.write().await;
        storage.insert(key.to_string(), recommendation.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> SpotterResult<Option<Recommendation>> {
        let storage = self.storage.read().await;
        Ok(storage.get(key).cloned())
    }
}
