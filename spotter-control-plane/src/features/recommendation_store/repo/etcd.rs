use std::sync::Arc;

use crate::features::recommendation_store::repo::RecommendationRepository;
use crate::shared::error::{SpotterError, SpotterResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtcdConfig {
    pub endpoints: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl EtcdConfig {
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoints_raw = lookup("ETCD_ENDPOINTS")?;
        let endpoints: Vec<String> = endpoints_raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();

        if endpoints.is_empty() {
            return None;
        }

        Some(Self {
            endpoints,
            username: lookup("ETCD_USERNAME"),
            password: lookup("ETCD_PASSWORD"),
        })
    }
}

#[cfg(feature = "etcd")]
pub use client::EtcdRecommendationRepository;

#[cfg(feature = "etcd")]
mod client {
    use async_trait::async_trait;
    use etcd_client::{Client, ConnectOptions, KvClient};

    use super::EtcdConfig;
    use crate::features::recommendation_store::repo::{
        is_recommendation_key, RecommendationRepository,
    };
    use crate::shared::error::{SpotterError, SpotterResult};
    use crate::shared::types::Recommendation;

    /// Recommendation store backed by single-key etcd put/get. The value is
    /// the recommendation's JSON encoding; etcd applies each put atomically.
    #[derive(Clone)]
    pub struct EtcdRecommendationRepository {
        kv: KvClient,
    }

    impl EtcdRecommendationRepository {
        pub async fn connect(config: &EtcdConfig) -> SpotterResult<Self> {
            let options = match (&config.username, &config.password) {
                (Some(user), Some(password)) => {
                    Some(ConnectOptions::new().with_user(user.clone(), password.clone()))
                }
                _ => None,
            };

            let client = Client::connect(config.endpoints.clone(), options)
                .await
                .map_err(|e| SpotterError::StoreUnavailable(format!("etcd connect: {e}")))?;

            Ok(Self {
                kv: client.kv_client(),
            })
        }
    }

    #[async_trait]
    impl RecommendationRepository for EtcdRecommendationRepository {
        async fn put(&self, key: &str, recommendation: &Recommendation) -> SpotterResult<()> {
            if !is_recommendation_key(key) {
                return Err(SpotterError::InvalidRequest(format!(
                    "disallowed etcd key: {key}"
                )));
            }

            let value = recommendation
                .to_json()
                .map_err(|e| SpotterError::StoreUnavailable(e.to_string()))?;

            let mut kv = self.kv.clone();
            kv.put(key, value, None)
                .await
                .map(|_| ())
                .map_err(|e| SpotterError::StoreUnavailable(format!("etcd put {key}: {e}")))
        }

        async fn get(&self, key: &str) -> SpotterResult<Option<Recommendation>> {
            let mut kv = self.kv.clone();
            let response = kv
                .get(key, None)
                .await
                .map_err(|e| SpotterError::StoreUnavailable(format!("etcd get {key}: {e}")))?;

            let Some(entry) = response.kvs().first() else {
                return Ok(None);
            };

            let raw = entry.value_str().map_err(|e| {
                SpotterError::StoreUnavailable(format!("value at {key} is not utf-8: {e}"))
            })?;

            Recommendation::from_json(raw).map(Some).map_err(|e| {
                SpotterError::StoreUnavailable(format!("value at {key} is unreadable: {e}"))
            })
        }
    }
}

/// Connect the etcd-backed store, or report why it cannot be used.
#[cfg(feature = "etcd")]
pub async fn connect_etcd_store(
    config: &EtcdConfig,
) -> SpotterResult<Arc<dyn RecommendationRepository>> {
    let repo = EtcdRecommendationRepository::connect(config).await?;
    Ok(Arc::new(repo))
}

#[cfg(not(feature = "etcd"))]
pub async fn connect_etcd_store(
    _config: &EtcdConfig,
) -> SpotterResult<Arc<dyn RecommendationRepository>> {
    Err(SpotterError::StoreUnavailable(
        "etcd feature is not enabled".to_string(),
    ))
}
