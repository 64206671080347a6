use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::features::price_evaluation::repo::PriceSourceRepository;
use crate::shared::error::SpotterResult;
use crate::shared::types::{OnDemandPrice, SpotPriceQuote};

/// Keeps on-demand prices for `ttl`; they change rarely. Spot prices always
/// go to the inner source. Misses and errors are not cached.
pub struct CachedOnDemandPrices {
    inner: Arc<dyn PriceSourceRepository>,
    ttl: Duration,
    entries: RwLock<HashMap<(String, String), (OnDemandPrice, Instant)>>,
}

impl CachedOnDemandPrices {
    pub fn new(inner: Arc<dyn PriceSourceRepository>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn cached(&self, key: &(String, String)) -> Option<OnDemandPrice> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(_, stored_at)| stored_at.elapsed() < self.ttl)
            .map(|(price, _)| price.clone())
    }
}

#[async_trait]
impl PriceSourceRepository for CachedOnDemandPrices {
    async fn spot_price(
        &self,
        instance_type: &str,
        region: &str,
    ) -> SpotterResult<Option<SpotPriceQuote>> {
        self.inner.spot_price(instance_type, region).await
    }

    async fn on_demand_price(
        &self,
        instance_type: &str,
        region: &str,
    ) -> SpotterResult<Option<OnDemandPrice>> {
        let key = (region.to_string(), instance_type.to_string());
        if let Some(price) = self.cached(&key).await {
            debug!(instance_type, region, "On-demand price served from cache");
            return Ok(Some(price));
        }

        let fetched = self.inner.on_demand_price(instance_type, region).await?;
        if let Some(price) = &fetched {
            let mut entries = self.entries.write().await;
            entries.insert(key, (price.clone(), Instant::now()));
        }
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::price_evaluation::repo::StaticPriceSource;

    #[tokio::test]
    async fn test_second_lookup_hits_cache() {
        let source = StaticPriceSource::new().with_prices("m5.large", 0.02, 0.12);
        let cached = CachedOnDemandPrices::new(Arc::new(source.clone()), Duration::from_secs(60));

        for _ in 0..3 {
            let price = cached.on_demand_price("m5.large", "us-east-1").await.unwrap();
            assert_eq!(price.unwrap().price, 0.12);
        }
        assert_eq!(source.on_demand_calls(), 1);
    }

    #[tokio::test]
    async fn test_regions_cached_separately() {
        let source = StaticPriceSource::new().with_prices("m5.large", 0.02, 0.12);
        let cached = CachedOnDemandPrices::new(Arc::new(source.clone()), Duration::from_secs(60));

        cached.on_demand_price("m5.large", "us-east-1").await.unwrap();
        cached.on_demand_price("m5.large", "eu-west-1").await.unwrap();
        assert_eq!(source.on_demand_calls(), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let source = StaticPriceSource::new().with_prices("m5.large", 0.02, 0.12);
        let cached = CachedOnDemandPrices::new(Arc::new(source.clone()), Duration::ZERO);

        cached.on_demand_price("m5.large", "us-east-1").await.unwrap();
        cached.on_demand_price("m5.large", "us-east-1").await.unwrap();
        assert_eq!(source.on_demand_calls(), 2);
    }

    #[tokio::test]
    async fn test_miss_is_not_cached() {
        let source = StaticPriceSource::new();
        let cached = CachedOnDemandPrices::new(Arc::new(source.clone()), Duration::from_secs(60));

        assert!(cached
            .on_demand_price("m5.large", "us-east-1")
            .await
            .unwrap()
            .is_none());

        source.set_on_demand(OnDemandPrice::new("m5.large", 0.12));
        assert!(cached
            .on_demand_price("m5.large", "us-east-1")
            .await
            .unwrap()
            .is_some());
    }
}
