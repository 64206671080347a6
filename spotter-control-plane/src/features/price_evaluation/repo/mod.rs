pub mod cache;
pub mod http;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::shared::error::{SpotterError, SpotterResult};
use crate::shared::types::{OnDemandPrice, SpotPriceQuote};

/// Read-only market data. `Ok(None)` means the source has no price for the
/// type in that region; `Err` means the source itself failed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSourceRepository: Send + Sync {
    async fn spot_price(
        &self,
        instance_type: &str,
        region: &str,
    ) -> SpotterResult<Option<SpotPriceQuote>>;

    async fn on_demand_price(
        &self,
        instance_type: &str,
        region: &str,
    ) -> SpotterResult<Option<OnDemandPrice>>;
}

#[derive(Default)]
struct StaticPrices {
    spot: HashMap<String, SpotPriceQuote>,
    on_demand: HashMap<String, OnDemandPrice>,
    failing: HashSet<String>,
}

/// Fixed price table, region-agnostic. Used for dry runs and tests.
#[derive(Clone, Default)]
pub struct StaticPriceSource {
    prices: Arc<RwLock<StaticPrices>>,
    on_demand_calls: Arc<AtomicUsize>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spot and on-demand price for `instance_type`, spot observed now.
    pub fn with_prices(self, instance_type: &str, spot: f64, on_demand: f64) -> Self {
        self.set_spot(SpotPriceQuote::new(instance_type, spot, Utc::now()));
        self.set_on_demand(OnDemandPrice::new(instance_type, on_demand));
        self
    }

    pub fn set_spot(&self, quote: SpotPriceQuote) {
        let mut prices = self.prices.write().unwrap_or_else(|e| e.into_inner());
        prices.spot.insert(quote.instance_type.clone(), quote);
    }

    pub fn set_on_demand(&self, price: OnDemandPrice) {
        let mut prices = self.prices.write().unwrap_or_else(|e| e.into_inner());
        prices.on_demand.insert(price.instance_type.clone(), price);
    }

    pub fn remove_spot(&self, instance_type: &str) {
        let mut prices = self.prices.write().unwrap_or_else(|e| e.into_inner());
        prices.spot.remove(instance_type);
    }

    /// Make every lookup for `instance_type` fail as a source error.
    pub fn fail_for(&self, instance_type: &str) {
        let mut prices = self.prices.write().unwrap_or_else(|e| e.into_inner());
        prices.failing.insert(instance_type.to_string());
    }

    pub fn on_demand_calls(&self) -> usize {
        self.on_demand_calls.load(Ordering::SeqCst)
    }

    fn check_failing(prices: &StaticPrices, instance_type: &str) -> SpotterResult<()> {
        if prices.failing.contains(instance_type) {
            return Err(SpotterError::PriceUnavailable(format!(
                "price source error for {instance_type}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PriceSourceRepository for StaticPriceSource {
    async fn spot_price(
        &self,
        instance_type: &str,
        _region: &str,
    ) -> SpotterResult<Option<SpotPriceQuote>> {
        let prices = self.prices.read().unwrap_or_else(|e| e.into_inner());
        Self::check_failing(&prices, instance_type)?;
        Ok(prices.spot.get(instance_type).cloned())
    }

    async fn on_demand_price(
        &self,
        instance_type: &str,
        _region: &str,
    ) -> SpotterResult<Option<OnDemandPrice>> {
        self.on_demand_calls.fetch_add(1, Ordering::SeqCst);
        let prices = self.prices.read().unwrap_or_else(|e| e.into_inner());
        Self::check_failing(&prices, instance_type)?;
        Ok(prices.on_demand.get(instance_type).cloned())
    }
}
