//! Chooses the collaborators behind each repository trait for the `spotter`
//! binary. Real adapters are required unless dry-run was asked for
//! explicitly; a dry run swaps in the in-process stand-ins.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::features::failover::repo::http::ReqwestComputeLauncher;
use crate::features::failover::repo::{ComputeLaunchRepository, RecordingComputeLauncher};
use crate::features::price_evaluation::repo::cache::CachedOnDemandPrices;
use crate::features::price_evaluation::repo::http::ReqwestPriceSource;
use crate::features::price_evaluation::repo::{PriceSourceRepository, StaticPriceSource};
use crate::features::recommendation_store::repo::etcd::{connect_etcd_store, EtcdConfig};
use crate::features::recommendation_store::repo::file::FileRecommendationRepository;
use crate::features::recommendation_store::repo::{
    InMemoryRecommendationRepository, RecommendationRepository,
};
use crate::shared::error::{SpotterError, SpotterResult};
use crate::shared::types::SpotterConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterSettings {
    pub dry_run: bool,
    pub use_etcd: bool,
    pub etcd: Option<EtcdConfig>,
    pub store_dir: Option<PathBuf>,
    pub price_api_url: Option<String>,
    pub compute_api_url: Option<String>,
}

impl AdapterSettings {
    pub fn from_env(dry_run: bool) -> Self {
        Self::from_lookup(dry_run, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(dry_run: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            dry_run,
            use_etcd: lookup("USE_ETCD").as_deref() == Some("true"),
            etcd: EtcdConfig::from_lookup(&lookup),
            store_dir: non_empty("SPOTTER_STORE_DIR").map(PathBuf::from),
            price_api_url: non_empty("PRICE_API_URL"),
            compute_api_url: non_empty("COMPUTE_API_URL"),
        }
    }
}

/// The shared recommendation store. etcd wins when `USE_ETCD=true`, then the
/// file store under `SPOTTER_STORE_DIR`. Without either only a dry run may
/// proceed, on a store that dies with the process.
pub async fn recommendation_repository(
    settings: &AdapterSettings,
) -> SpotterResult<Arc<dyn RecommendationRepository>> {
    if settings.use_etcd {
        let etcd = settings.etcd.as_ref().ok_or_else(|| {
            SpotterError::StoreUnavailable(
                "USE_ETCD is true but ETCD_ENDPOINTS is not configured".to_string(),
            )
        })?;
        info!(endpoints = ?etcd.endpoints, "Using etcd recommendation store");
        return connect_etcd_store(etcd).await;
    }

    if let Some(dir) = &settings.store_dir {
        info!(dir = %dir.display(), "Using file recommendation store");
        let repo = FileRecommendationRepository::open(dir.clone()).await?;
        return Ok(Arc::new(repo));
    }

    if settings.dry_run {
        warn!("Dry run: recommendations are kept in memory and do not outlive this process");
        return Ok(Arc::new(InMemoryRecommendationRepository::new()));
    }

    Err(SpotterError::StoreUnavailable(
        "no durable recommendation store configured; set SPOTTER_STORE_DIR, or USE_ETCD=true with ETCD_ENDPOINTS, or pass --dry-run".to_string(),
    ))
}

/// The price source for evaluation, with on-demand prices cached.
pub fn price_source(
    settings: &AdapterSettings,
    config: &SpotterConfig,
) -> SpotterResult<Arc<dyn PriceSourceRepository>> {
    let source: Arc<dyn PriceSourceRepository> = match &settings.price_api_url {
        Some(url) => {
            info!(%url, "Using HTTP price source");
            Arc::new(ReqwestPriceSource::new(url, config.call_timeout())?)
        }
        None if settings.dry_run => {
            warn!("Dry run: PRICE_API_URL is not set; no prices will be available");
            Arc::new(StaticPriceSource::new())
        }
        None => {
            return Err(SpotterError::ValidationError(
                "PRICE_API_URL is required to evaluate prices".to_string(),
            ))
        }
    };

    Ok(Arc::new(CachedOnDemandPrices::new(
        source,
        config.on_demand_cache_ttl(),
    )))
}

/// The compute launch API for failover.
pub fn compute_launcher(
    settings: &AdapterSettings,
    config: &SpotterConfig,
) -> SpotterResult<Arc<dyn ComputeLaunchRepository>> {
    match &settings.compute_api_url {
        Some(url) => {
            info!(%url, "Using HTTP compute launch API");
            Ok(Arc::new(ReqwestComputeLauncher::new(url, config.call_timeout())?))
        }
        None if settings.dry_run => {
            warn!("Dry run: launches are recorded but not performed");
            Ok(Arc::new(RecordingComputeLauncher::new()))
        }
        None => Err(SpotterError::ValidationError(
            "COMPUTE_API_URL is required to launch replacements".to_string(),
        )),
    }
}
