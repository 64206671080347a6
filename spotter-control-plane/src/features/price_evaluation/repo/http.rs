use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::features::price_evaluation::repo::PriceSourceRepository;
use crate::shared::error::{SpotterError, SpotterResult};
use crate::shared::types::{OnDemandPrice, SpotPriceQuote};

/// Price source backed by a JSON pricing endpoint.
///
/// `GET {base}/v1/spot-prices/{region}/{type}` answers with a
/// [`SpotPriceQuote`] body and `GET {base}/v1/on-demand-prices/{region}/{type}`
/// with an [`OnDemandPrice`]. A 404 means the type is not priced there.
pub struct ReqwestPriceSource {
    client: Client,
    base_url: Url,
}

impl ReqwestPriceSource {
    pub fn new(base_url: &str, request_timeout: Duration) -> SpotterResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            SpotterError::ValidationError(format!("invalid price API URL {base_url}: {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(SpotterError::ValidationError(format!(
                "price API URL {base_url} cannot carry a path"
            )));
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                SpotterError::ValidationError(format!("failed to build price client: {e}"))
            })?;

        Ok(Self { client, base_url })
    }

    /// Each segment is percent-encoded, so a `/` in a name stays inside it.
    fn url(&self, kind: &str, instance_type: &str, region: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v1", kind, region, instance_type]);
        }
        url
    }

    async fn fetch<T: DeserializeOwned>(&self, url: Url) -> SpotterResult<Option<T>> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            SpotterError::PriceUnavailable(format!("price request to {url} failed: {e}"))
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response.json::<T>().await.map(Some).map_err(|e| {
                SpotterError::PriceUnavailable(format!("unreadable price body from {url}: {e}"))
            }),
            status => Err(SpotterError::PriceUnavailable(format!(
                "price source answered {status} for {url}"
            ))),
        }
    }
}

#[async_trait]
impl PriceSourceRepository for ReqwestPriceSource {
    async fn spot_price(
        &self,
        instance_type: &str,
        region: &str,
    ) -> SpotterResult<Option<SpotPriceQuote>> {
        self.fetch(self.url("spot-prices", instance_type, region)).await
    }

    async fn on_demand_price(
        &self,
        instance_type: &str,
        region: &str,
    ) -> SpotterResult<Option<OnDemandPrice>> {
        self.fetch(self.url("on-demand-prices", instance_type, region)).await
    }
}
