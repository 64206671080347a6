use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::features::failover::repo::ComputeLaunchRepository;
use crate::shared::error::{SpotterError, SpotterResult};
use crate::shared::types::LaunchRequest;

#[derive(Debug, Deserialize)]
struct LaunchResponse {
    instance_id: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    tags: HashMap<String, String>,
}

/// Compute launch API over JSON/HTTP.
///
/// - `POST {base}/v1/instances` with a [`LaunchRequest`] body → `{"instance_id"}`
/// - `POST {base}/v1/instances/{id}/tags` with `{"tags": {..}}`
/// - `GET {base}/v1/instances/{id}/tags` → `{"tags": {..}}`, 404 if unknown
pub struct ReqwestComputeLauncher {
    client: Client,
    base_url: Url,
}

impl ReqwestComputeLauncher {
    pub fn new(base_url: &str, request_timeout: Duration) -> SpotterResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            SpotterError::ValidationError(format!("invalid compute API URL {base_url}: {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(SpotterError::ValidationError(format!(
                "compute API URL {base_url} cannot carry a path"
            )));
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                SpotterError::ValidationError(format!("failed to build compute client: {e}"))
            })?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path);
        }
        url
    }

    fn instances_url(&self) -> Url {
        self.endpoint(&["v1", "instances"])
    }

    fn tags_url(&self, instance_id: &str) -> Url {
        self.endpoint(&["v1", "instances", instance_id, "tags"])
    }
}

fn launch_error(context: &str, err: impl std::fmt::Display) -> SpotterError {
    SpotterError::LaunchFailed(format!("{context}: {err}"))
}

#[async_trait]
impl ComputeLaunchRepository for ReqwestComputeLauncher {
    async fn launch_instance(&self, request: &LaunchRequest) -> SpotterResult<String> {
        let response = self
            .client
            .post(self.instances_url())
            .json(request)
            .send()
            .await
            .map_err(|e| launch_error("launch request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpotterError::LaunchFailed(format!(
                "compute API answered {status}: {body}"
            )));
        }

        let launched: LaunchResponse = response
            .json()
            .await
            .map_err(|e| launch_error("unreadable launch response", e))?;
        Ok(launched.instance_id)
    }

    async fn tag_instance(
        &self,
        instance_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> SpotterResult<()> {
        let response = self
            .client
            .post(self.tags_url(instance_id))
            .json(&serde_json::json!({ "tags": tags }))
            .send()
            .await
            .map_err(|e| launch_error("tag request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpotterError::LaunchFailed(format!(
                "tagging {instance_id} answered {status}"
            )));
        }
        Ok(())
    }

    async fn instance_tags(
        &self,
        instance_id: &str,
    ) -> SpotterResult<Option<HashMap<String, String>>> {
        let response = self
            .client
            .get(self.tags_url(instance_id))
            .send()
            .await
            .map_err(|e| launch_error("tag lookup failed", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: TagsResponse = response
                    .json()
                    .await
                    .map_err(|e| launch_error("unreadable tag response", e))?;
                Ok(Some(body.tags))
            }
            status => Err(SpotterError::LaunchFailed(format!(
                "tag lookup for {instance_id} answered {status}"
            ))),
        }
    }
}
