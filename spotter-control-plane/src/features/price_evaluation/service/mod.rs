use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::features::price_evaluation::repo::PriceSourceRepository;
use crate::features::recommendation_store::service::RecommendationStore;
use crate::shared::bounded::bounded;
use crate::shared::error::{SpotterError, SpotterResult};
use crate::shared::types::{
    EvaluationOutcome, EvaluationReport, InstanceTypeCandidate, PricedCandidate, Recommendation,
    SkipReason, SkippedCandidate, SpotterConfig,
};
use spotter_core::select_best;

enum CandidatePricing {
    Priced(PricedCandidate),
    Skipped(SkippedCandidate),
}

/// The PriceEvaluator: one `evaluate` call is one evaluation cycle.
pub struct PriceEvaluationService {
    prices: Arc<dyn PriceSourceRepository>,
    store: Arc<RecommendationStore>,
    cluster: String,
    region: String,
    candidates: Vec<InstanceTypeCandidate>,
    min_savings_percent: f64,
    spot_price_max_age: chrono::Duration,
    call_timeout: Duration,
}

impl PriceEvaluationService {
    pub fn new(
        prices: Arc<dyn PriceSourceRepository>,
        store: Arc<RecommendationStore>,
        config: &SpotterConfig,
    ) -> Self {
        Self {
            prices,
            store,
            cluster: config.cluster_name.clone(),
            region: config.region.clone(),
            candidates: config.candidates.clone(),
            min_savings_percent: f64::from(config.min_savings_percent),
            spot_price_max_age: config.spot_price_max_age(),
            call_timeout: config.call_timeout(),
        }
    }

    /// Price every candidate, pick the best qualifying one and publish it.
    ///
    /// Per-candidate price failures only drop that candidate. A cycle with no
    /// qualifying candidate, or in which the price source failed for every
    /// candidate, writes nothing. The only errors returned come from the
    /// store write.
    pub async fn evaluate(&self) -> SpotterResult<EvaluationReport> {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!(
            %cycle_id,
            cluster = %self.cluster,
            region = %self.region,
            candidates = self.candidates.len(),
            min_savings_percent = self.min_savings_percent,
            "Starting price evaluation"
        );

        let (mut priced, mut skipped) = self.price_candidates(started_at).await;
        priced.sort_by(|a, b| a.instance_type.cmp(&b.instance_type));
        skipped.sort_by(|a, b| a.instance_type.cmp(&b.instance_type));

        let source_down = priced.is_empty()
            && !skipped.is_empty()
            && skipped.iter().all(|candidate| candidate.source_error);

        let outcome = if source_down {
            warn!(%cycle_id, "Price source failed for every candidate, keeping previous recommendation");
            EvaluationOutcome::Unchanged {
                reason: SkipReason::PriceSourceUnavailable,
            }
        } else {
            match select_best(&priced, self.min_savings_percent) {
                Some(best) => {
                    let recommendation =
                        Recommendation::from_candidate(best, self.region.clone(), Utc::now());
                    self.store.publish(&self.cluster, &recommendation).await?;

                    info!(
                        %cycle_id,
                        instance_type = %recommendation.instance_type,
                        savings_percent = recommendation.savings_percent,
                        "New recommendation selected"
                    );
                    EvaluationOutcome::Published { recommendation }
                }
                None => {
                    let err = SpotterError::NoQualifyingCandidate(format!(
                        "{} priced, none at or above {}%",
                        priced.len(),
                        self.min_savings_percent
                    ));
                    warn!(%cycle_id, error = %err, "Keeping previous recommendation");
                    EvaluationOutcome::Unchanged {
                        reason: SkipReason::NoQualifyingCandidate,
                    }
                }
            }
        };

        Ok(EvaluationReport {
            cycle_id,
            started_at,
            min_savings_percent: self.min_savings_percent,
            priced,
            skipped,
            outcome,
        })
    }

    async fn price_candidates(
        &self,
        now: DateTime<Utc>,
    ) -> (Vec<PricedCandidate>, Vec<SkippedCandidate>) {
        let mut tasks = JoinSet::new();
        for candidate in &self.candidates {
            let prices = self.prices.clone();
            let instance_type = candidate.instance_type.clone();
            let region = self.region.clone();
            let call_timeout = self.call_timeout;
            let max_age = self.spot_price_max_age;

            tasks.spawn(async move {
                price_candidate(prices, instance_type, region, call_timeout, max_age, now).await
            });
        }

        let mut priced = Vec::new();
        let mut skipped = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(CandidatePricing::Priced(candidate)) => priced.push(candidate),
                Ok(CandidatePricing::Skipped(candidate)) => {
                    warn!(
                        instance_type = %candidate.instance_type,
                        reason = %candidate.reason,
                        "Skipping candidate"
                    );
                    skipped.push(candidate)
                }
                Err(e) => warn!(error = %e, "Candidate pricing task aborted"),
            }
        }

        (priced, skipped)
    }
}

fn price_timeout(what: &'static str, instance_type: &str) -> impl FnOnce(Duration) -> SpotterError {
    let instance_type = instance_type.to_string();
    move |limit| {
        SpotterError::PriceUnavailable(format!(
            "{what} price for {instance_type} exceeded {limit:?}"
        ))
    }
}

async fn price_candidate(
    prices: Arc<dyn PriceSourceRepository>,
    instance_type: String,
    region: String,
    call_timeout: Duration,
    max_age: chrono::Duration,
    now: DateTime<Utc>,
) -> CandidatePricing {
    let (spot, on_demand) = tokio::join!(
        bounded(
            call_timeout,
            price_timeout("spot", &instance_type),
            prices.spot_price(&instance_type, &region),
        ),
        bounded(
            call_timeout,
            price_timeout("on-demand", &instance_type),
            prices.on_demand_price(&instance_type, &region),
        ),
    );

    let skip = |reason: String, source_error: bool| {
        CandidatePricing::Skipped(SkippedCandidate {
            instance_type: instance_type.clone(),
            reason,
            source_error,
        })
    };

    let (spot, on_demand) = match (spot, on_demand) {
        (Err(e), _) | (_, Err(e)) => return skip(e.to_string(), true),
        (Ok(None), _) => return skip("no spot price available".to_string(), false),
        (_, Ok(None)) => return skip("no on-demand price available".to_string(), false),
        (Ok(Some(spot)), Ok(Some(on_demand))) => (spot, on_demand),
    };

    if !spot.is_fresh(now, max_age) {
        return skip(
            format!("spot price observed at {} is stale", spot.observed_at),
            false,
        );
    }

    match PricedCandidate::from_prices(instance_type.clone(), spot.price, on_demand.price) {
        Some(candidate) => {
            debug!(
                instance_type = %candidate.instance_type,
                spot_price = candidate.spot_price,
                on_demand_price = candidate.on_demand_price,
                savings_percent = candidate.savings_percent,
                "Candidate priced"
            );
            CandidatePricing::Priced(candidate)
        }
        None => skip(
            format!(
                "malformed prices: spot {} on-demand {}",
                spot.price, on_demand.price
            ),
            false,
        ),
    }
}
