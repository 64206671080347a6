use std::sync::Arc;
use std::time::Duration;

use spotter_core::ErrorResponse;
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::features::price_evaluation::service::PriceEvaluationService;
use crate::shared::bounded::bounded;
use crate::shared::error::SpotterError;
use crate::shared::types::EvaluationReport;

/// Entry point for timer-triggered evaluation cycles.
#[derive(Clone)]
pub struct PriceEvaluationController {
    service: Arc<PriceEvaluationService>,
    interval: Duration,
    deadline: Duration,
}

impl PriceEvaluationController {
    pub fn new(service: Arc<PriceEvaluationService>, interval: Duration, deadline: Duration) -> Self {
        Self {
            service,
            interval,
            deadline,
        }
    }

    /// One evaluation cycle under the invocation deadline.
    pub async fn run_cycle(&self) -> Result<EvaluationReport, ErrorResponse> {
        info!("Received evaluation trigger");

        let result = bounded(
            self.deadline,
            |limit| SpotterError::Timeout(format!("evaluation cycle exceeded {limit:?}")),
            self.service.evaluate(),
        )
        .await;

        match result {
            Ok(report) => {
                debug!(
                    cycle_id = %report.cycle_id,
                    priced = report.priced.len(),
                    skipped = report.skipped.len(),
                    "Evaluation cycle finished"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, code = e.error_code(), "Evaluation cycle failed");
                Err(e.into())
            }
        }
    }

    /// Re-run the cycle every `interval`. Overlapping cycles are not
    /// possible here: the next tick waits for the current cycle.
    pub fn spawn_periodic_evaluation(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = cadence(self.interval);
            loop {
                ticker.tick().await;

                // failures are already logged by run_cycle
                let _ = self.run_cycle().await;
            }
        })
    }
}

/// A cycle that overruns its slot pushes the next one back a full interval
/// instead of firing the missed ticks back to back.
fn cadence(period: Duration) -> Interval {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
