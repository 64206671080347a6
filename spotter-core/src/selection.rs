//! Spot price selection.
//!
//! Given priced candidates, pick the one with the highest savings that still
//! clears the configured threshold. Ties on savings go to the
//! lexicographically smallest instance type so the result never depends on
//! the order in which prices arrived.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Savings are compared at this many decimal places.
const SAVINGS_PRECISION: f64 = 1_000_000.0;

/// Relative discount of `spot` against `on_demand`, in percent.
///
/// Returns `None` when either price is not a positive finite number.
pub fn savings_percent(on_demand: f64, spot: f64) -> Option<f64> {
    if !on_demand.is_finite() || !spot.is_finite() || on_demand <= 0.0 || spot <= 0.0 {
        return None;
    }

    let raw = (on_demand - spot) / on_demand * 100.0;
    Some((raw * SAVINGS_PRECISION).round() / SAVINGS_PRECISION)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedCandidate {
    pub instance_type: String,
    pub spot_price: f64,
    pub on_demand_price: f64,
    pub savings_percent: f64,
}

impl PricedCandidate {
    pub fn from_prices(
        instance_type: impl Into<String>,
        spot_price: f64,
        on_demand_price: f64,
    ) -> Option<Self> {
        let savings_percent = savings_percent(on_demand_price, spot_price)?;
        Some(Self {
            instance_type: instance_type.into(),
            spot_price,
            on_demand_price,
            savings_percent,
        })
    }

    pub fn qualifies(&self, min_savings_percent: f64) -> bool {
        self.savings_percent >= min_savings_percent
    }
}

fn preference(a: &PricedCandidate, b: &PricedCandidate) -> Ordering {
    b.savings_percent
        .total_cmp(&a.savings_percent)
        .then_with(|| a.instance_type.cmp(&b.instance_type))
}

/// Best qualifying candidate, or `None` when nothing clears `min_savings_percent`.
pub fn select_best(
    candidates: &[PricedCandidate],
    min_savings_percent: f64,
) -> Option<&PricedCandidate> {
    candidates
        .iter()
        .filter(|candidate| candidate.qualifies(min_savings_percent))
        .min_by(|a, b| preference(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priced(instance_type: &str, spot: f64, on_demand: f64) -> PricedCandidate {
        PricedCandidate::from_prices(instance_type, spot, on_demand).unwrap()
    }

    #[test]
    fn test_savings_percent_basic() {
        assert_eq!(savings_percent(0.05, 0.01), Some(80.0));
        assert_eq!(savings_percent(0.12, 0.02), Some(83.333333));
        assert_eq!(savings_percent(1.0, 1.0), Some(0.0));
    }

    #[test]
    fn test_savings_percent_negative_when_spot_is_dearer() {
        assert_eq!(savings_percent(0.10, 0.15), Some(-50.0));
    }

    #[test]
    fn test_savings_percent_rejects_unusable_prices() {
        assert_eq!(savings_percent(0.0, 0.01), None);
        assert_eq!(savings_percent(-1.0, 0.01), None);
        assert_eq!(savings_percent(0.05, 0.0), None);
        assert_eq!(savings_percent(f64::NAN, 0.01), None);
        assert_eq!(savings_percent(0.05, f64::INFINITY), None);
    }

    #[test]
    fn test_highest_savings_wins() {
        let candidates = vec![
            priced("t3.medium", 0.01, 0.05),
            priced("m5.large", 0.02, 0.12),
        ];

        let best = select_best(&candidates, 80.0).unwrap();
        assert_eq!(best.instance_type, "m5.large");
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let candidates = vec![priced("t3.medium", 0.01, 0.05)];
        let best = select_best(&candidates, 80.0).unwrap();
        assert_eq!(best.instance_type, "t3.medium");
    }

    #[test]
    fn test_nothing_qualifies_above_threshold() {
        let candidates = vec![
            priced("t3.medium", 0.01, 0.05),
            priced("m5.large", 0.02, 0.12),
        ];

        assert!(select_best(&candidates, 85.0).is_none());
    }

    #[test]
    fn test_exact_tie_prefers_smallest_identifier() {
        let candidates = vec![
            priced("m5.large", 0.02, 0.10),
            priced("c5.large", 0.02, 0.10),
            priced("r5.large", 0.02, 0.10),
        ];

        let best = select_best(&candidates, 50.0).unwrap();
        assert_eq!(best.instance_type, "c5.large");
    }

    #[test]
    fn test_empty_candidate_set() {
        assert!(select_best(&[], 0.0).is_none());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn candidate_strategy() -> impl Strategy<Value = PricedCandidate> {
            ("[a-z][0-9][a-z]?\\.(nano|micro|small|medium|large|xlarge)", 1u32..10_000, 1u32..10_000)
                .prop_map(|(instance_type, spot_millis, on_demand_millis)| {
                    PricedCandidate::from_prices(
                        instance_type,
                        spot_millis as f64 / 1000.0,
                        on_demand_millis as f64 / 1000.0,
                    )
                    .unwrap()
                })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn property_selection_is_maximal(
                candidates in prop::collection::vec(candidate_strategy(), 0..30),
                min_savings in 0u8..=100,
            ) {
                let min_savings = min_savings as f64;
                match select_best(&candidates, min_savings) {
                    Some(best) => {
                        prop_assert!(best.qualifies(min_savings));
                        for other in candidates.iter().filter(|c| c.qualifies(min_savings)) {
                            prop_assert!(other.savings_percent <= best.savings_percent);
                            if other.savings_percent == best.savings_percent {
                                prop_assert!(best.instance_type <= other.instance_type);
                            }
                        }
                    }
                    None => {
                        prop_assert!(candidates.iter().all(|c| !c.qualifies(min_savings)));
                    }
                }
            }

            #[test]
            fn property_selection_ignores_input_order(
                candidates in prop::collection::vec(candidate_strategy(), 0..30),
                min_savings in 0u8..=100,
            ) {
                let min_savings = min_savings as f64;
                let mut reversed = candidates.clone();
                reversed.reverse();

                let forward = select_best(&candidates, min_savings).map(|c| c.instance_type.clone());
                let backward = select_best(&reversed, min_savings).map(|c| c.instance_type.clone());
                prop_assert_eq!(forward, backward);
            }
        }
    }
}
