//! Spotter control plane.
//!
//! Two independent actors share one durable recommendation:
//! - the price evaluator ([`features::price_evaluation`]) re-prices the
//!   candidate instance types on a fixed cadence and publishes the best one;
//! - the failover actor ([`features::failover`]) reacts to an interruption
//!   warning by launching one replacement of the recommended type.
//!
//! They never call each other; the [`features::recommendation_store`] is the
//! only thing they have in common.

pub mod features;
pub mod shared;
