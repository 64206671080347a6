pub mod failover;
pub mod price_evaluation;
pub mod recommendation_store;
