pub mod adapters;
pub mod bounded;
pub mod error;
pub mod types;
