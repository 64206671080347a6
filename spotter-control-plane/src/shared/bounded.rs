use crate::shared::error::{SpotterError, SpotterResult};
use std::future::Future;
use std::time::Duration;

/// Run `call` with an upper bound. An elapsed call becomes the error built by
/// `on_elapsed`, so a timed-out store read surfaces as a store failure, a
/// timed-out launch as a launch failure and so on. The future is dropped on
/// expiry; nothing it had in flight is committed by us afterwards.
pub async fn bounded<T, F, E>(limit: Duration, on_elapsed: E, call: F) -> SpotterResult<T>
where
    F: Future<Output = SpotterResult<T>>,
    E: FnOnce(Duration) -> SpotterError,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(on_elapsed(limit)),
    }
}
