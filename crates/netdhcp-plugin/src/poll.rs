//! Poll-until helper for "wait until X exists or the deadline dies".

use std::future::Future;
use std::time::Duration;

/// Interval between poll attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polls `f` until it produces a value or fails.
///
/// `Ok(None)` means "not yet" and schedules another attempt after
/// `interval`; `Err` aborts immediately. The caller bounds the whole wait
/// with `tokio::time::timeout`.
///
/// # Errors
///
/// Propagates the first error `f` returns.
pub async fn await_result<T, E, F, Fut>(interval: Duration, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    loop {
        if let Some(value) = f().await? {
            return Ok(value);
        }
        tokio::time::sleep(interval).await;
    }
}
