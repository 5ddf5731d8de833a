//! Time utilities: sleeping, timeouts and monotonic instants.

pub use std::time::Duration;
pub use tokio::time::{error::Elapsed, interval, sleep, sleep_until, timeout, Instant, Interval};

/// Sleeps for `duration` unless `token` is cancelled first.
///
/// Returns `true` when the full duration elapsed and `false` when the sleep
/// was cut short by cancellation.
pub async fn sleep_or_cancel(duration: Duration, token: &crate::sync::CancellationToken) -> bool {
    if duration.is_zero() {
        return !token.is_cancelled();
    }
    tokio::select! {
        _ = token.cancelled() => false,
        _ = sleep(duration) => true,
    }
}
