//! Polling waits.

use crate::errors::GateError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polls `condition` every `poll` until it yields `true` or `timeout` elapses.
///
/// The condition is always evaluated at least once, and once more at the
/// deadline, so a zero timeout still gives it a single chance.
pub async fn wait_until<F, Fut>(
    what: &str,
    mut condition: F,
    timeout: Duration,
    poll: Duration,
) -> Result<(), GateError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = Instant::now();
    let deadline = started + timeout;
    let poll = poll.max(Duration::from_millis(1));
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if condition().await {
            debug!(target: "action-gate", what, attempts, "condition met");
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(GateError::Timeout {
                what: what.to_string(),
                waited_ms: started.elapsed().as_millis() as u64,
            });
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}
