//! Waiting on a human at the terminal.

use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::Instant;
use tracing::{info, warn};

/// Why [`wait_for_enter`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The operator pressed Enter.
    Enter,
    /// `wait` ran out. Also the outcome when input is closed or unreadable.
    Elapsed,
}

/// Block until a line arrives on `input` or `wait` runs out.
///
/// Closed input (EOF) never cuts the wait short.
pub async fn wait_for_enter<R>(mut input: R, wait: Duration) -> Release
where
    R: AsyncBufRead + Unpin,
{
    let deadline = Instant::now() + wait;
    let mut line = String::new();
    match tokio::time::timeout_at(deadline, input.read_line(&mut line)).await {
        Ok(Ok(n)) if n > 0 => return Release::Enter,
        Ok(Ok(_)) => info!("input closed; waiting out the remaining time"),
        Ok(Err(e)) => warn!("input unavailable ({}); waiting out the remaining time", e),
        Err(_) => return Release::Elapsed,
    }
    tokio::time::sleep_until(deadline).await;
    Release::Elapsed
}
