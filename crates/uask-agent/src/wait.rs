//! Condition polling with a deadline.

use crate::driver::PageDriver;
use crate::probe::Probe;
use crate::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Polling schedule: starts at `interval`, doubles up to `max_interval`.
#[derive(Debug, Clone, Copy)]
pub struct Poll {
    pub timeout: Duration,
    pub interval: Duration,
    pub max_interval: Duration,
}

impl Poll {
    /// Backoff from 100ms up to 500ms.
    pub fn within(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(500),
        }
    }

    /// Constant interval.
    pub fn every(interval: Duration, timeout: Duration) -> Self {
        Self {
            timeout,
            interval,
            max_interval: interval,
        }
    }

    /// Call `check` until it yields `Some`, or the timeout passes.
    ///
    /// `check` always runs at least once, and once more right at the
    /// deadline, so a zero timeout still observes the current state.
    pub async fn until<T, F, Fut>(self, mut check: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut interval = self.interval.max(Duration::from_millis(1));
        loop {
            if let Some(v) = check().await? {
                return Ok(Some(v));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
            interval = (interval * 2).min(self.max_interval.max(interval));
        }
    }
}

/// First probe in `candidates` that is visible, polled until `timeout`.
///
/// Candidates whose lookup fails (unsupported selector, detached frame) are
/// treated as absent.
pub async fn first_visible<'a, D: PageDriver + ?Sized>(
    driver: &D,
    candidates: &'a [Probe],
    timeout: Duration,
) -> Result<Option<(&'a Probe, bool)>> {
    Poll::within(timeout)
        .until(|| async move {
            for probe in candidates {
                match driver.probe(probe).await {
                    Ok(state) if state.visible => return Ok(Some((probe, state.editable))),
                    Ok(_) => {}
                    Err(e) => tracing::debug!("probe {} failed: {}", probe, e),
                }
            }
            Ok(None)
        })
        .await
}

/// Wait for a probe to become visible.
pub async fn visible<D: PageDriver + ?Sized>(
    driver: &D,
    probe: &Probe,
    timeout: Duration,
) -> Result<bool> {
    let hit = Poll::within(timeout)
        .until(|| async move { Ok(driver.probe(probe).await?.visible.then_some(())) })
        .await?;
    Ok(hit.is_some())
}

/// Wait for a probe to stop being visible.
pub async fn hidden<D: PageDriver + ?Sized>(
    driver: &D,
    probe: &Probe,
    timeout: Duration,
) -> Result<bool> {
    let hit = Poll::within(timeout)
        .until(|| async move { Ok((!driver.probe(probe).await?.visible).then_some(())) })
        .await?;
    Ok(hit.is_some())
}
