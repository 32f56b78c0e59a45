//! Caller-side retry policies for `FLOOD_WAIT`.
//!
//! Timeouts, cancellations and disconnects are never retried here; the
//! dispatcher already resends what the server asked it to.

use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::time::Duration;

use tracing::info;

use crate::errors::InvocationError;

/// Decides whether a failed call is tried again, and after how long.
pub trait RetryPolicy: Send + Sync + 'static {
    fn should_retry(&self, ctx: &RetryContext) -> ControlFlow<(), Duration>;
}

/// What [`RetryPolicy::should_retry`] gets to look at.
#[derive(Debug)]
pub struct RetryContext {
    pub fail_count: NonZeroU32,
    pub slept_so_far: Duration,
    pub error: InvocationError,
}

/// Never retry.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRetries;

impl RetryPolicy for NoRetries {
    fn should_retry(&self, _: &RetryContext) -> ControlFlow<(), Duration> {
        ControlFlow::Break(())
    }
}

/// Sleep through `FLOOD_WAIT` once, if the wait is below `threshold`.
#[derive(Clone, Debug)]
pub struct AutoSleep {
    pub threshold: Duration,
}

impl Default for AutoSleep {
    fn default() -> Self {
        Self { threshold: Duration::from_secs(60) }
    }
}

impl RetryPolicy for AutoSleep {
    fn should_retry(&self, ctx: &RetryContext) -> ControlFlow<(), Duration> {
        match ctx.error.flood_wait_seconds() {
            Some(secs) if ctx.fail_count.get() == 1 && secs <= self.threshold.as_secs() => {
                info!("[strata] FLOOD_WAIT_{secs}, sleeping before retry");
                ControlFlow::Continue(Duration::from_secs(secs))
            }
            _ => ControlFlow::Break(()),
        }
    }
}
