//! Status polling with exponential backoff
//!
//! Every long-running API operation (create, resize, upgrade, delete) is
//! followed by a wait on the resource's status. The waiter calls a single
//! refresh capability until the status lands in the target set, leaves the
//! pending set, or the timeout runs out.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Status token reported while a deleted resource still answers.
pub const STATUS_PRESENT: &str = "200";

/// Status token reported once the resource is gone.
pub const STATUS_GONE: &str = "404";

/// One refresh result: the observed object (if any) and its status token.
#[derive(Debug, Clone)]
pub struct Observation<T> {
    pub object: Option<T>,
    pub status: String,
}

impl<T> Observation<T> {
    pub fn new(object: T, status: impl Into<String>) -> Self {
        Self {
            object: Some(object),
            status: status.into(),
        }
    }

    pub fn without_object(status: impl Into<String>) -> Self {
        Self {
            object: None,
            status: status.into(),
        }
    }
}

/// A single refresh capability polled by [`StateWaiter`].
#[async_trait]
pub trait StateRefresh: Send + Sync {
    type Output: Send;
    type Error: From<CloudError> + Send;

    async fn refresh(&self) -> std::result::Result<Observation<Self::Output>, Self::Error>;
}

/// Turn the outcome of a plain GET into a delete-polling observation.
///
/// A successful read means the resource still exists; an API error is
/// reported by its HTTP status so that `404` reaches the target set. Errors
/// without an HTTP status are propagated.
pub fn deletion_observation<T>(result: Result<T>) -> Result<Observation<T>> {
    match result {
        Ok(object) => Ok(Observation::new(object, STATUS_PRESENT)),
        Err(err) => match err.status_code() {
            Some(status) => Ok(Observation::without_object(status.to_string())),
            None => Err(err),
        },
    }
}

/// Initial delay and interval floor for one kind of resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub delay: Duration,
    pub min_interval: Duration,
}

impl PollTiming {
    pub const fn new(delay: Duration, min_interval: Duration) -> Self {
        Self {
            delay,
            min_interval,
        }
    }

    /// No initial delay and no floor; only the backoff applies.
    pub const IMMEDIATE: PollTiming = PollTiming::new(Duration::ZERO, Duration::ZERO);
}

/// Poll settings for one wait
#[derive(Debug, Clone, PartialEq)]
pub struct StateWaiter {
    /// Resource identifier used in timeout and unexpected-state errors
    pub resource_id: String,
    pub pending: Vec<String>,
    pub target: Vec<String>,
    pub timeout: Duration,
    /// Sleep before the first refresh
    pub delay: Duration,
    /// Lower bound for the interval between refreshes
    pub min_interval: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl StateWaiter {
    pub fn new(
        resource_id: impl Into<String>,
        pending: &[&str],
        target: &[&str],
        timeout: Duration,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            timeout,
            delay: Duration::from_secs(10),
            min_interval: Duration::ZERO,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(10),
        }
    }

    /// Waiter for a delete: `"200"` while present, `"404"` once gone.
    pub fn for_deletion(resource_id: impl Into<String>, timeout: Duration) -> Self {
        Self::new(resource_id, &[STATUS_PRESENT], &[STATUS_GONE], timeout)
            .with_min_interval(Duration::from_secs(3))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_timing(self, timing: PollTiming) -> Self {
        self.with_delay(timing.delay)
            .with_min_interval(timing.min_interval)
    }

    /// Interval after the given (zero-based) refresh attempt.
    pub fn interval_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        let backoff = self
            .initial_interval
            .saturating_mul(factor)
            .min(self.max_interval);
        backoff.max(self.min_interval)
    }

    /// Poll until the status reaches the target set.
    ///
    /// Returns the last observed object, which is `None` for targets such as
    /// `"404"` where nothing is left to observe.
    pub async fn wait<R>(&self, refresher: &R) -> std::result::Result<Option<R::Output>, R::Error>
    where
        R: StateRefresh + ?Sized,
    {
        let deadline = Instant::now() + self.timeout;
        let mut last_status = String::new();
        let mut attempt: u32 = 0;

        tracing::debug!(
            resource = %self.resource_id,
            target = ?self.target,
            "Waiting for resource status"
        );

        if !self.delay.is_zero() {
            sleep(self.delay.min(self.timeout)).await;
        }

        loop {
            if Instant::now() >= deadline {
                return Err(CloudError::Timeout {
                    id: self.resource_id.clone(),
                    target: self.target_label(),
                    last_status,
                    timeout: self.timeout,
                }
                .into());
            }

            let observation = refresher.refresh().await?;
            last_status = observation.status;

            if self.target.contains(&last_status) {
                tracing::debug!(
                    resource = %self.resource_id,
                    status = %last_status,
                    attempts = attempt + 1,
                    "Resource reached target status"
                );
                return Ok(observation.object);
            }

            if !self.pending.contains(&last_status) {
                return Err(CloudError::UnexpectedState {
                    id: self.resource_id.clone(),
                    status: last_status,
                    target: self.target_label(),
                }
                .into());
            }

            let interval = self.interval_for_attempt(attempt);
            attempt = attempt.saturating_add(1);
            tracing::trace!(
                resource = %self.resource_id,
                status = %last_status,
                ?interval,
                "Resource still pending"
            );

            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(interval.min(remaining)).await;
        }
    }

    fn target_label(&self) -> String {
        self.target.join("|")
    }
}
