// ABOUTME: Polls a resource status until it reaches a target state
// ABOUTME: Exponential backoff between polls, bounded by an overall timeout

use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Result};
use thiserror::Error;
use tokio::time::Instant;

use crate::provider::{ProviderError, ProviderResult};

/// Status RDS reports for a usable instance or a completed snapshot
pub const AVAILABLE: &str = "available";

/// Statuses from which a resource never becomes available
pub const TERMINAL_STATUSES: &[&str] = &[
    "deleted",
    "deleting",
    "failed",
    "incompatible-restore",
    "incompatible-parameters",
    "incompatible-network",
    "storage-full",
];

/// How long and how often to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub max_poll_interval: Duration,
}

impl WaitConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
    pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

    pub fn new(
        timeout: Duration,
        poll_interval: Duration,
        max_poll_interval: Duration,
    ) -> Result<Self> {
        if timeout.is_zero() {
            bail!("Wait timeout must be greater than zero");
        }
        if poll_interval.is_zero() {
            bail!("Poll interval must be greater than zero");
        }
        if max_poll_interval < poll_interval {
            bail!(
                "Maximum poll interval ({:?}) must not be shorter than the poll interval ({:?})",
                max_poll_interval,
                poll_interval
            );
        }
        Ok(Self {
            timeout,
            poll_interval,
            max_poll_interval,
        })
    }

    /// Default intervals with the given timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            max_poll_interval: Self::DEFAULT_MAX_POLL_INTERVAL,
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_poll_interval)
    }
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error(
        "timed out after {elapsed:?} waiting for {resource} to become '{target}' (last status: {})",
        .last_status.as_deref().unwrap_or("not found")
    )]
    Timeout {
        resource: String,
        target: String,
        elapsed: Duration,
        last_status: Option<String>,
    },
    #[error("{resource} entered status '{status}' while waiting for '{target}'")]
    TerminalStatus {
        resource: String,
        target: String,
        status: String,
    },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Poll `status` until it returns `target`
///
/// The first poll happens immediately. Between polls the delay starts at
/// `poll_interval` and doubles up to `max_poll_interval`; the last sleep is
/// shortened so one final poll lands on the deadline. A `None` status means
/// the resource is not visible yet and keeps the wait going. A status in
/// [`TERMINAL_STATUSES`] or any provider error ends the wait immediately.
pub async fn wait_for_status<F, Fut>(
    resource: &str,
    target: &str,
    config: &WaitConfig,
    mut status: F,
) -> Result<(), WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<Option<String>>>,
{
    let started = Instant::now();
    let mut delay = config.poll_interval;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let current = status().await?;

        match current.as_deref() {
            Some(s) if s == target => {
                tracing::info!(
                    "{} is '{}' after {:?} ({} polls)",
                    resource,
                    target,
                    started.elapsed(),
                    attempt
                );
                return Ok(());
            }
            Some(s) if TERMINAL_STATUSES.contains(&s) => {
                return Err(WaitError::TerminalStatus {
                    resource: resource.to_string(),
                    target: target.to_string(),
                    status: s.to_string(),
                });
            }
            Some(s) => tracing::debug!("Poll {}: {} is '{}'", attempt, resource, s),
            None => tracing::debug!("Poll {}: {} not visible yet", attempt, resource),
        }

        let elapsed = started.elapsed();
        if elapsed >= config.timeout {
            return Err(WaitError::Timeout {
                resource: resource.to_string(),
                target: target.to_string(),
                elapsed,
                last_status: current,
            });
        }

        tokio::time::sleep(delay.min(config.timeout - elapsed)).await;
        delay = config.next_delay(delay);
    }
}
