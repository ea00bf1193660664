//! Polling until a promoted registry tag becomes visible.
//!
//! The backoff schedule and the overall bound are configurable, with
//! environment overrides for CI tuning.

use crate::EnvConfig;
use crate::error::{CliError, RegistryError, ReleaseError, Result};
use crate::registry::{TagStore, find_tag};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::cancellable;

/// Configuration for the post-promotion visibility poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitConfig {
    /// Give up after this long
    pub timeout: Duration,
    /// Pause after the first unsuccessful poll
    pub initial_backoff: Duration,
    /// Upper bound for a single pause
    pub max_backoff: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl WaitConfig {
    /// Parse a duration in seconds from the environment, clamped to `max`
    fn parse_secs_env(env: &EnvConfig, var_name: &str, default: u64, max: u64) -> Duration {
        let secs = env
            .get(var_name)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(|v| v.min(max))
            .unwrap_or(default);
        Duration::from_secs(secs)
    }

    /// Create config from environment variables with fallback to defaults
    pub fn from_env(env: &EnvConfig) -> Self {
        Self {
            timeout: Self::parse_secs_env(env, "KODEGEN_WAIT_TIMEOUT_SECS", 600, 7200),
            initial_backoff: Self::parse_secs_env(env, "KODEGEN_WAIT_INITIAL_BACKOFF_SECS", 5, 300),
            max_backoff: Self::parse_secs_env(env, "KODEGEN_WAIT_MAX_BACKOFF_SECS", 60, 600),
        }
    }

    /// Validate the schedule is usable
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(invalid("wait timeout must be greater than zero"));
        }
        if self.initial_backoff.is_zero() {
            return Err(invalid("initial wait backoff must be greater than zero"));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(invalid("initial wait backoff exceeds maximum backoff"));
        }
        Ok(())
    }

    /// Pause before poll number `attempt + 1`: doubles from the initial backoff
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

fn invalid(reason: &str) -> ReleaseError {
    CliError::InvalidArguments {
        reason: reason.to_string(),
    }
    .into()
}

fn timed_out(repository: &str, tag: &str, digest: &str, start: Instant) -> ReleaseError {
    RegistryError::TimeoutWaiting {
        repository: repository.to_string(),
        tag: tag.to_string(),
        digest: digest.to_string(),
        waited: start.elapsed(),
    }
    .into()
}

/// Poll `repository` until `tag` points at `digest`.
///
/// Returns the number of polls made. Transport errors end the wait
/// immediately; only "not visible yet" is retried. A poll still in flight
/// when the timeout expires is abandoned.
pub async fn wait_until_visible<T: TagStore>(
    tags: &T,
    repository: &str,
    tag: &str,
    digest: &str,
    config: &WaitConfig,
    cancel: &CancellationToken,
) -> Result<u32> {
    let start = Instant::now();
    let deadline = start + config.timeout;
    let phase = format!("wait for {}:{}", repository, tag);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let poll_budget = deadline.saturating_duration_since(Instant::now());
        let poll = tokio::time::timeout(poll_budget, tags.list_tags(repository));
        let listed = match cancellable(cancel, &phase, async { Ok(poll.await) }).await? {
            Ok(listed) => listed?,
            Err(_) => {
                log::warn!("{}:{} poll {} outlived the wait timeout", repository, tag, attempts);
                return Err(timed_out(repository, tag, digest, start));
            }
        };
        if find_tag(&listed, tag).is_some_and(|t| t.manifest_digest == digest) {
            log::info!(
                "{}:{} visible at {} after {} poll(s)",
                repository,
                tag,
                digest,
                attempts
            );
            return Ok(attempts);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out(repository, tag, digest, start));
        }

        let pause = config.backoff(attempts).min(remaining);
        log::info!(
            "{}:{} not visible yet (poll {}), retrying in {:.1}s",
            repository,
            tag,
            attempts,
            pause.as_secs_f64()
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ReleaseError::Cancelled { phase });
            }
            _ = tokio::time::sleep(pause) => {}
        }
    }
}
