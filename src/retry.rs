use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::domain::{Accession, FetchOutcome};
use crate::error::{FailureKind, TransportError, is_server_error};
use crate::transport::Transport;

/// Bounded attempts with a fixed delay between retryable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts every request, the first one included. Zero is
    /// treated as one.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

/// Drives one identifier to a terminal outcome.
///
/// Network errors and 5xx responses are retried after `policy.backoff()`
/// until `policy.max_attempts()` requests have failed. Any other status fails
/// at once without sleeping. The cancellation token is consulted before each
/// retry; a cancelled fetch comes back as [`FetchOutcome::Interrupted`].
pub fn fetch_with_retry<T, K>(
    transport: &T,
    id: &Accession,
    policy: &RetryPolicy,
    clock: &K,
    cancel: &CancellationToken,
) -> FetchOutcome
where
    T: Transport + ?Sized,
    K: Clock + ?Sized,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let err = match transport.fetch_raw(id) {
            Ok(text) => {
                return FetchOutcome::Success {
                    id: id.clone(),
                    text,
                };
            }
            Err(TransportError::HttpStatus { status, message }) if !is_server_error(status) => {
                warn!(accession = %id, status, "permanent failure, not retrying");
                return FetchOutcome::Failure {
                    id: id.clone(),
                    kind: FailureKind::Permanent { status, message },
                };
            }
            Err(err) => err,
        };

        if attempt >= policy.max_attempts() {
            warn!(accession = %id, attempts = attempt, error = %err, "retries exhausted");
            return FetchOutcome::Failure {
                id: id.clone(),
                kind: FailureKind::Exhausted {
                    attempts: attempt,
                    last_error: err.to_string(),
                },
            };
        }

        if cancel.is_cancelled() {
            return FetchOutcome::Interrupted { id: id.clone() };
        }
        debug!(
            accession = %id,
            attempt,
            backoff_ms = policy.backoff().as_millis(),
            error = %err,
            "retrying"
        );
        clock.sleep(policy.backoff());
        if cancel.is_cancelled() {
            return FetchOutcome::Interrupted { id: id.clone() };
        }
    }
}
