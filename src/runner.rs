use std::sync::atomic::{AtomicUsize, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::domain::{Accession, BatchResult, FetchFailure, FetchOutcome, FetchedRecord};
use crate::error::SeqFetchError;
use crate::retry::{RetryPolicy, fetch_with_retry};
use crate::sink::RecordSink;
use crate::transport::Transport;

/// Fetches `ids` one after another over a single connection context.
///
/// Per-identifier failures are collected, never returned as errors. With a
/// sink, each success is written before the next id is attempted; a sink
/// error aborts the run and reports the ids left untouched. When `cancel`
/// fires, the id in flight and all later ids are reported as pending.
pub fn run_sequential<T, K>(
    ids: &[Accession],
    transport: &T,
    policy: &RetryPolicy,
    clock: &K,
    cancel: &CancellationToken,
    sink: Option<&mut dyn RecordSink>,
) -> Result<BatchResult, SeqFetchError>
where
    T: Transport + ?Sized,
    K: Clock + ?Sized,
{
    run_tracked(ids, transport, policy, clock, cancel, sink, None)
}

/// [`run_sequential`] that also publishes the position of the id in flight,
/// so a supervisor can tell how far the run got if it never returns.
pub(crate) fn run_tracked<T, K>(
    ids: &[Accession],
    transport: &T,
    policy: &RetryPolicy,
    clock: &K,
    cancel: &CancellationToken,
    mut sink: Option<&mut dyn RecordSink>,
    progress: Option<&AtomicUsize>,
) -> Result<BatchResult, SeqFetchError>
where
    T: Transport + ?Sized,
    K: Clock + ?Sized,
{
    let mut result = BatchResult::default();

    for (position, id) in ids.iter().enumerate() {
        if let Some(progress) = progress {
            progress.store(position, Ordering::SeqCst);
        }
        if cancel.is_cancelled() {
            result.pending.extend_from_slice(&ids[position..]);
            result.cancelled = true;
            break;
        }

        match fetch_with_retry(transport, id, policy, clock, cancel) {
            FetchOutcome::Success { id, text } => {
                if let Some(sink) = sink.as_deref_mut() {
                    sink.write_record(&id, &text)
                        .map_err(|err| err.with_unattempted(&ids[position + 1..]))?;
                }
                debug!(accession = %id, bytes = text.len(), "fetched");
                result.successes.push(FetchedRecord { id, text });
            }
            FetchOutcome::Failure { id, kind } => {
                result.failures.push(FetchFailure { id, kind });
            }
            FetchOutcome::Interrupted { .. } => {
                result.pending.extend_from_slice(&ids[position..]);
                result.cancelled = true;
                break;
            }
        }
    }

    if result.cancelled {
        info!(
            fetched = result.successes.len(),
            failed = result.failures.len(),
            pending = result.pending.len(),
            "batch cancelled"
        );
    }
    Ok(result)
}
