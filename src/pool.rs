use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use camino::Utf8Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::domain::{Accession, BatchResult, Chunk, JobResult};
use crate::error::SeqFetchError;
use crate::retry::RetryPolicy;
use crate::runner::run_tracked;
use crate::sink::write_bulk;
use crate::transport::Connector;

/// Splits `ids` into contiguous, non-empty chunks of `ceil(n / workers)`
/// where `workers = min(worker_count, n)`, at least one.
///
/// Concatenating the chunks in index order gives back `ids` exactly.
pub fn partition(ids: &[Accession], worker_count: usize) -> Vec<Chunk<'_>> {
    if ids.is_empty() {
        return Vec::new();
    }
    let workers = worker_count.clamp(1, ids.len());
    let chunk_size = ids.len().div_ceil(workers);
    ids.chunks(chunk_size)
        .enumerate()
        .map(|(index, slice)| Chunk {
            index,
            start: index * chunk_size,
            ids: slice,
        })
        .collect()
}

/// Cancels the job-wide abort token if the worker thread unwinds.
struct AbortOnPanic<'a>(&'a CancellationToken);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.cancel();
        }
    }
}

fn run_chunk<C, K>(
    chunk: Chunk<'_>,
    connector: &C,
    policy: &RetryPolicy,
    clock: &K,
    abort: &CancellationToken,
    progress: &AtomicUsize,
) -> Result<BatchResult, SeqFetchError>
where
    C: Connector + ?Sized,
    K: Clock + ?Sized,
{
    let _guard = AbortOnPanic(abort);
    let transport = connector.connect().map_err(|err| {
        abort.cancel();
        SeqFetchError::WorkerFault {
            chunk: chunk.index,
            reason: format!("could not open connection: {err}"),
            unattempted: chunk.ids.to_vec(),
        }
    })?;
    let start = Instant::now();
    let batch = run_tracked(chunk.ids, &transport, policy, clock, abort, None, Some(progress))?;
    debug!(
        chunk = chunk.index,
        start = chunk.start,
        len = chunk.ids.len(),
        fetched = batch.successes.len(),
        failed = batch.failures.len(),
        elapsed_ms = start.elapsed().as_millis(),
        "chunk completed"
    );
    Ok(batch)
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("worker panicked: {message}")
    } else {
        "worker panicked".to_string()
    }
}

/// Joined chunk outcomes in chunk order, or the first failure. A failure's
/// `unattempted` list gathers every id the job never produced an outcome
/// for: pending ids of the chunks that were stopped and the untouched tail
/// of every faulted chunk.
fn settle(
    outcomes: Vec<Result<BatchResult, SeqFetchError>>,
) -> Result<Vec<BatchResult>, SeqFetchError> {
    let mut batches = Vec::with_capacity(outcomes.len());
    let mut unattempted = Vec::new();
    let mut fault = None;
    for outcome in outcomes {
        match outcome {
            Ok(batch) => {
                unattempted.extend_from_slice(&batch.pending);
                batches.push(batch);
            }
            Err(err) => {
                unattempted.extend_from_slice(err.unattempted());
                fault.get_or_insert(err);
            }
        }
    }
    match fault {
        Some(err) => {
            let err = err.with_unattempted(&unattempted);
            warn!(error = %err, unattempted = unattempted.len(), "parallel fetch aborted");
            Err(err)
        }
        None => Ok(batches),
    }
}

/// Fetches `ids` on a fixed set of worker threads, one chunk per worker,
/// each with its own connection from `connector`.
///
/// Results are merged in chunk order, so the lists match what
/// [`run_sequential`](crate::runner::run_sequential) yields for the same
/// input regardless of which worker finishes first. Workers never see the output directory; when `save_dir`
/// is given the merged successes are written once after every worker has
/// been joined. A worker that panics or cannot connect fails the whole job
/// with [`SeqFetchError::WorkerFault`] after the remaining workers have been
/// told to stop; the error lists every id the job never produced an outcome
/// for, starting at the id a panicking worker was on.
pub fn run_parallel<C, K>(
    ids: &[Accession],
    worker_count: usize,
    connector: &C,
    policy: &RetryPolicy,
    clock: &K,
    cancel: &CancellationToken,
    save_dir: Option<&Utf8Path>,
) -> Result<JobResult, SeqFetchError>
where
    C: Connector + ?Sized,
    K: Clock + ?Sized,
{
    let chunks = partition(ids, worker_count);
    let workers = chunks.len();
    info!(
        accessions = ids.len(),
        requested_workers = worker_count,
        workers,
        "starting parallel fetch"
    );
    let abort = cancel.child_token();
    let progress: Vec<AtomicUsize> = chunks.iter().map(|_| AtomicUsize::new(0)).collect();
    let started = Instant::now();

    let outcomes: Vec<Result<BatchResult, SeqFetchError>> = thread::scope(|scope| {
        let handles = chunks
            .iter()
            .zip(&progress)
            .map(|(chunk, progress)| {
                let chunk = *chunk;
                let abort = &abort;
                (
                    chunk,
                    progress,
                    scope.spawn(move || {
                        run_chunk(chunk, connector, policy, clock, abort, progress)
                    }),
                )
            })
            .collect::<Vec<_>>();

        handles
            .into_iter()
            .map(|(chunk, progress, handle)| match handle.join() {
                Ok(outcome) => outcome,
                Err(payload) => Err(SeqFetchError::WorkerFault {
                    chunk: chunk.index,
                    reason: panic_reason(payload.as_ref()),
                    unattempted: chunk.ids[progress.load(Ordering::SeqCst)..].to_vec(),
                }),
            })
            .collect()
    });

    let mut job = JobResult {
        workers,
        ..JobResult::default()
    };
    for batch in settle(outcomes)? {
        job.absorb(batch);
    }

    info!(
        fetched = job.successes.len(),
        failed = job.failures.len(),
        pending = job.pending.len(),
        cancelled = job.cancelled,
        elapsed_ms = started.elapsed().as_millis(),
        "parallel fetch finished"
    );

    if let Some(dir) = save_dir {
        let path = write_bulk(dir, clock, &job.successes)?;
        job.output_path = Some(path.to_string());
    }
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Accession> {
        (0..n)
            .map(|i| format!("P{i:05}").parse().unwrap())
            .collect()
    }

    #[test]
    fn chunks_are_contiguous_and_cover_input() {
        let input = ids(10);
        let chunks = partition(&input, 3);
        let sizes: Vec<usize> = chunks.iter().map(|chunk| chunk.ids.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(
            chunks.iter().map(|chunk| chunk.start).collect::<Vec<_>>(),
            vec![0, 4, 8]
        );
        let rebuilt: Vec<Accession> = chunks
            .iter()
            .flat_map(|chunk| chunk.ids.iter().cloned())
            .collect();
        assert_eq!(rebuilt, input);
    }

    #[test]
    fn more_workers_than_ids_gives_one_id_per_chunk() {
        let input = ids(3);
        let chunks = partition(&input, 8);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.ids.len() == 1));
    }

    #[test]
    fn zero_workers_means_one_chunk() {
        let input = ids(4);
        let chunks = partition(&input, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ids.len(), 4);
    }

    #[test]
    fn empty_input_has_no_chunks() {
        assert!(partition(&[], 4).is_empty());
    }

    #[test]
    fn chunk_count_can_undershoot_workers() {
        let input = ids(5);
        let chunks = partition(&input, 4);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| !chunk.ids.is_empty()));
    }

    #[test]
    fn panic_payloads_are_described() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_reason(payload.as_ref()), "worker panicked: boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bad"));
        assert_eq!(panic_reason(payload.as_ref()), "worker panicked: bad");
    }
}
