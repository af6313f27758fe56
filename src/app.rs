use std::time::Duration;

use camino::Utf8PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::ResolvedConfig;
use crate::domain::{Accession, FetchOutcome, JobResult};
use crate::error::SeqFetchError;
use crate::pool::run_parallel;
use crate::retry::{RetryPolicy, fetch_with_retry};
use crate::runner::run_sequential;
use crate::sink::{RecordSink, with_sink};
use crate::transport::{Connector, HttpConnector};

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Maximum attempts per accession.
    pub retries: u32,
    pub save: bool,
    pub save_dir: Utf8PathBuf,
}

impl From<&ResolvedConfig> for FetchOptions {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            retries: config.retries,
            save: config.save,
            save_dir: config.save_dir.clone(),
        }
    }
}

/// Library entry points: single, sequential and parallel retrieval.
pub struct App<C: Connector, K: Clock = SystemClock> {
    connector: C,
    clock: K,
    backoff: Duration,
}

impl App<HttpConnector, SystemClock> {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(
            HttpConnector::new(config.base_url.clone(), config.timeout),
            SystemClock,
            config.backoff,
        )
    }
}

impl<C: Connector, K: Clock> App<C, K> {
    pub fn new(connector: C, clock: K, backoff: Duration) -> Self {
        Self {
            connector,
            clock,
            backoff,
        }
    }

    fn policy(&self, retries: u32) -> RetryPolicy {
        RetryPolicy::new(retries, self.backoff)
    }

    /// Fetches a single record. `Ok(None)` means the record could not be
    /// retrieved; only a failure to set up the connection is an error.
    pub fn fetch_one(
        &self,
        id: &Accession,
        retries: u32,
    ) -> Result<Option<String>, SeqFetchError> {
        let transport = self.connector.connect()?;
        let outcome = fetch_with_retry(
            &transport,
            id,
            &self.policy(retries),
            &self.clock,
            &CancellationToken::new(),
        );
        Ok(match outcome {
            FetchOutcome::Success { text, .. } => Some(text),
            FetchOutcome::Failure { .. } | FetchOutcome::Interrupted { .. } => None,
        })
    }

    /// Fetches `ids` in order over one connection. With `options.save` each
    /// record is appended to the dated output file as soon as it arrives.
    pub fn fetch_many_sequential(
        &self,
        ids: &[Accession],
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<JobResult, SeqFetchError> {
        info!(accessions = ids.len(), save = options.save, "starting sequential fetch");
        let transport = self.connector.connect()?;
        let policy = self.policy(options.retries);

        let job = if options.save {
            let mut opened = false;
            let (batch, path) = with_sink(&options.save_dir, &self.clock, |sink| {
                opened = true;
                let sink: &mut dyn RecordSink = sink;
                run_sequential(ids, &transport, &policy, &self.clock, cancel, Some(sink))
            })
            .map_err(|err| if opened { err } else { err.with_unattempted(ids) })?;
            let mut job = JobResult::from_batch(batch, 1);
            job.output_path = Some(path.to_string());
            job
        } else {
            let batch = run_sequential(ids, &transport, &policy, &self.clock, cancel, None)?;
            JobResult::from_batch(batch, 1)
        };

        info!(
            fetched = job.successes.len(),
            failed = job.failures.len(),
            pending = job.pending.len(),
            cancelled = job.cancelled,
            "sequential fetch finished"
        );
        Ok(job)
    }

    /// Fetches `ids` across up to `worker_count` threads. With
    /// `options.save` the merged result is written once at the end.
    pub fn fetch_many_parallel(
        &self,
        ids: &[Accession],
        worker_count: usize,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<JobResult, SeqFetchError> {
        run_parallel(
            ids,
            worker_count,
            &self.connector,
            &self.policy(options.retries),
            &self.clock,
            cancel,
            options.save.then_some(options.save_dir.as_path()),
        )
    }
}
