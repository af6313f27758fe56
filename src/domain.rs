use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, SeqFetchError};

/// Accession token naming one record in the remote repository.
///
/// Opaque apart from what would break the `{base_url}/{id}.fasta` request
/// path: surrounding whitespace is trimmed, empty tokens and tokens with
/// inner whitespace or URL delimiters are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Accession(String);

impl Accession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = SeqFetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && !normalized
                .chars()
                .any(|ch| ch.is_whitespace() || matches!(ch, '/' | '?' | '#'));
        if !is_valid {
            return Err(SeqFetchError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for Accession {
    type Error = SeqFetchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Accession> for String {
    fn from(value: Accession) -> Self {
        value.0
    }
}

/// Parses a list of raw tokens, failing on the first invalid one.
pub fn parse_accessions<I, S>(values: I) -> Result<Vec<Accession>, SeqFetchError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|value| value.as_ref().parse())
        .collect()
}

/// Parses an id list file: one accession per line, blank lines and `#`
/// comments skipped.
pub fn parse_accession_lines(content: &str) -> Result<Vec<Accession>, SeqFetchError> {
    parse_accessions(
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#')),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedRecord {
    pub id: Accession,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub id: Accession,
    #[serde(flatten)]
    pub kind: FailureKind,
}

/// Terminal result of driving one identifier through the retrying fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success { id: Accession, text: String },
    Failure { id: Accession, kind: FailureKind },
    /// Cancellation was observed before a terminal outcome was reached.
    Interrupted { id: Accession },
}

/// Outcomes of one sequential runner, in traversal order.
///
/// Every submitted id lands in exactly one of the three lists. `pending` is
/// only non-empty when the run was cancelled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub successes: Vec<FetchedRecord>,
    pub failures: Vec<FetchFailure>,
    pub pending: Vec<Accession>,
    pub cancelled: bool,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Contiguous slice of a job's input handed to exactly one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub index: usize,
    pub start: usize,
    pub ids: &'a [Accession],
}

/// Merged outcome of a whole job, concatenated in chunk order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobResult {
    pub successes: Vec<FetchedRecord>,
    pub failures: Vec<FetchFailure>,
    pub pending: Vec<Accession>,
    pub cancelled: bool,
    pub workers: usize,
    /// Output file written for this job, if saving was requested.
    pub output_path: Option<String>,
}

impl JobResult {
    pub(crate) fn from_batch(batch: BatchResult, workers: usize) -> Self {
        Self {
            successes: batch.successes,
            failures: batch.failures,
            pending: batch.pending,
            cancelled: batch.cancelled,
            workers,
            output_path: None,
        }
    }

    pub(crate) fn absorb(&mut self, batch: BatchResult) {
        self.successes.extend(batch.successes);
        self.failures.extend(batch.failures);
        self.pending.extend(batch.pending);
        self.cancelled |= batch.cancelled;
    }

    pub fn failed_ids(&self) -> Vec<&Accession> {
        self.failures.iter().map(|failure| &failure.id).collect()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.successes
            .iter()
            .map(|record| record.text.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
