use std::io::{self, Write};

use serde::Serialize;

use crate::domain::{Accession, JobResult};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

/// Compact view of a job for machine consumers; record bodies are left out.
#[derive(Debug, Serialize)]
pub struct JobReport<'a> {
    pub fetched: Vec<&'a str>,
    pub failed: &'a [crate::domain::FetchFailure],
    pub pending: &'a [Accession],
    pub cancelled: bool,
    pub workers: usize,
    pub output_path: Option<&'a str>,
}

impl<'a> From<&'a JobResult> for JobReport<'a> {
    fn from(job: &'a JobResult) -> Self {
        Self {
            fetched: job
                .successes
                .iter()
                .map(|record| record.id.as_str())
                .collect(),
            failed: &job.failures,
            pending: &job.pending,
            cancelled: job.cancelled,
            workers: job.workers,
            output_path: job.output_path.as_deref(),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_job(job: &JobResult) -> io::Result<()> {
        Self::print_json(&JobReport::from(job))
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub fn print_summary(job: &JobResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}KIRA-SEQFETCH summary ({} worker(s)){reset}", job.workers);
    println!("{green}fetched: {}{reset}", job.successes.len());
    let failure_color = if job.failures.is_empty() { green } else { red };
    println!("{failure_color}failed: {}{reset}", job.failures.len());
    for failure in &job.failures {
        println!("{red}  {} ({}){reset}", failure.id, failure.kind);
    }
    if job.cancelled {
        println!(
            "{yellow}cancelled, {} accession(s) not fetched{reset}",
            job.pending.len()
        );
    }
    if let Some(path) = &job.output_path {
        println!("{cyan}output: {path}{reset}");
    }
}

/// Names the accessions a fatal error left without an outcome.
pub fn unattempted_notice(ids: &[Accession]) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    let list = ids
        .iter()
        .map(Accession::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("{} accession(s) not fetched: {list}", ids.len()))
}
