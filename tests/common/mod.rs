#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use kira_seqfetch::clock::Clock;
use kira_seqfetch::domain::Accession;
use kira_seqfetch::error::{SeqFetchError, TransportError};
use kira_seqfetch::transport::{Connector, Transport};

#[derive(Debug, Clone, Copy)]
pub enum Step {
    Ok,
    Network,
    Status(u16),
}

pub fn record_text(id: &str) -> String {
    format!(">sp|{id}|TEST_HUMAN Test protein\nMKVLAAGIVGLLLA\n")
}

#[derive(Default)]
struct Shared {
    scripts: HashMap<String, Vec<Step>>,
    attempts: Mutex<HashMap<String, usize>>,
    connects: AtomicUsize,
    panic_on: Option<String>,
    cancel_on: Option<(String, CancellationToken)>,
    refuse_connect: Option<usize>,
    on_fetch: Vec<(String, FetchHook)>,
    log: Mutex<Vec<String>>,
}

type FetchHook = Arc<dyn Fn() + Send + Sync>;

/// Deterministic stand-in for the remote repository.
///
/// Each accession follows its script one step per attempt; the last step
/// repeats once the script runs out, and unscripted accessions always
/// succeed. Every connection shares the same script state.
#[derive(Clone, Default)]
pub struct MockConnector {
    shared: Arc<Shared>,
}

impl MockConnector {
    pub fn new(scripts: &[(&str, &[Step])]) -> Self {
        Self::builder(scripts).build()
    }

    pub fn builder(scripts: &[(&str, &[Step])]) -> MockConnectorBuilder {
        MockConnectorBuilder {
            shared: Shared {
                scripts: scripts
                    .iter()
                    .map(|(id, steps)| (id.to_string(), steps.to_vec()))
                    .collect(),
                ..Shared::default()
            },
        }
    }

    pub fn attempts(&self, id: &str) -> usize {
        self.shared
            .attempts
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_attempts(&self) -> usize {
        self.shared.attempts.lock().unwrap().values().sum()
    }

    /// Every attempted accession, in the order the attempts happened.
    pub fn fetch_log(&self) -> Vec<String> {
        self.shared.log.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }
}

pub struct MockConnectorBuilder {
    shared: Shared,
}

impl MockConnectorBuilder {
    pub fn panic_on(mut self, id: &str) -> Self {
        self.shared.panic_on = Some(id.to_string());
        self
    }

    pub fn cancel_on(mut self, id: &str, token: &CancellationToken) -> Self {
        self.shared.cancel_on = Some((id.to_string(), token.clone()));
        self
    }

    /// Runs `hook` on every attempt for `id`, before the scripted step.
    pub fn on_fetch(mut self, id: &str, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.shared.on_fetch.push((id.to_string(), Arc::new(hook)));
        self
    }

    /// Refuses the `n`-th connection (zero based).
    pub fn refuse_connect(mut self, n: usize) -> Self {
        self.shared.refuse_connect = Some(n);
        self
    }

    pub fn build(self) -> MockConnector {
        MockConnector {
            shared: Arc::new(self.shared),
        }
    }
}

pub struct MockTransport {
    shared: Arc<Shared>,
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn connect(&self) -> Result<MockTransport, SeqFetchError> {
        let n = self.shared.connects.fetch_add(1, Ordering::SeqCst);
        if self.shared.refuse_connect == Some(n) {
            return Err(SeqFetchError::HttpClient("connection refused".to_string()));
        }
        Ok(MockTransport {
            shared: Arc::clone(&self.shared),
        })
    }
}

impl Transport for MockTransport {
    fn fetch_raw(&self, id: &Accession) -> Result<String, TransportError> {
        let attempt = {
            let mut attempts = self.shared.attempts.lock().unwrap();
            let counter = attempts.entry(id.as_str().to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        self.shared.log.lock().unwrap().push(id.to_string());
        for (trigger, hook) in &self.shared.on_fetch {
            if trigger == id.as_str() {
                hook();
            }
        }
        if self.shared.panic_on.as_deref() == Some(id.as_str()) {
            panic!("transport blew up on {id}");
        }
        if let Some((trigger, token)) = &self.shared.cancel_on {
            if trigger == id.as_str() {
                token.cancel();
            }
        }
        let step = self
            .shared
            .scripts
            .get(id.as_str())
            .and_then(|steps| steps.get(attempt - 1).or_else(|| steps.last()))
            .copied()
            .unwrap_or(Step::Ok);
        match step {
            Step::Ok => Ok(record_text(id.as_str())),
            Step::Network => Err(TransportError::Network("connection reset".to_string())),
            Step::Status(status) => Err(TransportError::HttpStatus {
                status,
                message: "scripted".to_string(),
            }),
        }
    }
}

/// Records requested sleeps instead of sleeping.
#[derive(Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn total_sleep(&self) -> Duration {
        self.sleeps.lock().unwrap().iter().sum()
    }

    pub fn sleep_count(&self) -> usize {
        self.sleeps.lock().unwrap().len()
    }
}

impl Clock for RecordingClock {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }

    fn today(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
    }
}

/// Blocks every sleep until [`GatedClock::open`] is called, so a test can
/// hold one worker back while the others run to completion.
#[derive(Default)]
pub struct GatedClock {
    open: Mutex<bool>,
    opened: Condvar,
}

impl GatedClock {
    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }
}

impl Clock for GatedClock {
    fn sleep(&self, _duration: Duration) {
        let open = self.open.lock().unwrap();
        let (_open, timeout) = self
            .opened
            .wait_timeout_while(open, Duration::from_secs(10), |open| !*open)
            .unwrap();
        assert!(!timeout.timed_out(), "gate was never opened");
    }

    fn today(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
    }
}

pub fn accessions(values: &[&str]) -> Vec<Accession> {
    values.iter().map(|value| value.parse().unwrap()).collect()
}

pub fn ids_of<'a>(values: impl IntoIterator<Item = &'a Accession>) -> Vec<String> {
    values.into_iter().map(|id| id.to_string()).collect()
}
