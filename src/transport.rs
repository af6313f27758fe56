use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::Accession;
use crate::error::{SeqFetchError, TransportError};

pub const DEFAULT_BASE_URL: &str = "https://rest.uniprot.org/uniprotkb";

/// One reusable connection context: issues a single GET per call.
pub trait Transport {
    fn fetch_raw(&self, id: &Accession) -> Result<String, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn fetch_raw(&self, id: &Accession) -> Result<String, TransportError> {
        (**self).fetch_raw(id)
    }
}

/// Creates connection contexts. Each worker connects once and keeps its
/// transport to itself.
pub trait Connector: Sync {
    type Transport: Transport;

    fn connect(&self) -> Result<Self::Transport, SeqFetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpConnector {
    base_url: String,
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, timeout }
    }
}

impl Connector for HttpConnector {
    type Transport = HttpTransport;

    fn connect(&self) -> Result<HttpTransport, SeqFetchError> {
        HttpTransport::new(&self.base_url, self.timeout)
    }
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SeqFetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-seqfetch/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SeqFetchError::HttpClient(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| SeqFetchError::HttpClient(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn record_url(&self, id: &Accession) -> String {
        record_url(&self.base_url, id)
    }
}

impl Transport for HttpTransport {
    fn fetch_raw(&self, id: &Accession) -> Result<String, TransportError> {
        let url = self.record_url(id);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .map_err(|err| TransportError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .ok()
                .filter(|body| !body.trim().is_empty())
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        response
            .text()
            .map_err(|err| TransportError::Network(err.to_string()))
    }
}

pub fn record_url(base_url: &str, id: &Accession) -> String {
    format!("{}/{}.fasta", base_url.trim_end_matches('/'), id.as_str())
}
