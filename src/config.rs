use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{Accession, parse_accessions};
use crate::error::SeqFetchError;
use crate::transport::DEFAULT_BASE_URL;

pub const DEFAULT_CONFIG_FILE: &str = "kira-seqfetch.json";

/// On-disk shape of `kira-seqfetch.json`. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub accessions: Vec<String>,
    #[serde(default)]
    pub save: Option<bool>,
    #[serde(default)]
    pub save_dir: Option<String>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub worker_count: Option<usize>,
    #[serde(default)]
    pub backoff_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub accessions: Vec<Accession>,
    pub save: bool,
    pub save_dir: Utf8PathBuf,
    /// Maximum attempts per accession, the first request included.
    pub retries: u32,
    pub worker_count: usize,
    pub backoff: Duration,
    pub timeout: Duration,
    pub base_url: String,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            accessions: Vec::new(),
            save: true,
            save_dir: Utf8PathBuf::from("data"),
            retries: 3,
            worker_count: 4,
            backoff: Duration::from_millis(1000),
            timeout: Duration::from_secs(30),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads an explicit config file, or `kira-seqfetch.json` from the
    /// current directory.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SeqFetchError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(SeqFetchError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SeqFetchError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SeqFetchError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    /// Like [`ConfigLoader::resolve`] but falls back to defaults when no path
    /// is given and the default file does not exist.
    pub fn resolve_or_default(path: Option<&str>) -> Result<ResolvedConfig, SeqFetchError> {
        match Self::resolve(path) {
            Err(SeqFetchError::MissingConfig) => Ok(ResolvedConfig::default()),
            other => other,
        }
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, SeqFetchError> {
        let defaults = ResolvedConfig::default();

        let retries = config.retries.unwrap_or(defaults.retries);
        if retries == 0 {
            return Err(SeqFetchError::InvalidConfig(
                "retries must be at least 1".to_string(),
            ));
        }
        let worker_count = config.worker_count.unwrap_or(defaults.worker_count);
        if worker_count == 0 {
            return Err(SeqFetchError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        let timeout = config
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);
        if timeout.is_zero() {
            return Err(SeqFetchError::InvalidConfig(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        let base_url = config
            .base_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(SeqFetchError::InvalidConfig(format!(
                "base_url must be an http(s) URL: {base_url}"
            )));
        }

        Ok(ResolvedConfig {
            accessions: parse_accessions(&config.accessions)?,
            save: config.save.unwrap_or(defaults.save),
            save_dir: config
                .save_dir
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.save_dir),
            retries,
            worker_count,
            backoff: config
                .backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff),
            timeout,
            base_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved, ResolvedConfig::default());
        assert_eq!(resolved.base_url, "https://rest.uniprot.org/uniprotkb");
    }

    #[test]
    fn rejects_zero_retries() {
        let config = Config {
            retries: Some(0),
            ..Config::default()
        };
        assert_matches!(
            ConfigLoader::resolve_config(config),
            Err(SeqFetchError::InvalidConfig(_))
        );
    }

    #[test]
    fn rejects_bad_accession() {
        let config = Config {
            accessions: vec!["P12345".to_string(), "bad id".to_string()],
            ..Config::default()
        };
        assert_matches!(
            ConfigLoader::resolve_config(config),
            Err(SeqFetchError::InvalidAccession(_))
        );
    }
}
