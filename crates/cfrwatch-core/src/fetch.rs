//! Document retrieval.

use crate::config::SourceConfig;
use crate::normalize::DocumentShape;
use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use ureq::Agent;

pub const YEAR_PLACEHOLDER: &str = "{year}";

#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with anything other than `200 OK`.
    #[error("retrieval of {url} failed with HTTP status code {status}")]
    Status { url: String, status: u16 },

    /// No usable response: DNS, connect, TLS, timeout, or a truncated body.
    #[error("retrieval of {url} failed: {message}")]
    Transport { url: String, message: String },

    /// A local document could not be read.
    #[error("failed to read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("four-digit year required, got {0:?}")]
pub struct YearError(pub String);

pub trait DocumentFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Which document to retrieve and how to read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequest {
    pub shape: DocumentShape,
    pub url: String,
}

impl DocumentRequest {
    pub fn historical(source: &SourceConfig) -> Self {
        Self {
            shape: DocumentShape::Historical,
            url: source.historical_url.clone(),
        }
    }

    pub fn annual(source: &SourceConfig, year: &str) -> Result<Self, YearError> {
        let year = parse_year(year)?;
        Ok(Self {
            shape: DocumentShape::Annual,
            url: source.annual_url_template.replace(YEAR_PLACEHOLDER, year),
        })
    }

    /// Historical without a year, annual with one.
    pub fn for_year(source: &SourceConfig, year: Option<&str>) -> Result<Self, YearError> {
        match year {
            None => Ok(Self::historical(source)),
            Some(year) => Self::annual(source, year),
        }
    }

    /// Same shape, but read from `path` instead of the network.
    pub fn with_location(self, location: impl Into<String>) -> Self {
        Self {
            url: location.into(),
            ..self
        }
    }
}

pub fn parse_year(raw: &str) -> Result<&str, YearError> {
    if raw.len() == 4 && raw.bytes().all(|b| b.is_ascii_digit()) {
        Ok(raw)
    } else {
        Err(YearError(raw.to_string()))
    }
}

/// HTTP GET through a `ureq` agent. Only `200 OK` counts as success.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let http = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self { http }
    }
}

impl DocumentFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        info!(url, "fetching regulation XML (large file)");
        let response = self.http.get(url).call().map_err(|err| match err {
            ureq::Error::Status(status, _) => FetchError::Status {
                url: url.to_string(),
                status,
            },
            ureq::Error::Transport(transport) => FetchError::Transport {
                url: url.to_string(),
                message: transport.to_string(),
            },
        })?;

        if response.status() != 200 {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        // into_string() caps bodies at 10MB; the consolidated title is larger.
        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|err| FetchError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        info!(url, bytes = body.len(), "fetched regulation XML");
        Ok(body)
    }
}

/// Treats the location as a filesystem path.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl DocumentFetcher for FileFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let path = PathBuf::from(url);
        info!(path = %path.display(), "reading regulation XML from disk");
        fs::read(&path).map_err(|source| FetchError::File {
            path: path.display().to_string(),
            source,
        })
    }
}
