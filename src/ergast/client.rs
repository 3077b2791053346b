//! Blocking HTTP client for the Ergast API.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use super::{results_url, ResultKind};
use crate::config::ApiConfig;

/// Errors raised while fetching a results document
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("response from {url} is not valid JSON")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    fn from_transport(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if source.is_decode() {
            FetchError::Decode {
                url: url.to_string(),
                source,
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Anything that can produce raw results documents
pub trait ResultSource {
    /// Fetch the results of a season, or of one round when `round` is set
    fn fetch(&self, season: u32, round: Option<u32>, kind: ResultKind) -> Result<Value, FetchError>;
}

/// Ergast API client
pub struct ErgastClient {
    client: Client,
    base_url: String,
    limit: u32,
}

impl ErgastClient {
    /// Create a client with the configured base URL, page size and timeout
    pub fn new(config: &ApiConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            limit: config.result_limit,
        })
    }

    fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::from_transport(url, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .map_err(|e| FetchError::from_transport(url, e))
    }
}

impl ResultSource for ErgastClient {
    fn fetch(&self, season: u32, round: Option<u32>, kind: ResultKind) -> Result<Value, FetchError> {
        let url = results_url(&self.base_url, season, round, kind, self.limit);

        match self.get_json(&url) {
            Ok(body) => {
                info!(
                    "Fetched {} for season {}{} from {}",
                    kind,
                    season,
                    round.map(|r| format!(" round {}", r)).unwrap_or_default(),
                    url
                );
                Ok(body)
            }
            Err(e) => {
                error!("Failed to fetch data from API: {}", e);
                Err(e)
            }
        }
    }
}
