use std::time::Duration;

use reqwest::{header, StatusCode};
use serde_json::Value;
use thiserror::Error;

/// Where HTTP actually happens. The client is generic over this so tests can
/// script responses without touching the network.
pub trait Transport {
    async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<Value, TransportError>;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Error Connecting to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Timeout Error on {url}: {message}")]
    Timeout { url: String, message: String },

    #[error("Http Error: status {status} from {url}")]
    Status { status: StatusCode, url: String },

    #[error("Deserialization Error - Original String {0}, Error {1}")]
    Decode(String, serde_json::Error),

    #[error("Request Error: {0}")]
    Other(String),
}

fn classify(err: reqwest::Error, url: &str) -> TransportError {
    if err.is_connect() {
        TransportError::Connect { url: url.to_string(), message: err.to_string() }
    } else if err.is_timeout() {
        TransportError::Timeout { url: url.to_string(), message: err.to_string() }
    } else {
        TransportError::Other(err.to_string())
    }
}

/// reqwest-backed transport with the fixed versioned Accept header.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(
        api_version: &str,
        timeout: Duration,
    ) -> Result<Self, header::InvalidHeaderValue> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_str(&format!("application/json;version={}", api_version))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .expect("Failed to build reqwest client for GeckoTerminal transport");

        Ok(HttpTransport { client })
    }
}

impl Transport for HttpTransport {
    async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<Value, TransportError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|err| classify(err, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status { status, url: url.to_string() });
        }

        let raw_text = response.text().await.map_err(|err| classify(err, url))?;

        serde_json::from_str(&raw_text).map_err(|err| TransportError::Decode(raw_text, err))
    }
}
