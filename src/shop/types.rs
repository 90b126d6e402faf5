//! Shop API request/response types and error definitions.

use std::fmt;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Caller-supplied token that lets the upstream deduplicate a retried unsafe request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// A fresh random (UUID v4) key.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for IdempotencyKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for IdempotencyKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One logical request against the shop API.
#[derive(Debug, Clone)]
pub struct ShopRequest {
    pub method: Method,
    /// Path starting with `/admin`, or a full URL.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub json: Option<Value>,
    pub idempotency_key: Option<IdempotencyKey>,
    /// Per-attempt timeout; the client default applies when unset.
    pub timeout: Option<Duration>,
}

impl ShopRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            json: None,
            idempotency_key: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<IdempotencyKey>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A single HTTP exchange handed to the transport.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

/// Status, headers and body of one upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Transport-level failure: no HTTP status was obtained.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Errors returned by the retrying shop client.
#[derive(Debug, Error)]
pub enum ShopError {
    /// Non-retriable status (4xx other than an eligible 429).
    #[error("shop API returned non-retriable status {}", .response.status)]
    Status { response: UpstreamResponse },

    /// Every attempt ended in a retriable status; carries the last response.
    #[error("shop API request failed after {attempts} attempts (last status {})", .response.status)]
    RetriesExhausted {
        attempts: u32,
        response: UpstreamResponse,
    },

    /// Every attempt failed before a response was received.
    #[error("shop API unreachable after {attempts} attempts: {source}")]
    Network {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("invalid shop URL: {0}")]
    InvalidUrl(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(String),

    #[error("failed to encode request body: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ShopError {
    /// HTTP status of the response that ended the request, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ShopError::Status { response } | ShopError::RetriesExhausted { response, .. } => {
                Some(response.status)
            }
            _ => None,
        }
    }
}

/// Result type for shop operations.
pub type ShopResult<T> = Result<T, ShopError>;
