//! Transport-level retry policy.
//!
//! Only failures of the exchange itself are considered here; HTTP status
//! codes are never retried. Every method in RFC 2616 §9.1.2 plus POST is
//! treated as idempotent. Timeouts, connect failures (refused, unknown host,
//! TLS handshake) and request-building errors are never retried.

use reqwest::Method;
use std::collections::HashSet;
use tracing::warn;

use crate::config::RetryConfig;

/// Coarse classification of a failed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// Interrupted I/O: the request or a read timed out
    Timeout,
    /// The connection could not be established
    Connect,
    /// The request could not be built or redirected
    Request,
    /// Anything else, typically a connection dropped mid-exchange
    Other,
}

impl TransportFailure {
    pub fn classify(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect
        } else if error.is_builder() || error.is_redirect() {
            Self::Request
        } else {
            Self::Other
        }
    }

    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Other)
    }
}

/// Decides whether a failed request is sent again.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    request_sent_retry_enabled: bool,
    idempotent_methods: HashSet<Method>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        let idempotent_methods = [
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::TRACE,
        ]
        .into_iter()
        .collect();

        Self {
            max_retries: config.max_retries,
            request_sent_retry_enabled: config.request_sent_retry_enabled,
            idempotent_methods,
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self::new(&RetryConfig {
            max_retries: 0,
            request_sent_retry_enabled: false,
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_idempotent(&self, method: &Method) -> bool {
        self.idempotent_methods.contains(method)
    }

    /// `execution_count` is the number of attempts made so far (1 after the
    /// first failure).
    pub fn should_retry(&self, method: &Method, failure: TransportFailure, execution_count: u32) -> bool {
        let retry = execution_count <= self.max_retries
            && failure.is_retriable()
            && (self.is_idempotent(method) || self.request_sent_retry_enabled);
        warn!(
            method = %method,
            failure = ?failure,
            execution_count,
            retry,
            "retryRequest"
        );
        retry
    }
}
