// src/fetch/http.rs
// =============================================================================
// Fetches resources over HTTP with reqwest.
//
// Key functionality:
// - One shared Client (connection pooling) with a configurable User-Agent
// - GET with the whole body collected into Bytes
// - Transient failures (connect, timeout, body read, 5xx) are retried with
//   backoff; everything else (4xx, redirect loops, TLS) fails immediately
// =============================================================================

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::retry::{retry_with_backoff, Attempt, RetryPolicy};
use super::Fetcher;
use crate::error::MirrorError;

/// reqwest-backed Fetcher.
pub struct HttpFetcher {
    client: Client,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, policy: RetryPolicy) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(HttpFetcher { client, policy })
    }

    /// One GET, classified for the retry loop.
    async fn attempt(&self, url: &str) -> Attempt<Bytes, MirrorError> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return categorize_error(url, e),
        };

        let status = response.status();
        if status != StatusCode::OK {
            return categorize_status(url, status);
        }

        match response.bytes().await {
            Ok(body) => {
                debug!(url, bytes = body.len(), "fetched");
                Attempt::Done(body)
            }
            Err(e) => categorize_error(url, e),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, token: &CancellationToken, url: &str) -> Result<Bytes, MirrorError> {
        retry_with_backoff(
            &self.policy,
            token,
            || MirrorError::Cancelled {
                url: url.to_string(),
            },
            |_| async move { self.attempt(url).await },
        )
        .await
    }
}

// Non-200 responses. Only server errors are worth another try.
fn categorize_status(url: &str, status: StatusCode) -> Attempt<Bytes, MirrorError> {
    let err = MirrorError::Fetch {
        url: url.to_string(),
        reason: format!("unexpected status HTTP {}", status.as_u16()),
    };

    if status.is_server_error() {
        Attempt::Retry(err)
    } else {
        Attempt::Fail(err)
    }
}

// reqwest errors can happen for many reasons: timeouts, DNS, TLS, redirect
// loops, truncated bodies. Network-level ones are retried.
fn categorize_error(url: &str, error: reqwest::Error) -> Attempt<Bytes, MirrorError> {
    let error_string = error.to_string();

    let (retryable, reason) = if error.is_timeout() {
        (true, "request timed out".to_string())
    } else if error.is_redirect() {
        (false, "too many redirects".to_string())
    } else if error.is_connect() {
        if error_string.contains("dns") {
            (true, "could not resolve hostname".to_string())
        } else {
            (true, format!("connection failed: {}", error_string))
        }
    } else if error_string.contains("certificate") || error_string.contains("ssl") {
        (false, "TLS certificate error".to_string())
    } else if error.is_body() || error.is_decode() || error.is_request() {
        (true, error_string)
    } else {
        (false, error_string)
    };

    let err = MirrorError::Fetch {
        url: url.to_string(),
        reason,
    };

    if retryable {
        Attempt::Retry(err)
    } else {
        Attempt::Fail(err)
    }
}
