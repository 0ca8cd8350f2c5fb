use std::time::Duration;

use reqwest::Client;
use techdemand_core::error::AppError;
use techdemand_core::traits::Fetcher;

pub const DEFAULT_USER_AGENT: &str = concat!("techdemand/", env!("CARGO_PKG_VERSION"));

/// HTTP fetcher using reqwest.
///
/// Downloads search result pages with a configurable User-Agent and a
/// per-call timeout. Failures are classified so the retry loop can tell
/// transient errors (connect, timeout, body read, 429/5xx) from permanent ones.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(10))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        Self::with_options(timeout, DEFAULT_USER_AGENT)
    }

    pub fn with_options(timeout: Duration, user_agent: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Classify a reqwest failure. Builder errors (bad URL, bad header) are
    /// permanent; anything that went wrong on the wire is a network error.
    fn classify(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout)
        } else if e.is_builder() || e.is_redirect() {
            AppError::HttpError(e.to_string())
        } else if e.is_body() || e.is_decode() {
            AppError::BodyReadError(error_chain(&e))
        } else {
            AppError::NetworkError(error_chain(&e))
        }
    }
}

/// Render an error with its sources; reqwest's top-level message omits the cause.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            let err = self.classify(e);
            tracing::debug!(%url, error = %err, retryable = err.is_retryable(), "Request failed");
            err
        })?;

        let status = response.status();
        tracing::debug!(%url, status = status.as_u16(), "Response received");
        if !status.is_success() {
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        tracing::debug!(%url, bytes = body.len(), "Body read");
        Ok(body)
    }
}
