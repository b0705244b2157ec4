//! Shared blocking HTTP client with bounded retries.
//!
//! Every network call in a cycle goes through [`HttpClient`]: arr REST calls,
//! torrent-client RPC and blocklist downloads. Transient failures back off
//! exponentially; authorization failures surface immediately.

use crate::config::GeneralConfig;
use crate::error::{AppError, Result};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    pub validate_certificates: bool,
}

impl From<&GeneralConfig> for HttpSettings {
    fn from(config: &GeneralConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.http_timeout_secs),
            max_retries: config.http_max_retries,
            validate_certificates: config.http_validate_cert,
        }
    }
}

/// Exponential backoff: `initial * multiplier^attempt`, capped at `max_backoff`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let backoff = self.initial_backoff.as_secs_f64() * factor;
        Duration::from_secs_f64(backoff.min(self.max_backoff.as_secs_f64()))
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// exhausts `max_retries`.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "{what} failed (attempt {attempt}/{}): {e}. Retrying in {delay:?}",
                        self.max_retries + 1
                    );
                    thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(!settings.validate_certificates)
            .build()?;

        Ok(Self {
            client,
            retry: RetryPolicy::new(settings.max_retries),
        })
    }

    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sends with retries and maps error statuses to [`AppError`].
    pub fn send<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.retry.run(what, || check_status(build(&self.client).send()?))
    }

    /// Sends with retries on transport errors and 5xx only; any other status
    /// is returned to the caller untouched.
    pub fn send_raw<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.retry.run(what, || {
            let response = build(&self.client).send()?;
            if response.status().is_server_error() {
                return Err(status_error(&response));
            }
            Ok(response)
        })
    }
}

fn status_error(response: &Response) -> AppError {
    AppError::Status {
        status: response.status().as_u16(),
        url: response.url().to_string(),
    }
}

/// Maps 401/403 to [`AppError::Unauthorized`], 404 to [`AppError::NotFound`]
/// and every other non-success status to [`AppError::Status`].
pub fn check_status(response: Response) -> Result<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::Unauthorized {
            url: response.url().to_string(),
        }),
        StatusCode::NOT_FOUND => Err(AppError::NotFound(response.url().to_string())),
        _ => Err(status_error(&response)),
    }
}
