use crate::core::config::NetworkConfig;
use crate::core::price::ProviderError;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times a provider call is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(config.max_attempts, config.backoff_base())
    }

    /// Wait after the given (1-based) failed attempt: base, 2×base, 4×base, ...
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay.saturating_mul(2u32.pow(exp))
    }
}

/// Retries an async operation with exponential backoff
///
/// # Parameters
/// - `policy`: Attempt budget and base delay
/// - `url`: Reported in the final error
/// - `operation`: Closure returning a future
///
/// # Returns
/// Either the successful result or the error of the last attempt. Errors that
/// are not retryable are returned immediately and the final attempt is never
/// followed by a sleep.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    url: &str,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if attempt >= policy.max_attempts {
                    return Err(match err {
                        ProviderError::RateLimited { .. } => ProviderError::RateLimited {
                            attempts: attempt,
                            url: url.to_string(),
                        },
                        other => other,
                    });
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}...",
                    attempt, policy.max_attempts, err, delay
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}

pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(concat!("coinfolio/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
}

/// Single GET decoded as JSON. HTTP 429 maps to [`ProviderError::RateLimited`].
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    headers: &[(&str, &str)],
) -> Result<T, ProviderError> {
    debug!("Requesting {}", url);
    let mut request = client.get(url);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let response = request.send().await.map_err(|e| ProviderError::Request {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited {
            attempts: 1,
            url: url.to_string(),
        });
    }
    if !status.is_success() {
        return Err(ProviderError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response.json::<T>().await.map_err(|e| ProviderError::Parse {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// [`get_json`] under a [`RetryPolicy`].
pub async fn fetch_json<T: DeserializeOwned>(
    client: &Client,
    policy: &RetryPolicy,
    url: &str,
    headers: &[(&str, &str)],
) -> Result<T, ProviderError> {
    with_retry(policy, url, || get_json(client, url, headers)).await
}
