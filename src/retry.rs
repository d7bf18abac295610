//! Bounded exponential-backoff retry around a single HTTP call
//!
//! Retries only on rate limiting (HTTP 429) and transport failures. Any other
//! response, including application-level 4xx/5xx, is returned to the caller
//! on the first attempt.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::http::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Default number of attempts per request
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry; doubled on every subsequent retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Errors surfaced once the retry budget is spent
#[derive(Debug, Clone, Error)]
pub enum RetryError {
    /// Every attempt was answered with HTTP 429
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// The final attempt failed at the transport level
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Retry budget and backoff base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-indexed): base * 2^(attempt-1)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Executes requests through a transport with retry
#[derive(Clone)]
pub struct RetryExecutor {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Sends `request`, retrying on 429 and transport errors
    ///
    /// # Arguments
    /// * `request` - The request to send; it is re-sent unchanged on each attempt
    ///
    /// # Returns
    /// * `Ok(HttpResponse)` - The first response that is not a 429, whatever its status
    /// * `Err(RetryError::RateLimited)` - If every attempt was answered with 429
    /// * `Err(RetryError::Transport)` - If the last attempt failed at the transport level
    pub async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, RetryError> {
        let max_attempts = self.policy.attempts();
        let mut attempt = 1;

        loop {
            let last_error = match self.transport.send(request).await {
                Ok(response) if response.is_rate_limited() => {
                    warn!(url = %request.url, attempt, max_attempts, "rate limited (429)");
                    RetryError::RateLimited {
                        attempts: attempt,
                    }
                }
                Ok(response) => {
                    debug!(
                        url = %request.url,
                        attempt,
                        status = response.status,
                        "request completed"
                    );
                    return Ok(response);
                }
                Err(err) => {
                    warn!(
                        url = %request.url,
                        attempt,
                        max_attempts,
                        error = %err,
                        "transport error"
                    );
                    RetryError::Transport(err)
                }
            };

            if attempt >= max_attempts {
                return Err(last_error);
            }

            let delay = self.policy.backoff(attempt);
            debug!(?delay, "retrying after backoff");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays a fixed sequence of outcomes and records when each call happened
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError("script exhausted".to_string())))
        }
    }

    fn executor(transport: Arc<ScriptedTransport>) -> RetryExecutor {
        RetryExecutor::new(transport, RetryPolicy::default())
    }

    fn request() -> HttpRequest {
        HttpRequest::get("https://api.example/test")
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_429s_then_success() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::new(200, "ok")),
            Ok(HttpResponse::new(200, "never reached")),
        ]);

        let response = executor(transport.clone()).execute(&request()).await.unwrap();
        assert_eq!(response.body, "ok");

        let calls = transport.call_times();
        assert_eq!(calls.len(), 3, "no fourth attempt");
        assert_eq!(calls[1] - calls[0], Duration::from_secs(1));
        assert_eq!(calls[2] - calls[1], Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_after_budget() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::new(429, "")),
        ]);

        let err = executor(transport.clone()).execute(&request()).await.unwrap_err();
        assert!(matches!(err, RetryError::RateLimited { attempts: 3 }));
        assert_eq!(transport.call_times().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_retried_then_propagated() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError("connection reset".to_string())),
            Err(TransportError("connection reset".to_string())),
            Err(TransportError("connection refused".to_string())),
        ]);

        let err = executor(transport.clone()).execute(&request()).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(transport.call_times().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_recovers() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError("timeout".to_string())),
            Ok(HttpResponse::new(200, "late")),
        ]);

        let response = executor(transport).execute(&request()).await.unwrap();
        assert_eq!(response.body, "late");
    }

    #[tokio::test]
    async fn test_application_errors_are_not_retried() {
        for status in [400, 401, 404, 500, 503] {
            let transport = ScriptedTransport::new(vec![
                Ok(HttpResponse::new(status, "error")),
                Ok(HttpResponse::new(200, "should not be used")),
            ]);

            let response = executor(transport.clone()).execute(&request()).await.unwrap();
            assert_eq!(response.status, status);
            assert_eq!(transport.call_times().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_still_sends_once() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(429, ""))]);
        let executor = RetryExecutor::new(
            transport.clone(),
            RetryPolicy {
                max_attempts: 0,
                base_delay: Duration::ZERO,
            },
        );

        let err = executor.execute(&request()).await.unwrap_err();
        assert!(matches!(err, RetryError::RateLimited { attempts: 1 }));
        assert_eq!(transport.call_times().len(), 1);
    }
}
