//! Request execution with status-classified retry and backoff.

use crate::config::{RetryPolicy, StatusClass};
use crate::error::{EngineResult, PublishError};
use crate::transport::{ApiRequest, ApiResponse, HttpClient};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Abstraction over blocking waits so backoff timing is testable.
pub trait Sleeper: Send + Sync {
    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeper backed by `std::thread::sleep`.
#[derive(Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A sleeper that records requested waits instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Creates an empty recording sleeper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded waits in request order.
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().clone()
    }

    /// Returns the sum of all recorded waits.
    pub fn total(&self) -> Duration {
        self.waits.lock().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.waits.lock().push(duration);
    }
}

/// Executes API requests, retrying per the configured policy.
///
/// Rate limits are retried with a bounded backoff honoring Retry-After;
/// server and network failures get a limited number of short-delay retries;
/// every other non-success status is surfaced immediately. Payload-size
/// shrink and verb fallback are the appender's concern and are surfaced as
/// errors here.
pub struct RequestExecutor<C: HttpClient> {
    client: C,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<C: HttpClient> RequestExecutor<C> {
    /// Creates an executor that really sleeps between attempts.
    pub fn new(client: C, policy: RetryPolicy) -> Self {
        Self::with_sleeper(client, policy, Arc::new(ThreadSleeper))
    }

    /// Creates an executor with an injected sleeper.
    pub fn with_sleeper(client: C, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            client,
            policy,
            sleeper,
        }
    }

    /// Returns the sleeper shared with callers that pace their own requests.
    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        Arc::clone(&self.sleeper)
    }

    /// Sends `request`, retrying recoverable failures, and returns the first
    /// successful response or the classified error.
    pub fn execute(&self, request: &ApiRequest) -> EngineResult<ApiResponse> {
        let mut rate_limit_attempts = 0u32;
        let mut transient_retries = 0u32;

        loop {
            let response = match self.client.send(request) {
                Ok(response) => response,
                Err(PublishError::Network(message)) => {
                    if transient_retries >= self.policy.server_error_retries {
                        return Err(PublishError::Network(message));
                    }
                    transient_retries += 1;
                    warn!(
                        method = request.method.as_str(),
                        path = %request.path,
                        retry = transient_retries,
                        "network failure, retrying: {message}"
                    );
                    self.sleeper
                        .sleep(self.policy.backoff(StatusClass::Transient, None));
                    continue;
                }
                Err(other) => return Err(other),
            };

            match self.policy.classify(response.status) {
                StatusClass::Success => return Ok(response),
                StatusClass::RateLimited => {
                    rate_limit_attempts += 1;
                    if rate_limit_attempts >= self.policy.max_rate_limit_attempts {
                        return Err(PublishError::RateLimited {
                            attempts: rate_limit_attempts,
                        });
                    }
                    let delay = self
                        .policy
                        .backoff(StatusClass::RateLimited, response.retry_after);
                    debug!(
                        path = %request.path,
                        attempt = rate_limit_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    self.sleeper.sleep(delay);
                }
                StatusClass::Transient => {
                    if transient_retries >= self.policy.server_error_retries {
                        return Err(PublishError::Server {
                            status: response.status,
                        });
                    }
                    transient_retries += 1;
                    warn!(
                        path = %request.path,
                        status = response.status,
                        retry = transient_retries,
                        "server error, retrying"
                    );
                    self.sleeper
                        .sleep(self.policy.backoff(StatusClass::Transient, None));
                }
                StatusClass::Fatal => {
                    return Err(PublishError::from_status(
                        response.status,
                        response.error_message(),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockHttpClient;
    use serde_json::json;

    fn executor(
        client: MockHttpClient,
        policy: RetryPolicy,
    ) -> (RequestExecutor<MockHttpClient>, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let executor = RequestExecutor::with_sleeper(client, policy, sleeper.clone());
        (executor, sleeper)
    }

    #[test]
    fn success_returns_immediately() {
        let client = MockHttpClient::new();
        client.enqueue(ApiResponse::ok(json!({"id": "p1"})));

        let (executor, sleeper) = executor(client, RetryPolicy::default());
        let response = executor.execute(&ApiRequest::get("/pages/p1")).unwrap();

        assert_eq!(response.status, 200);
        assert!(sleeper.waits().is_empty());
    }

    #[test]
    fn rate_limit_waits_at_least_retry_after() {
        let client = MockHttpClient::new();
        client.enqueue(ApiResponse::with_status(429).with_retry_after(5));
        client.enqueue(ApiResponse::ok(json!({})));

        let (executor, sleeper) = executor(client, RetryPolicy::default());
        executor.execute(&ApiRequest::get("/x")).unwrap();

        let waits = sleeper.waits();
        assert_eq!(waits.len(), 1);
        assert!(waits[0] >= Duration::from_millis(5000));
    }

    #[test]
    fn rate_limit_budget_exhausted_after_three_attempts() {
        let client = MockHttpClient::new();
        for _ in 0..4 {
            client.enqueue(ApiResponse::with_status(429).with_retry_after(1));
        }

        let (executor, sleeper) = executor(client, RetryPolicy::default());
        let error = executor.execute(&ApiRequest::get("/x")).unwrap_err();

        assert_eq!(error, PublishError::RateLimited { attempts: 3 });
        // Three attempts were sent, never a fourth.
        assert_eq!(executor.client.request_count(), 3);
        assert_eq!(sleeper.waits().len(), 2);
    }

    #[test]
    fn server_error_retried_once() {
        let client = MockHttpClient::new();
        client.enqueue(ApiResponse::with_status(502));
        client.enqueue(ApiResponse::ok(json!({})));

        let (executor, sleeper) = executor(client, RetryPolicy::default());
        let response = executor.execute(&ApiRequest::get("/x")).unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(sleeper.waits().len(), 1);
    }

    #[test]
    fn server_error_exhausts_to_error() {
        let client = MockHttpClient::new();
        client.enqueue(ApiResponse::with_status(500));
        client.enqueue(ApiResponse::with_status(503));

        let (executor, _) = executor(client, RetryPolicy::default());
        let error = executor.execute(&ApiRequest::get("/x")).unwrap_err();

        assert_eq!(error, PublishError::Server { status: 503 });
        assert_eq!(executor.client.request_count(), 2);
    }

    #[test]
    fn network_failure_retried_once() {
        let client = MockHttpClient::new();
        client.enqueue_error(PublishError::Network("connection reset".into()));
        client.enqueue(ApiResponse::ok(json!({})));

        let (executor, sleeper) = executor(client, RetryPolicy::default());
        let response = executor.execute(&ApiRequest::get("/x")).unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(sleeper.waits().len(), 1);
    }

    #[test]
    fn fatal_status_not_retried() {
        let client = MockHttpClient::new();
        client.enqueue(ApiResponse {
            status: 401,
            retry_after: None,
            body: json!({"message": "token expired"}).to_string().into_bytes(),
        });

        let (executor, sleeper) = executor(client, RetryPolicy::default());
        let error = executor.execute(&ApiRequest::get("/x")).unwrap_err();

        assert_eq!(error, PublishError::Auth("token expired".into()));
        assert_eq!(executor.client.request_count(), 1);
        assert!(sleeper.waits().is_empty());
    }

    #[test]
    fn payload_too_large_surfaced_for_the_appender() {
        let client = MockHttpClient::new();
        client.enqueue(ApiResponse::with_status(413));

        let (executor, _) = executor(client, RetryPolicy::default());
        let error = executor.execute(&ApiRequest::get("/x")).unwrap_err();
        assert_eq!(error, PublishError::PayloadTooLarge);
    }

    #[test]
    fn no_retry_policy_fails_fast() {
        let client = MockHttpClient::new();
        client.enqueue(ApiResponse::with_status(429));

        let (executor, sleeper) = executor(client, RetryPolicy::no_retry());
        let error = executor.execute(&ApiRequest::get("/x")).unwrap_err();

        assert_eq!(error, PublishError::RateLimited { attempts: 1 });
        assert!(sleeper.waits().is_empty());
    }
}
