//! Configuration for the publish engine.

use std::time::Duration;

/// How the retry loop should treat a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx: return the response.
    Success,
    /// 429: bounded backoff honoring the Retry-After hint.
    RateLimited,
    /// 5xx: short fixed delay, limited retries.
    Transient,
    /// Anything else: surface immediately.
    Fatal,
}

/// Retry and backoff behavior for remote requests.
///
/// Payload-size shrink and verb fallback are batching concerns and live in
/// the appender; this policy only governs per-request retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed for a rate-limited request.
    pub max_rate_limit_attempts: u32,
    /// Minimum wait after a 429, used when Retry-After is absent or smaller.
    pub rate_limit_base_delay: Duration,
    /// Retries allowed for 5xx and network failures.
    pub server_error_retries: u32,
    /// Wait before retrying a 5xx or network failure.
    pub server_error_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the given rate-limit attempt budget.
    pub fn new(max_rate_limit_attempts: u32) -> Self {
        Self {
            max_rate_limit_attempts,
            rate_limit_base_delay: Duration::from_secs(1),
            server_error_retries: 1,
            server_error_delay: Duration::from_millis(500),
        }
    }

    /// Creates a policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_rate_limit_attempts: 1,
            rate_limit_base_delay: Duration::ZERO,
            server_error_retries: 0,
            server_error_delay: Duration::ZERO,
        }
    }

    /// Sets the minimum rate-limit wait.
    pub fn with_rate_limit_base_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_base_delay = delay;
        self
    }

    /// Sets the number of 5xx/network retries.
    pub fn with_server_error_retries(mut self, retries: u32) -> Self {
        self.server_error_retries = retries;
        self
    }

    /// Sets the 5xx/network retry delay.
    pub fn with_server_error_delay(mut self, delay: Duration) -> Self {
        self.server_error_delay = delay;
        self
    }

    /// Classifies a response status.
    pub fn classify(&self, status: u16) -> StatusClass {
        match status {
            200..=299 => StatusClass::Success,
            429 => StatusClass::RateLimited,
            500..=599 => StatusClass::Transient,
            _ => StatusClass::Fatal,
        }
    }

    /// Computes the wait before the next attempt.
    ///
    /// For rate limits this is the larger of the configured base delay and
    /// the server's Retry-After hint (seconds).
    pub fn backoff(&self, class: StatusClass, retry_after_secs: Option<u64>) -> Duration {
        match class {
            StatusClass::RateLimited => {
                let hinted = Duration::from_secs(retry_after_secs.unwrap_or(0));
                hinted.max(self.rate_limit_base_delay)
            }
            StatusClass::Transient => self.server_error_delay,
            StatusClass::Success | StatusClass::Fatal => Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Configuration for publish operations.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Item cap per append request.
    pub max_children_per_request: usize,
    /// Row cap per table-row append request. Table rows are heavier per-item
    /// payloads and more prone to size and rate errors than ordinary blocks.
    pub table_row_batch_size: usize,
    /// Fixed pause between sequential append requests.
    pub batch_delay: Duration,
    /// Per-request timeout, applied by the HTTP adapter.
    pub timeout: Duration,
    /// Retry behavior.
    pub retry: RetryPolicy,
}

impl EngineConfig {
    /// Creates a configuration with service-observed defaults.
    pub fn new() -> Self {
        Self {
            max_children_per_request: 100,
            table_row_batch_size: 10,
            batch_delay: Duration::from_millis(350),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the append item cap.
    pub fn with_max_children_per_request(mut self, cap: usize) -> Self {
        self.max_children_per_request = cap.max(1);
        self
    }

    /// Sets the table-row batch size.
    pub fn with_table_row_batch_size(mut self, size: usize) -> Self {
        self.table_row_batch_size = size.max(1);
        self
    }

    /// Sets the inter-batch delay.
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
