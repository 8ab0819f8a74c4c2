//! HTTP transport abstraction.
//!
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, ureq, hyper, an in-memory fake for tests).

use crate::error::{EngineResult, PublishError};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;

/// HTTP verb used for an API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PATCH.
    Patch,
    /// DELETE.
    Delete,
}

impl Method {
    /// Returns the verb as an uppercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// A request to the remote document service.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP verb.
    pub method: Method,
    /// Path relative to the service base URL, including any query string.
    pub path: String,
    /// JSON request body.
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Creates a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    /// Creates a POST request with a JSON body.
    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    /// Creates a request with an explicit verb and JSON body.
    pub fn with_body(method: Method, path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method,
            path: path.into(),
            body: Some(body),
        }
    }

    /// Creates a DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }
}

/// A raw response from the remote document service.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed Retry-After header, in seconds.
    pub retry_after: Option<u64>,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Creates a 200 response with a JSON body.
    pub fn ok(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body: body.to_string().into_bytes(),
        }
    }

    /// Creates an empty-bodied response with the given status.
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            retry_after: None,
            body: Vec::new(),
        }
    }

    /// Sets the Retry-After hint.
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> EngineResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| PublishError::Protocol(format!("failed to decode response: {e}")))
    }

    /// Extracts a short error message from the body, falling back to the
    /// status line. Services put it under a `message` key.
    pub fn error_message(&self) -> String {
        serde_json::from_slice::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|value| {
                value
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }
}

/// Blocking HTTP client abstraction.
///
/// Implement this trait to provide the actual transport. Transport-level
/// failures (connect, timeout) are reported as [`PublishError::Network`];
/// any HTTP response, including error statuses, is returned as an
/// [`ApiResponse`] for the retry loop to classify.
pub trait HttpClient: Send + Sync {
    /// Sends the request and returns the raw response.
    fn send(&self, request: &ApiRequest) -> EngineResult<ApiResponse>;
}

impl<T: HttpClient + ?Sized> HttpClient for std::sync::Arc<T> {
    fn send(&self, request: &ApiRequest) -> EngineResult<ApiResponse> {
        (**self).send(request)
    }
}

/// A scripted HTTP client for tests.
///
/// Responses are served in FIFO order; every request is recorded. An empty
/// queue yields a protocol error.
#[derive(Default)]
pub struct MockHttpClient {
    responses: Mutex<VecDeque<EngineResult<ApiResponse>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockHttpClient {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn enqueue(&self, response: ApiResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    /// Queues a transport-level failure.
    pub fn enqueue_error(&self, error: PublishError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Returns the requests sent so far.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of requests sent so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl HttpClient for MockHttpClient {
    fn send(&self, request: &ApiRequest) -> EngineResult<ApiResponse> {
        self.requests.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(PublishError::Protocol("no scripted response".into())))
    }
}
