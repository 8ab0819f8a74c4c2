//! `reqwest::blocking` transport adapter.
//!
//! Enabled with the `reqwest` cargo feature. The engine itself only depends
//! on the [`HttpClient`] trait, so hosts with their own HTTP stack can skip
//! this module entirely.

use crate::error::{EngineResult, PublishError};
use crate::transport::{ApiRequest, ApiResponse, HttpClient, Method};
use std::time::Duration;

/// Bearer-authenticated blocking client for the document service.
pub struct ReqwestClient {
    base_url: String,
    token: String,
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a client for the service at `base_url`.
    ///
    /// The token comes from the host's credential provider; refresh is its
    /// responsibility, a 401 here is surfaced as fatal.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> EngineResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Network(format!("failed to build http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }
}

impl HttpClient for ReqwestClient {
    fn send(&self, request: &ApiRequest) -> EngineResult<ApiResponse> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self.client.request(method, &url).bearer_auth(&self.token);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().map_err(|e| {
            if e.is_timeout() {
                PublishError::Network(format!("request timed out: {e}"))
            } else {
                PublishError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok());
        let body = response
            .bytes()
            .map_err(|e| PublishError::Network(format!("failed to read response body: {e}")))?
            .to_vec();

        Ok(ApiResponse {
            status,
            retry_after,
            body,
        })
    }
}
