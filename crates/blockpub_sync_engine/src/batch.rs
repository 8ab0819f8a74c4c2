//! Bounded, sequential children appends.
//!
//! The service caps items per append request, rejects oversized payloads
//! with 413 at an undocumented byte ceiling, and on some deployments rejects
//! one of PATCH/POST for the append route. The appender sends batches
//! sequentially (append order encodes document order), halves the batch on
//! 413, and falls back to the alternate verb once before failing.

use crate::api::{BlockApi, RemoteBlock};
use crate::config::EngineConfig;
use crate::error::{EngineResult, PublishError};
use crate::transport::{HttpClient, Method};
use std::time::Duration;
use tracing::{debug, warn};

fn alternate_verb(method: Method) -> Method {
    match method {
        Method::Patch => Method::Post,
        _ => Method::Patch,
    }
}

/// Appends sibling blocks to a remote parent in bounded batches.
///
/// Batch size and working verb are call-local: a 413 shrink and a verb
/// discovered by fallback both persist for the remainder of the appender's
/// lifetime, never across publish calls.
pub struct BlockAppender<'a, C: HttpClient> {
    api: &'a BlockApi<C>,
    batch_delay: Duration,
    batch_size: usize,
    verb: Method,
    verb_confirmed: bool,
    requests_sent: u64,
}

impl<'a, C: HttpClient> BlockAppender<'a, C> {
    /// Creates an appender with the configured per-request item cap.
    pub fn new(api: &'a BlockApi<C>, config: &EngineConfig) -> Self {
        Self::with_batch_size(api, config, config.max_children_per_request)
    }

    /// Creates an appender with an explicit initial batch size (used for
    /// table rows, which get a smaller cap than ordinary content).
    pub fn with_batch_size(
        api: &'a BlockApi<C>,
        config: &EngineConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            api,
            batch_delay: config.batch_delay,
            batch_size: batch_size.max(1),
            verb: Method::Patch,
            verb_confirmed: false,
            requests_sent: 0,
        }
    }

    /// Returns the number of append requests issued so far, including verb
    /// fallbacks and 413 resends.
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    /// Appends `children` to `parent_id`, preserving order, and returns the
    /// created block descriptors in request order.
    pub fn append(
        &mut self,
        parent_id: &str,
        children: &[serde_json::Value],
    ) -> EngineResult<Vec<RemoteBlock>> {
        let mut created = Vec::with_capacity(children.len());
        let mut cursor = 0usize;

        while cursor < children.len() {
            if self.requests_sent > 0 {
                self.api.pause(self.batch_delay);
            }
            let end = (cursor + self.batch_size).min(children.len());
            match self.send_batch(parent_id, &children[cursor..end]) {
                Ok(results) => {
                    created.extend(results);
                    cursor = end;
                }
                Err(PublishError::PayloadTooLarge) => {
                    if self.batch_size <= 1 {
                        return Err(PublishError::PayloadTooLarge);
                    }
                    self.batch_size /= 2;
                    debug!(
                        parent_id,
                        batch_size = self.batch_size,
                        "payload too large, shrinking batch"
                    );
                    // Same slice is resent at the smaller size.
                }
                Err(error) => return Err(error),
            }
        }

        Ok(created)
    }

    fn send_batch(
        &mut self,
        parent_id: &str,
        slice: &[serde_json::Value],
    ) -> EngineResult<Vec<RemoteBlock>> {
        self.requests_sent += 1;
        match self.api.append_children(self.verb, parent_id, slice) {
            Ok(appended) => {
                self.verb_confirmed = true;
                Ok(appended.results)
            }
            Err(error) if !self.verb_confirmed && verb_rejected(&error) => {
                let alternate = alternate_verb(self.verb);
                warn!(
                    parent_id,
                    rejected = self.verb.as_str(),
                    trying = alternate.as_str(),
                    "append verb rejected, trying alternate"
                );
                self.requests_sent += 1;
                let appended = self.api.append_children(alternate, parent_id, slice)?;
                self.verb = alternate;
                self.verb_confirmed = true;
                Ok(appended.results)
            }
            Err(error) => Err(error),
        }
    }
}

fn verb_rejected(error: &PublishError) -> bool {
    matches!(
        error,
        PublishError::MethodNotAllowed(_) | PublishError::Validation(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::retry::RecordingSleeper;
    use crate::transport::{ApiResponse, MockHttpClient};
    use serde_json::json;
    use std::sync::Arc;

    fn paragraphs(count: usize) -> Vec<serde_json::Value> {
        (0..count)
            .map(|i| json!({"type": "paragraph", "rich_text": [{"content": format!("b{i}")}]}))
            .collect()
    }

    fn results_response(count: usize, offset: usize) -> ApiResponse {
        let results: Vec<_> = (0..count)
            .map(|i| json!({"id": format!("blk-{}", offset + i), "type": "paragraph"}))
            .collect();
        ApiResponse::ok(json!({ "results": results }))
    }

    fn test_api(client: Arc<MockHttpClient>) -> BlockApi<Arc<MockHttpClient>> {
        BlockApi::new(
            client,
            RetryPolicy::no_retry(),
            Arc::new(RecordingSleeper::new()),
        )
    }

    #[test]
    fn splits_into_capped_batches_in_order() {
        let client = Arc::new(MockHttpClient::new());
        client.enqueue(results_response(100, 0));
        client.enqueue(results_response(100, 100));
        client.enqueue(results_response(50, 200));

        let api = test_api(client.clone());
        let config = EngineConfig::new().with_batch_delay(Duration::ZERO);
        let mut appender = BlockAppender::new(&api, &config);

        let created = appender.append("page-1", &paragraphs(250)).unwrap();

        assert_eq!(created.len(), 250);
        assert_eq!(created[0].id, "blk-0");
        assert_eq!(created[249].id, "blk-249");

        let requests = client.requests();
        assert_eq!(requests.len(), 3);
        let sizes: Vec<usize> = requests
            .iter()
            .map(|r| r.body.as_ref().unwrap()["children"].as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        // First block of each batch follows the previous batch's last.
        assert_eq!(
            requests[1].body.as_ref().unwrap()["children"][0]["rich_text"][0]["content"],
            "b100"
        );
    }

    #[test]
    fn single_batch_for_small_input() {
        let client = Arc::new(MockHttpClient::new());
        client.enqueue(results_response(3, 0));

        let api = test_api(client.clone());
        let config = EngineConfig::new();
        let mut appender = BlockAppender::new(&api, &config);

        appender.append("page-1", &paragraphs(3)).unwrap();
        assert_eq!(client.request_count(), 1);
        assert_eq!(appender.requests_sent(), 1);
    }

    #[test]
    fn shrinks_on_payload_too_large_then_succeeds() {
        let client = Arc::new(MockHttpClient::new());
        // 100 rejected, 50 rejected, then 25-sized batches accepted.
        client.enqueue(ApiResponse::with_status(413));
        client.enqueue(ApiResponse::with_status(413));
        for i in 0..4 {
            client.enqueue(results_response(25, i * 25));
        }

        let api = test_api(client.clone());
        let config = EngineConfig::new().with_batch_delay(Duration::ZERO);
        let mut appender = BlockAppender::new(&api, &config);

        let created = appender.append("page-1", &paragraphs(100)).unwrap();
        assert_eq!(created.len(), 100);

        let sizes: Vec<usize> = client
            .requests()
            .iter()
            .map(|r| r.body.as_ref().unwrap()["children"].as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![100, 50, 25, 25, 25, 25]);
    }

    #[test]
    fn persistent_payload_rejection_propagates_at_size_one() {
        let client = Arc::new(MockHttpClient::new());
        // 100 → 50 → 25 → 12 → 6 → 3 → 1, all rejected.
        for _ in 0..7 {
            client.enqueue(ApiResponse::with_status(413));
        }

        let api = test_api(client.clone());
        let config = EngineConfig::new().with_batch_delay(Duration::ZERO);
        let mut appender = BlockAppender::new(&api, &config);

        let error = appender.append("page-1", &paragraphs(100)).unwrap_err();
        assert_eq!(error, PublishError::PayloadTooLarge);

        let sizes: Vec<usize> = client
            .requests()
            .iter()
            .map(|r| r.body.as_ref().unwrap()["children"].as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![100, 50, 25, 12, 6, 3, 1]);
    }

    #[test]
    fn falls_back_to_alternate_verb_once_and_sticks() {
        let client = Arc::new(MockHttpClient::new());
        client.enqueue(ApiResponse {
            status: 405,
            retry_after: None,
            body: json!({"message": "use POST"}).to_string().into_bytes(),
        });
        client.enqueue(results_response(100, 0));
        client.enqueue(results_response(20, 100));

        let api = test_api(client.clone());
        let config = EngineConfig::new().with_batch_delay(Duration::ZERO);
        let mut appender = BlockAppender::new(&api, &config);

        let created = appender.append("page-1", &paragraphs(120)).unwrap();
        assert_eq!(created.len(), 120);

        let verbs: Vec<Method> = client.requests().iter().map(|r| r.method).collect();
        assert_eq!(verbs, vec![Method::Patch, Method::Post, Method::Post]);
    }

    #[test]
    fn verb_fallback_failure_is_a_hard_error() {
        let client = Arc::new(MockHttpClient::new());
        client.enqueue(ApiResponse {
            status: 400,
            retry_after: None,
            body: json!({"message": "invalid children"}).to_string().into_bytes(),
        });
        client.enqueue(ApiResponse {
            status: 400,
            retry_after: None,
            body: json!({"message": "invalid children"}).to_string().into_bytes(),
        });

        let api = test_api(client.clone());
        let config = EngineConfig::new();
        let mut appender = BlockAppender::new(&api, &config);

        let error = appender.append("page-1", &paragraphs(2)).unwrap_err();
        assert!(matches!(error, PublishError::Validation(_)));
        assert_eq!(client.request_count(), 2);
    }

    #[test]
    fn pauses_between_batches() {
        let client = Arc::new(MockHttpClient::new());
        client.enqueue(results_response(100, 0));
        client.enqueue(results_response(100, 100));
        client.enqueue(results_response(50, 200));

        let sleeper = Arc::new(RecordingSleeper::new());
        let api = BlockApi::new(client, RetryPolicy::no_retry(), sleeper.clone());
        let config = EngineConfig::new().with_batch_delay(Duration::from_millis(350));
        let mut appender = BlockAppender::new(&api, &config);

        appender.append("page-1", &paragraphs(250)).unwrap();

        let waits = sleeper.waits();
        assert_eq!(waits.len(), 2);
        assert!(waits.iter().all(|w| *w == Duration::from_millis(350)));
    }
}
