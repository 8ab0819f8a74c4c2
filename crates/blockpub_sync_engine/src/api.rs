//! Typed operations against the remote document service.

use crate::config::RetryPolicy;
use crate::error::EngineResult;
use crate::retry::{RequestExecutor, Sleeper};
use crate::transport::{ApiRequest, HttpClient, Method};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// The parent a page is created under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParentRef {
    /// A parent page.
    PageId {
        /// The page id.
        page_id: String,
    },
    /// A database.
    DatabaseId {
        /// The database id.
        database_id: String,
    },
}

/// A block descriptor echoed by the service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteBlock {
    /// Block id.
    pub id: String,
    /// Block type tag (e.g. `paragraph`, `table`, `child_page`).
    #[serde(rename = "type")]
    pub block_type: String,
    /// Title, present on `child_page` entries.
    #[serde(default)]
    pub title: Option<String>,
    /// Page URL, present on `child_page` entries.
    #[serde(default)]
    pub url: Option<String>,
    /// Creation timestamp, RFC 3339.
    #[serde(default)]
    pub created_time: Option<String>,
}

/// Response to a page creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedPage {
    /// Page id.
    pub id: String,
    /// Page URL.
    #[serde(default)]
    pub url: Option<String>,
}

/// Response to a children append.
#[derive(Debug, Clone, Deserialize)]
pub struct AppendedChildren {
    /// Created block descriptors, in request order.
    pub results: Vec<RemoteBlock>,
}

/// One page of a children listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ChildrenPage {
    /// Blocks on this page, in document order.
    pub results: Vec<RemoteBlock>,
    /// Cursor for the next page.
    #[serde(default)]
    pub next_cursor: Option<String>,
    /// Whether more pages follow.
    #[serde(default)]
    pub has_more: bool,
}

/// One page entry from a database query or search.
#[derive(Debug, Clone, Deserialize)]
pub struct PageMatch {
    /// Page id.
    pub id: String,
    /// Page title.
    #[serde(default)]
    pub title: Option<String>,
    /// Page URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Id of the containing parent, when the endpoint reports it.
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// One page of query or search results.
#[derive(Debug, Clone, Deserialize)]
pub struct PageMatches {
    /// Matching pages.
    pub results: Vec<PageMatch>,
    /// Cursor for the next page.
    #[serde(default)]
    pub next_cursor: Option<String>,
    /// Whether more pages follow.
    #[serde(default)]
    pub has_more: bool,
}

/// Typed client for the block-tree document service.
///
/// Every call goes through the retrying executor; callers that pace their
/// own request sequences share its sleeper via [`BlockApi::pause`].
pub struct BlockApi<C: HttpClient> {
    executor: RequestExecutor<C>,
    sleeper: Arc<dyn Sleeper>,
}

impl<C: HttpClient> BlockApi<C> {
    /// Creates an API client over `client` with the given retry policy.
    pub fn new(client: C, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        let executor = RequestExecutor::with_sleeper(client, policy, Arc::clone(&sleeper));
        Self { executor, sleeper }
    }

    /// Blocks for `duration` using the shared sleeper.
    pub fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            self.sleeper.sleep(duration);
        }
    }

    /// Creates a page under `parent` with only its title set.
    pub fn create_page(&self, parent: &ParentRef, title: &str) -> EngineResult<CreatedPage> {
        let body = json!({
            "parent": parent,
            "properties": { "title": title },
        });
        let response = self.executor.execute(&ApiRequest::post("/pages", body))?;
        response.json()
    }

    /// Appends `children` to `block_id` using the given verb.
    pub fn append_children(
        &self,
        method: Method,
        block_id: &str,
        children: &[serde_json::Value],
    ) -> EngineResult<AppendedChildren> {
        let body = json!({ "children": children });
        let path = format!("/blocks/{block_id}/children");
        let response = self
            .executor
            .execute(&ApiRequest::with_body(method, path, body))?;
        response.json()
    }

    /// Deletes a block.
    pub fn delete_block(&self, block_id: &str) -> EngineResult<()> {
        self.executor
            .execute(&ApiRequest::delete(format!("/blocks/{block_id}")))?;
        Ok(())
    }

    /// Reads one page of a block's children.
    pub fn list_children(
        &self,
        block_id: &str,
        start_cursor: Option<&str>,
    ) -> EngineResult<ChildrenPage> {
        let path = match start_cursor {
            Some(cursor) => format!("/blocks/{block_id}/children?start_cursor={cursor}"),
            None => format!("/blocks/{block_id}/children"),
        };
        let response = self.executor.execute(&ApiRequest::get(path))?;
        response.json()
    }

    /// Reads all children of a block, walking the cursor to completion.
    pub fn all_children(&self, block_id: &str) -> EngineResult<Vec<RemoteBlock>> {
        let mut children = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.list_children(block_id, cursor.as_deref())?;
            children.extend(page.results);
            if !page.has_more {
                break;
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(children)
    }

    /// Queries a database for pages whose title equals `title` exactly.
    pub fn query_database(
        &self,
        database_id: &str,
        title: &str,
        start_cursor: Option<&str>,
    ) -> EngineResult<PageMatches> {
        let mut body = json!({
            "filter": { "property": "title", "equals": title },
        });
        if let Some(cursor) = start_cursor {
            body["start_cursor"] = json!(cursor);
        }
        let path = format!("/databases/{database_id}/query");
        let response = self.executor.execute(&ApiRequest::post(path, body))?;
        response.json()
    }

    /// Platform-wide page search. Results are ranked and fuzzy; callers
    /// filter for exact titles and target containment.
    pub fn search_pages(&self, query: &str, start_cursor: Option<&str>) -> EngineResult<PageMatches> {
        let mut body = json!({ "query": query });
        if let Some(cursor) = start_cursor {
            body["start_cursor"] = json!(cursor);
        }
        let response = self.executor.execute(&ApiRequest::post("/search", body))?;
        response.json()
    }
}
