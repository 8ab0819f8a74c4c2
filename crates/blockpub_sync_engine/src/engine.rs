//! Publish orchestration.

use crate::api::{BlockApi, ParentRef};
use crate::batch::BlockAppender;
use crate::config::EngineConfig;
use crate::error::{EngineResult, PublishError};
use crate::repair::{SourceTextRecovery, TableRecovery};
use crate::retry::{Sleeper, ThreadSleeper};
use crate::table::TableReconciler;
use crate::transport::HttpClient;
use blockpub_model::{prepare_blocks, Block, TableBlock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Where a published page lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishTarget {
    /// Direct child page of a fixed parent page.
    ParentPage(String),
    /// Entry in a database.
    Database(String),
}

impl PublishTarget {
    fn parent_ref(&self) -> ParentRef {
        match self {
            PublishTarget::ParentPage(id) => ParentRef::PageId {
                page_id: id.clone(),
            },
            PublishTarget::Database(id) => ParentRef::DatabaseId {
                database_id: id.clone(),
            },
        }
    }
}

/// Options controlling create-vs-update behavior for one publish call.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Look for an existing page with the exact title and replace its
    /// content instead of creating a duplicate.
    pub update_if_exists: bool,
    /// Create the page when no existing match is found.
    pub create_if_absent: bool,
    /// Raw source text, enables table row recovery for tables that arrive
    /// with at most their header row.
    pub source_text: Option<String>,
}

impl PublishOptions {
    /// Creates the default options: update existing, create when absent.
    pub fn new() -> Self {
        Self {
            update_if_exists: true,
            create_if_absent: true,
            source_text: None,
        }
    }

    /// Sets whether an existing page is updated.
    pub fn with_update_if_exists(mut self, update: bool) -> Self {
        self.update_if_exists = update;
        self
    }

    /// Sets whether a missing page is created.
    pub fn with_create_if_absent(mut self, create: bool) -> Self {
        self.create_if_absent = create;
        self
    }

    /// Supplies raw source text for table row recovery.
    pub fn with_source_text(mut self, source: impl Into<String>) -> Self {
        self.source_text = Some(source.into());
        self
    }
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifies a created or resolved remote page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// Page id.
    pub id: String,
    /// Page URL, when the service reported one.
    pub url: Option<String>,
    /// Page title.
    pub title: String,
}

/// Counters for one publish call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishStats {
    /// Content blocks appended to the page.
    pub blocks_appended: u64,
    /// Append requests issued, including table row batches.
    pub append_requests: u64,
    /// Existing child blocks deleted before the replace.
    pub blocks_deleted: u64,
    /// Tables that received second-phase rows.
    pub tables_reconciled: u32,
    /// Table rows appended beyond headers.
    pub rows_appended: u64,
    /// Tables whose rows were recovered from source text.
    pub tables_repaired: u32,
    /// Tables skipped because their remote id could not be resolved.
    pub tables_skipped: u32,
    /// Wall-clock duration of the call.
    pub duration: Duration,
}

/// Outcome of a publish call.
///
/// Errors are folded in rather than thrown: `success` is false and `error`
/// carries a short user-facing message. When the page had already been
/// created or resolved before the failure, `remote_id` is still set so the
/// caller can retry the same title and rely on full replace.
#[derive(Debug, Clone)]
pub struct PublishResult {
    /// Whether the publish completed.
    pub success: bool,
    /// Remote page id, when known.
    pub remote_id: Option<String>,
    /// Remote page URL, when known.
    pub url: Option<String>,
    /// The title that was published.
    pub title: String,
    /// Failure message, when `success` is false.
    pub error: Option<String>,
    /// True when an existing page was replaced rather than created.
    pub updated_existing: bool,
    /// Call counters.
    pub stats: PublishStats,
}

impl PublishResult {
    fn begin(title: &str) -> Self {
        Self {
            success: false,
            remote_id: None,
            url: None,
            title: title.to_string(),
            error: None,
            updated_existing: false,
            stats: PublishStats::default(),
        }
    }
}

/// Publishes block lists to a remote block-tree document service.
///
/// Holds no mutable state: every call's retry counters, batch cursor, and
/// table plan are call-local, so independent publishes may run concurrently
/// on the same engine from different threads.
pub struct PublishEngine<C: HttpClient> {
    api: BlockApi<C>,
    config: EngineConfig,
    recovery: Box<dyn TableRecovery>,
}

impl<C: HttpClient> PublishEngine<C> {
    /// Creates an engine over `client`.
    pub fn new(client: C, config: EngineConfig) -> Self {
        Self::with_sleeper(client, config, Arc::new(ThreadSleeper))
    }

    /// Creates an engine with an injected sleeper, so tests observe backoff
    /// and batch pacing without real waits.
    pub fn with_sleeper(client: C, config: EngineConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        let api = BlockApi::new(client, config.retry.clone(), sleeper);
        Self {
            api,
            config,
            recovery: Box::new(SourceTextRecovery),
        }
    }

    /// Replaces the table recovery strategy.
    pub fn with_recovery(mut self, recovery: Box<dyn TableRecovery>) -> Self {
        self.recovery = recovery;
        self
    }

    /// Publishes `blocks` as a page titled `title` under `target`.
    ///
    /// Update semantics are full replace: when an existing page with the
    /// exact title is found, all of its children are deleted before the new
    /// content is appended. No rollback is attempted on mid-sequence
    /// failure; the remote page may be left partially updated.
    pub fn publish(
        &self,
        title: &str,
        blocks: &[Block],
        target: &PublishTarget,
        options: &PublishOptions,
    ) -> PublishResult {
        let started = Instant::now();
        let mut result = PublishResult::begin(title);

        match self.run(title, blocks, target, options, &mut result) {
            Ok(()) => {
                result.success = true;
                info!(
                    title,
                    remote_id = result.remote_id.as_deref().unwrap_or(""),
                    updated = result.updated_existing,
                    blocks = result.stats.blocks_appended,
                    "publish complete"
                );
            }
            Err(error) => {
                warn!(title, %error, "publish failed");
                result.error = Some(error.to_string());
            }
        }

        result.stats.duration = started.elapsed();
        result
    }

    fn run(
        &self,
        title: &str,
        blocks: &[Block],
        target: &PublishTarget,
        options: &PublishOptions,
        result: &mut PublishResult,
    ) -> EngineResult<()> {
        let existing = if options.update_if_exists {
            self.resolve_existing(title, target)?
        } else {
            None
        };

        let page = match existing {
            Some(page) => {
                debug!(title, page_id = %page.id, "replacing existing page");
                result.updated_existing = true;
                result.remote_id = Some(page.id.clone());
                result.url = page.url.clone();
                result.stats.blocks_deleted = self.clear_children(&page.id)?;
                page
            }
            None if !options.create_if_absent => return Err(PublishError::TargetMissing),
            None => {
                let created = self.api.create_page(&target.parent_ref(), title)?;
                debug!(title, page_id = %created.id, "created page");
                result.remote_id = Some(created.id.clone());
                result.url = created.url.clone();
                RemoteRef {
                    id: created.id,
                    url: created.url,
                    title: title.to_string(),
                }
            }
        };

        let blocks = self.repair_tables(blocks, options, &mut result.stats);
        let content = prepare_blocks(&blocks);
        let children = content
            .blocks
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PublishError::Protocol(format!("failed to encode block: {e}")))?;

        let mut appender = BlockAppender::new(&self.api, &self.config);
        let created = appender.append(&page.id, &children)?;
        result.stats.blocks_appended = created.len() as u64;
        result.stats.append_requests = appender.requests_sent();

        let reconciler = TableReconciler::new(&self.api, &self.config);
        let filled = reconciler.reconcile(&page.id, &created, &content.plan)?;
        result.stats.tables_reconciled = filled.tables;
        result.stats.rows_appended = filled.rows;
        result.stats.tables_skipped = filled.skipped;
        result.stats.append_requests += filled.requests;

        Ok(())
    }

    /// Finds an existing page under `target` whose title matches exactly.
    ///
    /// A fixed parent page is scanned through its children listing, which is
    /// cheap and authoritative. A database goes through the query endpoint,
    /// falling back to platform search (filtered back to the target) on
    /// deployments that don't expose per-database query.
    fn resolve_existing(
        &self,
        title: &str,
        target: &PublishTarget,
    ) -> EngineResult<Option<RemoteRef>> {
        match target {
            PublishTarget::ParentPage(parent_id) => {
                let mut cursor: Option<String> = None;
                loop {
                    let page = self.api.list_children(parent_id, cursor.as_deref())?;
                    for child in page.results {
                        if child.block_type == "child_page"
                            && child.title.as_deref() == Some(title)
                        {
                            return Ok(Some(RemoteRef {
                                id: child.id,
                                url: child.url,
                                title: title.to_string(),
                            }));
                        }
                    }
                    if !page.has_more {
                        return Ok(None);
                    }
                    match page.next_cursor {
                        Some(next) => cursor = Some(next),
                        None => return Ok(None),
                    }
                }
            }
            PublishTarget::Database(database_id) => {
                let mut cursor: Option<String> = None;
                loop {
                    let matches =
                        match self.api.query_database(database_id, title, cursor.as_deref()) {
                            Ok(matches) => matches,
                            Err(PublishError::NotFound(_)) if cursor.is_none() => {
                                debug!(database_id, "query endpoint missing, using search");
                                return self.search_in_database(title, database_id);
                            }
                            Err(error) => return Err(error),
                        };
                    for page in matches.results {
                        if page.title.as_deref() == Some(title) {
                            return Ok(Some(RemoteRef {
                                id: page.id,
                                url: page.url,
                                title: title.to_string(),
                            }));
                        }
                    }
                    if !matches.has_more {
                        return Ok(None);
                    }
                    match matches.next_cursor {
                        Some(next) => cursor = Some(next),
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    fn search_in_database(
        &self,
        title: &str,
        database_id: &str,
    ) -> EngineResult<Option<RemoteRef>> {
        let mut cursor: Option<String> = None;
        loop {
            let matches = self.api.search_pages(title, cursor.as_deref())?;
            for page in matches.results {
                // Search is platform-wide and fuzzy; keep only exact titles
                // inside the target database.
                let in_target = page
                    .parent_id
                    .as_deref()
                    .is_some_and(|parent| parent == database_id);
                if in_target && page.title.as_deref() == Some(title) {
                    return Ok(Some(RemoteRef {
                        id: page.id,
                        url: page.url,
                        title: title.to_string(),
                    }));
                }
            }
            if !matches.has_more {
                return Ok(None);
            }
            match matches.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(None),
            }
        }
    }

    /// Deletes all children of `page_id`. The listing is walked to
    /// completion before any delete so pagination never observes its own
    /// mutations.
    fn clear_children(&self, page_id: &str) -> EngineResult<u64> {
        let children = self.api.all_children(page_id)?;
        let mut deleted = 0u64;
        for child in &children {
            self.api.delete_block(&child.id)?;
            deleted += 1;
        }
        if deleted > 0 {
            debug!(page_id, deleted, "cleared existing content");
        }
        Ok(deleted)
    }

    /// Runs table recovery over blocks whose row lists were truncated
    /// upstream. Only applies when source text was supplied.
    fn repair_tables(
        &self,
        blocks: &[Block],
        options: &PublishOptions,
        stats: &mut PublishStats,
    ) -> Vec<Block> {
        let Some(source) = options.source_text.as_deref() else {
            return blocks.to_vec();
        };

        blocks
            .iter()
            .map(|block| match block {
                Block::Table(table) if table.rows.len() <= 1 => {
                    match self.recovery.recover_rows(table, source) {
                        Some(rows) => {
                            stats.tables_repaired += 1;
                            Block::Table(TableBlock {
                                width: table.width,
                                has_header: table.has_header,
                                rows,
                            })
                        }
                        None => block.clone(),
                    }
                }
                _ => block.clone(),
            })
            .collect()
    }
}
