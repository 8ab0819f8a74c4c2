//! Second-phase table row appends.
//!
//! A table shell is created carrying only its header row; the remaining rows
//! are appended afterwards as children of the created table block. Rows go
//! out in smaller batches than ordinary content.

use crate::api::{BlockApi, RemoteBlock};
use crate::batch::BlockAppender;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::transport::HttpClient;
use blockpub_model::{Row, TablePlan};
use tracing::{debug, warn};

/// Counters from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Tables that received rows.
    pub tables: u32,
    /// Rows appended across all tables.
    pub rows: u64,
    /// Tables skipped because their remote id could not be resolved.
    pub skipped: u32,
    /// Row append requests issued.
    pub requests: u64,
}

/// Fills table rows after the table shells exist remotely.
pub struct TableReconciler<'a, C: HttpClient> {
    api: &'a BlockApi<C>,
    config: &'a EngineConfig,
}

impl<'a, C: HttpClient> TableReconciler<'a, C> {
    /// Creates a reconciler.
    pub fn new(api: &'a BlockApi<C>, config: &'a EngineConfig) -> Self {
        Self { api, config }
    }

    /// Appends each table's rows beyond the header, walking the plan in
    /// document order.
    ///
    /// `created` is the append response for `prepared`, parallel by index.
    /// A table whose id cannot be resolved even from the parent's children
    /// is skipped rather than failing the whole publish; append failures on
    /// a resolved table propagate.
    pub fn reconcile(
        &self,
        parent_id: &str,
        created: &[RemoteBlock],
        plan: &TablePlan,
    ) -> EngineResult<ReconcileStats> {
        let mut stats = ReconcileStats::default();

        for (&index, rows) in plan {
            if rows.len() <= 1 {
                // Header-only (or empty) table, nothing to fill.
                continue;
            }
            let data_rows = &rows[1..];

            let Some(table_id) = self.resolve_table_id(parent_id, created, index) else {
                warn!(parent_id, index, "table id unresolved, skipping row fill");
                stats.skipped += 1;
                continue;
            };

            let values: Vec<serde_json::Value> = data_rows.iter().map(table_row_value).collect();
            let mut appender = BlockAppender::with_batch_size(
                self.api,
                self.config,
                self.config.table_row_batch_size,
            );
            appender.append(&table_id, &values)?;

            debug!(table_id, rows = data_rows.len(), "table rows appended");
            stats.tables += 1;
            stats.rows += data_rows.len() as u64;
            stats.requests += appender.requests_sent();
        }

        Ok(stats)
    }

    /// Resolves the remote id of the table created for block `index`.
    ///
    /// Normally the append response echoes it. When it doesn't, scan the
    /// parent's children for the newest table-typed child.
    fn resolve_table_id(
        &self,
        parent_id: &str,
        created: &[RemoteBlock],
        index: usize,
    ) -> Option<String> {
        if let Some(block) = created.get(index) {
            if block.block_type == "table" {
                return Some(block.id.clone());
            }
        }

        match self.api.all_children(parent_id) {
            Ok(children) => {
                let tables: Vec<&RemoteBlock> = children
                    .iter()
                    .filter(|child| child.block_type == "table")
                    .collect();
                let newest = tables
                    .iter()
                    .filter(|t| t.created_time.is_some())
                    .max_by(|a, b| a.created_time.cmp(&b.created_time))
                    .copied()
                    .or_else(|| tables.last().copied());
                newest.map(|t| t.id.clone())
            }
            Err(error) => {
                warn!(parent_id, %error, "children scan for table discovery failed");
                None
            }
        }
    }
}

/// Serializes one data row as a table-row child block.
fn table_row_value(row: &Row) -> serde_json::Value {
    serde_json::json!({
        "type": "table_row",
        "cells": row.cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::retry::RecordingSleeper;
    use crate::transport::{ApiResponse, MockHttpClient};
    use blockpub_model::prepare_blocks;
    use blockpub_model::Block;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn rows(count: usize) -> Vec<Row> {
        (0..count)
            .map(|i| Row::from_strings(&[&format!("a{i}"), &format!("b{i}")]))
            .collect()
    }

    fn test_api(client: Arc<MockHttpClient>) -> BlockApi<Arc<MockHttpClient>> {
        BlockApi::new(
            client,
            RetryPolicy::no_retry(),
            Arc::new(RecordingSleeper::new()),
        )
    }

    fn row_results(count: usize) -> ApiResponse {
        let results: Vec<_> = (0..count)
            .map(|i| json!({"id": format!("row-{i}"), "type": "table_row"}))
            .collect();
        ApiResponse::ok(json!({ "results": results }))
    }

    fn created_table(id: &str) -> RemoteBlock {
        RemoteBlock {
            id: id.into(),
            block_type: "table".into(),
            title: None,
            url: None,
            created_time: None,
        }
    }

    #[test]
    fn fills_rows_in_sub_batches_of_ten() {
        let client = Arc::new(MockHttpClient::new());
        client.enqueue(row_results(10));
        client.enqueue(row_results(10));
        client.enqueue(row_results(5));

        let api = test_api(client.clone());
        let config = EngineConfig::new().with_batch_delay(Duration::ZERO);
        let reconciler = TableReconciler::new(&api, &config);

        // Header + 25 data rows.
        let content = prepare_blocks(&[Block::table(2, true, rows(26))]);
        let stats = reconciler
            .reconcile("page-1", &[created_table("tbl-1")], &content.plan)
            .unwrap();

        assert_eq!(stats.tables, 1);
        assert_eq!(stats.rows, 25);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.requests, 3);

        let requests = client.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests
            .iter()
            .all(|r| r.path == "/blocks/tbl-1/children"));
        let sizes: Vec<usize> = requests
            .iter()
            .map(|r| r.body.as_ref().unwrap()["children"].as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        // First appended row is the first data row, not the header.
        assert_eq!(
            requests[0].body.as_ref().unwrap()["children"][0]["cells"][0][0]["content"],
            "a1"
        );
    }

    #[test]
    fn header_only_and_empty_tables_are_no_ops() {
        let client = Arc::new(MockHttpClient::new());
        let api = test_api(client.clone());
        let config = EngineConfig::new();
        let reconciler = TableReconciler::new(&api, &config);

        let content = prepare_blocks(&[
            Block::table(2, true, rows(1)),
            Block::table(2, false, Vec::new()),
        ]);
        let stats = reconciler
            .reconcile(
                "page-1",
                &[created_table("tbl-1"), created_table("tbl-2")],
                &content.plan,
            )
            .unwrap();

        assert_eq!(stats, ReconcileStats::default());
        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn discovers_table_id_from_children_when_not_echoed() {
        let client = Arc::new(MockHttpClient::new());
        // Children scan: a paragraph and two tables; the later-created wins.
        client.enqueue(ApiResponse::ok(json!({
            "results": [
                {"id": "p", "type": "paragraph", "created_time": "2026-08-01T10:00:00Z"},
                {"id": "tbl-old", "type": "table", "created_time": "2026-08-01T10:00:01Z"},
                {"id": "tbl-new", "type": "table", "created_time": "2026-08-01T10:00:02Z"},
            ],
            "has_more": false,
        })));
        client.enqueue(row_results(2));

        let api = test_api(client.clone());
        let config = EngineConfig::new().with_batch_delay(Duration::ZERO);
        let reconciler = TableReconciler::new(&api, &config);

        let content = prepare_blocks(&[Block::table(2, true, rows(3))]);
        // Append response echoed nothing.
        let stats = reconciler.reconcile("page-1", &[], &content.plan).unwrap();

        assert_eq!(stats.tables, 1);
        assert_eq!(stats.rows, 2);

        let requests = client.requests();
        assert_eq!(requests[0].path, "/blocks/page-1/children");
        assert_eq!(requests[1].path, "/blocks/tbl-new/children");
    }

    #[test]
    fn unresolvable_table_is_skipped_not_fatal() {
        let client = Arc::new(MockHttpClient::new());
        // Children scan finds no table.
        client.enqueue(ApiResponse::ok(json!({
            "results": [{"id": "p", "type": "paragraph"}],
            "has_more": false,
        })));

        let api = test_api(client.clone());
        let config = EngineConfig::new();
        let reconciler = TableReconciler::new(&api, &config);

        let content = prepare_blocks(&[Block::table(2, true, rows(3))]);
        let stats = reconciler.reconcile("page-1", &[], &content.plan).unwrap();

        assert_eq!(stats.tables, 0);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn discovery_scan_failure_degrades_to_skip() {
        let client = Arc::new(MockHttpClient::new());
        client.enqueue(ApiResponse::with_status(404));

        let api = test_api(client.clone());
        let config = EngineConfig::new();
        let reconciler = TableReconciler::new(&api, &config);

        let content = prepare_blocks(&[Block::table(2, true, rows(2))]);
        let stats = reconciler.reconcile("page-1", &[], &content.plan).unwrap();

        assert_eq!(stats.skipped, 1);
    }
}
