//! Table preparation.
//!
//! Remote table-creation APIs reject a table with zero rows, and rows beyond
//! the first must be appended as children of the created table block. The
//! preparation step therefore truncates every table to a single row and
//! records the full row list per block index in a [`TablePlan`], from which
//! the engine fills the remaining rows after the shell exists.

use crate::block::{Block, Row, TableBlock};
use serde::Serialize;
use std::collections::BTreeMap;

/// Full original row list per table block index.
///
/// An entry exists for every table block, even when its row list is empty
/// (row reconciliation is then a no-op). Ordered by block index so tables
/// are filled in document order.
pub type TablePlan = BTreeMap<usize, Vec<Row>>;

/// The remote-submittable shape of a block.
///
/// Identical to the source block except for tables, which carry exactly one
/// row: the header, or a synthesized all-empty row of the declared width if
/// the table had no rows at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PreparedBlock(Block);

impl PreparedBlock {
    /// Returns the underlying block.
    pub fn as_block(&self) -> &Block {
        &self.0
    }

    /// Consumes the wrapper and returns the underlying block.
    pub fn into_block(self) -> Block {
        self.0
    }
}

/// An append-safe block list plus the row data held back from tables.
#[derive(Debug, Clone)]
pub struct PreparedContent {
    /// Blocks in their original order, tables truncated.
    pub blocks: Vec<PreparedBlock>,
    /// Full row list per table block index.
    pub plan: TablePlan,
}

/// Prepares a block list for remote submission.
///
/// Block order is preserved exactly; non-table blocks are copied unchanged.
pub fn prepare_blocks(blocks: &[Block]) -> PreparedContent {
    let mut prepared = Vec::with_capacity(blocks.len());
    let mut plan = TablePlan::new();

    for (index, block) in blocks.iter().enumerate() {
        match block {
            Block::Table(table) => {
                plan.insert(index, table.rows.clone());
                let shell_row = table
                    .rows
                    .first()
                    .cloned()
                    .unwrap_or_else(|| Row::empty(table.width));
                prepared.push(PreparedBlock(Block::Table(TableBlock {
                    width: table.width,
                    has_header: table.has_header,
                    rows: vec![shell_row],
                })));
            }
            other => prepared.push(PreparedBlock(other.clone())),
        }
    }

    PreparedContent {
        blocks: prepared,
        plan,
    }
}
