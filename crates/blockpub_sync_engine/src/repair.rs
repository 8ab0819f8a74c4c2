//! Best-effort table row recovery.
//!
//! Upstream converters occasionally lose the block/position association for
//! tables and deliver a table with at most its header row. When the raw
//! source text is available, the original rows can usually be re-derived by
//! matching the table's header against pipe-table runs in the source. This
//! is a heuristic enhancement, not a correctness guarantee: no match leaves
//! the table untouched.

use blockpub_model::{plain_text, RichText, Row, TableBlock};
use tracing::debug;

/// Strategy for recovering a table's rows from raw source text.
///
/// Swappable so tests can disable or replace recovery without touching the
/// append path.
pub trait TableRecovery: Send + Sync {
    /// Attempts to recover the full row list (header first) for `table`.
    ///
    /// Returns `None` when no confident match is found or the match would
    /// not add rows.
    fn recover_rows(&self, table: &TableBlock, source: &str) -> Option<Vec<Row>>;
}

/// Recovery disabled: always leaves tables as-is.
#[derive(Debug, Default)]
pub struct NoRecovery;

impl TableRecovery for NoRecovery {
    fn recover_rows(&self, _table: &TableBlock, _source: &str) -> Option<Vec<Row>> {
        None
    }
}

/// Default recovery: scan the source for pipe-table runs and match the
/// table's header cells against each run's first content row.
#[derive(Debug, Default)]
pub struct SourceTextRecovery;

impl TableRecovery for SourceTextRecovery {
    fn recover_rows(&self, table: &TableBlock, source: &str) -> Option<Vec<Row>> {
        let header = table.header_row()?;
        let wanted: Vec<String> = header
            .cells
            .iter()
            .map(|cell| normalize(&plain_text(cell)))
            .collect();
        if wanted.is_empty() || wanted.iter().all(String::is_empty) {
            return None;
        }

        for run in pipe_runs(source) {
            let content_rows: Vec<Vec<String>> = run
                .iter()
                .filter(|line| !is_separator_line(line))
                .map(|line| split_cells(line))
                .collect();
            let Some(first) = content_rows.first() else {
                continue;
            };
            let normalized: Vec<String> = first.iter().map(|cell| normalize(cell)).collect();
            if normalized != wanted {
                continue;
            }

            let mut rows = Vec::with_capacity(content_rows.len());
            rows.push(header.clone());
            rows.extend(
                content_rows[1..]
                    .iter()
                    .map(|cells| row_from_cells(cells, table.width)),
            );

            if rows.len() > table.rows.len() {
                debug!(
                    header = %plain_text(&header.cells.concat()),
                    recovered = rows.len(),
                    "recovered table rows from source text"
                );
                return Some(rows);
            }
            return None;
        }

        None
    }
}

/// Groups contiguous runs of lines that each contain a pipe character.
fn pipe_runs(source: &str) -> Vec<Vec<&str>> {
    let mut runs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in source.lines() {
        if line.contains('|') {
            current.push(line);
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// True for markdown alignment rows like `| --- | :---: |`.
fn is_separator_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| matches!(c, '-' | ':' | '|' | ' ' | '\t'))
}

/// Splits a pipe-table line into trimmed cells.
///
/// Pipes escaped with a backslash or inside backtick code spans do not
/// split; a single empty leading/trailing cell produced by a leading or
/// trailing `|` is dropped.
fn split_cells(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_code = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                current.push('|');
                chars.next();
            }
            '`' => {
                in_code = !in_code;
                current.push('`');
            }
            '|' if !in_code => {
                cells.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    cells.push(current.trim().to_string());

    let leading = line.trim_start().starts_with('|');
    let trailing = line.trim_end().ends_with('|') && !line.trim_end().ends_with("\\|");
    if trailing && cells.len() > 1 && cells.last().is_some_and(String::is_empty) {
        cells.pop();
    }
    if leading && cells.len() > 1 && cells.first().is_some_and(String::is_empty) {
        cells.remove(0);
    }
    cells
}

/// Lowercases and strips all whitespace for header comparison.
fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Builds a row from text cells, padded or truncated to `width`.
fn row_from_cells(cells: &[String], width: usize) -> Row {
    let mut out: Vec<Vec<RichText>> = cells
        .iter()
        .take(width)
        .map(|cell| {
            if cell.is_empty() {
                Vec::new()
            } else {
                vec![RichText::plain(cell.clone())]
            }
        })
        .collect();
    out.resize(width, Vec::new());
    Row::new(out)
}
