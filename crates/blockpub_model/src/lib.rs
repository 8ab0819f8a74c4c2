//! # Blockpub Model
//!
//! Abstract block-tree content types for blockpub.
//!
//! This crate provides:
//! - `Block` for document content units (paragraphs, headings, tables, ...)
//! - `Row` and `RichText` for table and inline content
//! - `AssetSource` for already-resolved image/file references
//! - Table preparation: truncating tables to their header row and recording
//!   the full row data in an out-of-band `TablePlan`
//!
//! Block lists are produced by an external converter and consumed by the
//! sync engine; this crate performs no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod block;
mod prepare;

pub use block::{plain_text, Annotations, AssetSource, Block, RichText, Row, TableBlock};
pub use prepare::{prepare_blocks, PreparedBlock, PreparedContent, TablePlan};
