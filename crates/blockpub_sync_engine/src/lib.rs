//! # Blockpub Sync Engine
//!
//! Remote block-tree synchronization engine for blockpub.
//!
//! This crate provides:
//! - Exact-title create-or-update publishing with full-replace semantics
//! - Adaptive batching under item caps and payload-size ceilings
//! - Status-classified retry/backoff (rate limits, server errors, network)
//! - Two-phase table creation (shell first, rows appended afterwards)
//! - Best-effort table row recovery from raw source text
//! - A blocking HTTP client abstraction with an optional `reqwest` adapter
//!
//! ## Architecture
//!
//! A publish call runs as a strictly sequential chain of network operations,
//! because remote append order encodes document order. The engine holds no
//! state between calls; retry counters, the batch cursor, the working verb,
//! and the table plan are all call-local, so independent publishes may run
//! concurrently from different threads.
//!
//! ## Key invariants
//!
//! - Block order is preserved exactly through batching
//! - A table shell is always created with exactly one row
//! - A concurrent external edit to the target page can be lost: full replace
//!   performs no optimistic-concurrency check
//! - Partially applied publishes are not rolled back on mid-sequence failure

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod batch;
mod config;
mod engine;
mod error;
#[cfg(feature = "reqwest")]
mod http;
mod repair;
mod retry;
mod table;
mod transport;

pub use api::{
    AppendedChildren, BlockApi, ChildrenPage, CreatedPage, PageMatch, PageMatches, ParentRef,
    RemoteBlock,
};
pub use batch::BlockAppender;
pub use config::{EngineConfig, RetryPolicy, StatusClass};
pub use engine::{
    PublishEngine, PublishOptions, PublishResult, PublishStats, PublishTarget, RemoteRef,
};
pub use error::{EngineResult, PublishError};
#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
pub use repair::{NoRecovery, SourceTextRecovery, TableRecovery};
pub use retry::{RecordingSleeper, RequestExecutor, Sleeper, ThreadSleeper};
pub use table::{ReconcileStats, TableReconciler};
pub use transport::{ApiRequest, ApiResponse, HttpClient, Method, MockHttpClient};
