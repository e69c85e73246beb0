//! # msgraph-batch
//!
//! Batched request execution for Microsoft Graph style `$batch` endpoints.
//!
//! Many logical API operations go in; grouped HTTP calls of at most 20
//! sub-operations go out; a flat, per-operation result set comes back with
//! server-driven pagination already resolved and transient failures retried.
//! The point is to cut round-trips against a rate-limited API while giving
//! callers a plain "one call in, one result set out" contract.
//!
//! ## Overview
//!
//! - **Batching**: request lists are partitioned into order-preserving groups
//!   of at most 20, the endpoint's hard envelope limit.
//! - **Retry**: transient sub-responses (429/500/502/503/504) are retried with
//!   Retry-After awareness and exponential backoff, bounded per group; ids
//!   that exhaust their retries get an explicit failure entry.
//! - **Pagination**: `@odata.nextLink` continuations are themselves batched
//!   and followed until no page remains, each page folding into its
//!   originating request's result.
//! - **Sequential by design**: one HTTP call is in flight at a time; backoff
//!   is an awaited sleep, never a race between retries of the same group.
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Caller-facing [`BatchClient`] and configuration |
//! | [`transport`] | [`transport::BatchTransport`] seam and the reqwest-backed implementation |
//! | [`types`] | Requests, wire envelopes, result entries, statistics |
//! | [`error`] | Unified error type |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use msgraph_batch::{BatchClient, BatchRequest};
//!
//! #[tokio::main]
//! async fn main() -> msgraph_batch::Result<()> {
//!     let client = BatchClient::builder("access-token").build()?;
//!
//!     let requests = vec![
//!         BatchRequest::get("me", "/me"),
//!         BatchRequest::get("team", "/groups/42/members"),
//!     ];
//!
//!     let results = client.execute_collect(requests).await?;
//!     for entry in &results.entries {
//!         println!("{}: HTTP {}", entry.id, entry.status);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod transport;
pub mod types;

mod executor;
mod pagination;
mod partition;
mod query;

pub use client::{BatchClient, BatchClientBuilder, BatchConfig};
pub use error::Error;
pub use partition::MAX_BATCH_SIZE;
pub use transport::{ApiVersion, BatchTransport, HttpTransport};
pub use types::{
    BatchOutput, BatchRequest, BatchResults, BatchStats, ContinuationLink, EnvelopeRequest,
    OutputFormat, ResultEntry, SubResponse,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
