//! Snowflake MCP Registry — async query lifecycle core for a Snowflake MCP server.
//!
//! This crate manages long-running asynchronous Snowflake queries whose
//! lifecycle spans multiple MCP tool calls: a client submits a query, polls
//! for status, and later pages through the result. The hard part is not the
//! request/response plumbing (that's a thin wrapper, see [`tools`]) — it's
//! the concurrent state machine that tracks each in-flight query, polls the
//! Snowflake SQL API in the background, and tears connections down in the
//! right order when a query is cancelled or the server shuts down.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        MCP tool calls                            │
//! │        execute_query / cancel / get_status / fetch_result        │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        QueryRegistry                              │
//! │   mutex-guarded map: query_id -> QueryRecord                      │
//! │   spawns one Poller task per in-flight query                      │
//! └─────────────────────────────────────────────────────────────────┘
//!           │                       │                     │
//!           ▼                       ▼                     ▼
//! ┌─────────────────┐    ┌───────────────────┐   ┌──────────────────┐
//! │ ConnectionProvider│    │  BlockingExecutor  │   │    QueryDriver   │
//! │  opens/closes     │    │  runs driver calls │   │ submit/status/   │
//! │  connections       │    │  off the scheduler │   │ fetch/cancel     │
//! └─────────────────┘    └───────────────────┘   └──────────────────┘
//! ```
//!
//! # Query Lifecycle
//!
//! ```text
//!                 ┌─────────┐
//!                 │ PENDING │
//!                 └────┬────┘
//!                      │ connection opened, async-submit accepted
//!                      ▼
//!                 ┌─────────┐
//!        ┌─────────│ RUNNING │─────────┬──────────┐
//!        │         └────┬────┘         │          │
//!   cancel()        poll loop     query_timeout  (never: retried)
//!        │               │              │
//!        ▼               ▼              ▼
//!  ┌───────────┐   ┌───────────┐  ┌──────────┐
//!  │ CANCELED  │   │ SUCCEEDED │  │ TIMEOUT  │
//!  └───────────┘   │  / FAILED │  └──────────┘
//!                   └───────────┘
//! ```
//!
//! # Modules
//!
//! - [`config`]: process-wide configuration loaded from environment variables.
//! - [`error`]: the query-lifecycle error taxonomy (`ErrorKind`/`ErrorInfo`)
//!   plus `RegistryError`/`ConfigError` for programmer-facing failures.
//! - [`record`]: the data model — `QueryRecord`, `QueryRuntime`, `QuerySnapshot`,
//!   `QueryPage`, `QueryOptions`, `ColumnMeta`, `Row`.
//! - [`connection`]: the `ConnectionProvider` contract and the Snowflake HTTP
//!   implementation.
//! - [`driver`]: the `QueryDriver` contract (submit/status/fetch/cancel)
//!   isolating the Snowflake SQL API behind a trait.
//! - [`executor`]: `BlockingExecutor`, a thin `spawn_blocking` wrapper.
//! - [`registry`]: `QueryRegistry`, the public API described above.
//! - [`poller`]: the per-query background polling task and its finalizer.
//! - [`effects`]: simple single-shot query wrappers shared with other MCP
//!   tools (list schemas/tables/views, describe, sample, analyze, profile).
//! - [`tools`]: thin MCP tool-shaped wrappers around the registry.

#![deny(missing_docs)]

pub mod config;
pub mod connection;
pub mod driver;
pub mod effects;
pub mod error;
pub mod executor;
pub mod poller;
pub mod record;
pub mod registry;
pub mod tools;

pub use config::RegistryConfig;
pub use error::{ErrorInfo, ErrorKind, RegistryError};
pub use record::{QueryOptions, QueryPage, QuerySnapshot, QueryStatus};
pub use registry::{QueryRegistry, RegistryDefaults};
