//! The query data model: options, status, rows, records, snapshots, pages.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::ErrorInfo;

/// Caller-supplied options for [`QueryRegistry::execute_query`](crate::registry::QueryRegistry::execute_query).
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Warehouse override for this query only.
    pub warehouse: Option<String>,
    /// Role override for this query only.
    pub role: Option<String>,
    /// Maximum time the query may spend before being finalized as [`QueryStatus::Timeout`].
    pub query_timeout: Option<Duration>,
    /// Interval between status-check polls, overriding the registry default.
    pub poll_interval: Option<Duration>,
    /// Cap on rows retained in memory for paging, overriding the registry default.
    pub max_inline_rows: Option<usize>,
}

/// Metadata for one column of a query's result set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Column name as reported by Snowflake.
    pub name: String,
    /// Snowflake's reported type name (e.g. `"FIXED"`, `"TEXT"`, `"TIMESTAMP_NTZ"`).
    #[serde(rename = "type")]
    pub type_name: String,
    /// Whether the column may contain `NULL`.
    pub nullable: bool,
}

/// A single typed cell value.
///
/// Kept distinct from [`serde_json::Value`] so the registry core never
/// depends on JSON in its hot paths; callers at the serialization boundary
/// convert into JSON via [`Row::to_json`].
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// SQL `NULL`.
    Null,
    /// A boolean value.
    Bool(bool),
    /// An integral value, wide enough for Snowflake's `NUMBER(38,0)` range in practice.
    Int(i64),
    /// A floating-point value.
    Float(f64),
    /// Everything else (text, dates, semi-structured JSON) carried as its
    /// Snowflake-rendered string form.
    Text(String),
}

impl CellValue {
    /// Project this cell into a [`serde_json::Value`] for the serialization boundary.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Bool(b) => serde_json::Value::Bool(*b),
            CellValue::Int(i) => serde_json::Value::Number((*i).into()),
            CellValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// A single row: an ordered map from column name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(pub Vec<(String, CellValue)>);

impl Row {
    /// Project this row into a JSON object, in column order.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// The lifecycle state of a registered query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    /// Registered, connection/submission not yet complete.
    Pending,
    /// Submitted to Snowflake and being polled for completion.
    Running,
    /// Completed successfully; results are available.
    Succeeded,
    /// Completed with a SQL error.
    Failed,
    /// Cancelled by the caller before reaching a terminal outcome.
    Canceled,
    /// Exceeded its configured `query_timeout`.
    Timeout,
}

impl QueryStatus {
    /// Whether this status is terminal (no further state transitions occur).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueryStatus::Succeeded | QueryStatus::Failed | QueryStatus::Canceled | QueryStatus::Timeout
        )
    }
}

/// Runtime-only bookkeeping for an in-flight query, never serialized.
pub(crate) struct QueryRuntime {
    /// Handle to the poller task, joined before the connection is closed.
    pub poller_handle: Option<tokio::task::JoinHandle<()>>,
    /// Cancellation signal observed by the poller's inter-poll sleep.
    pub cancel_tx: tokio::sync::watch::Sender<bool>,
    /// Snowflake-assigned statement handle, known once submission succeeds.
    pub server_query_id: Option<String>,
}

/// The full record the registry keeps for one query.
pub(crate) struct QueryRecord {
    pub query_id: String,
    pub status: QueryStatus,
    pub sql_text: String,
    pub created_at: Instant,
    pub created_at_wall: chrono::DateTime<chrono::Utc>,
    /// Set on the `PENDING -> RUNNING` transition, once submission succeeds.
    pub started_at: Option<Instant>,
    pub started_at_wall: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<Instant>,
    pub finished_at_wall: Option<chrono::DateTime<chrono::Utc>>,
    /// Starts as a defensive safety-net deadline set at creation, refreshed
    /// to a shorter post-completion grace period once the record reaches a
    /// terminal state. `prune_expired` removes any record past this point,
    /// tearing down a still-alive runtime first if one is unexpectedly found.
    pub ttl_expires_at: Instant,
    pub columns: Option<Vec<ColumnMeta>>,
    pub rows: Vec<Row>,
    /// Total rows Snowflake reported, which may exceed `rows.len()` once
    /// truncated to the query's `max_inline_rows` cap.
    pub total_row_count: Option<usize>,
    pub error: Option<ErrorInfo>,
    pub runtime: QueryRuntime,
}

/// The Snowflake-side identifier nested under a [`QuerySnapshot`]'s `snowflake` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnowflakeHandle {
    /// The driver-assigned statement handle, once submission has succeeded.
    pub sfqid: Option<String>,
}

/// A point-in-time, serializable view of a query's lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySnapshot {
    /// Registry-assigned identifier, stable for the query's lifetime.
    pub query_id: String,
    /// Original SQL text submitted for this query.
    pub sql: String,
    /// Current lifecycle state.
    pub status: QueryStatus,
    /// Wall-clock time the query was registered.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// `finished_at`, or the current time if still in flight.
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Wall-clock time of the `PENDING -> RUNNING` transition, if reached.
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Wall-clock time the query reached a terminal state, if any.
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Seconds between `started_at` and `finished_at` (or now, if still
    /// running); `None` if the query never started running.
    pub execution_time_seconds: Option<f64>,
    /// Total row count, available once the query reaches `SUCCEEDED`.
    pub row_count: Option<usize>,
    /// Column metadata, available once the query reaches `SUCCEEDED`.
    pub columns: Option<Vec<ColumnMeta>>,
    /// Failure detail, present only when `status` is a non-success terminal state.
    pub error: Option<ErrorInfo>,
    /// Snowflake-side identifiers for this query.
    pub snowflake: SnowflakeHandle,
}

/// One page of a query's result rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPage {
    /// Rows in this page, each projected to a JSON object keyed by column name.
    pub rows: Vec<BTreeMap<String, serde_json::Value>>,
    /// Offset of the first row in this page, relative to the full result set.
    pub offset: usize,
    /// Effective limit applied to this page (the requested limit, or every
    /// remaining row when the caller didn't supply one).
    pub limit: usize,
    /// Total number of rows in the complete result set.
    pub total_rows: usize,
    /// Whether further pages remain after this one.
    pub has_more: bool,
    /// Column metadata for the result set.
    pub columns: Option<Vec<ColumnMeta>>,
}

impl Row {
    pub(crate) fn to_btreemap(&self) -> BTreeMap<String, serde_json::Value> {
        self.0.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
    }
}
