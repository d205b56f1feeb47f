//! Thin MCP tool-shaped wrappers around [`QueryRegistry`].
//!
//! Each function takes JSON-ish arguments and returns a [`serde_json::Value`],
//! standing in for what an MCP tool-calling layer (e.g. `rmcp`) would
//! register as a callable tool. Transport and tool-discovery handshake are
//! out of scope here; this module is the seam where that layer would plug in.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::record::QueryOptions;
use crate::registry::QueryRegistry;

/// Arguments for [`execute_query_tool`].
#[derive(Debug, Deserialize)]
pub struct ExecuteQueryArgs {
    /// SQL text to execute.
    pub sql_text: String,
    /// Warehouse override for this query only.
    pub warehouse: Option<String>,
    /// Role override for this query only.
    pub role: Option<String>,
    /// Maximum time in seconds the query may run before being finalized as `TIMEOUT`.
    pub query_timeout_secs: Option<u64>,
    /// Interval in milliseconds between status-check polls.
    pub poll_interval_ms: Option<u64>,
    /// Cap on rows retained in memory for paging, overriding the registry default.
    pub max_inline_rows: Option<usize>,
}

/// Submit a query for asynchronous execution. Returns `{"query_id": "..."}`.
pub async fn execute_query_tool(registry: &Arc<QueryRegistry>, args: ExecuteQueryArgs) -> serde_json::Value {
    let options = QueryOptions {
        warehouse: args.warehouse,
        role: args.role,
        query_timeout: args.query_timeout_secs.map(Duration::from_secs),
        poll_interval: args.poll_interval_ms.map(Duration::from_millis),
        max_inline_rows: args.max_inline_rows,
    };
    let query_id = registry.execute_query(args.sql_text, options).await;
    json!({ "query_id": query_id })
}

/// Cancel a query. Returns `{"canceled": bool}`.
pub async fn cancel_query_tool(registry: &QueryRegistry, query_id: &str) -> serde_json::Value {
    let canceled = registry.cancel(query_id).await;
    json!({ "canceled": canceled })
}

/// Get a query's current status snapshot. Returns the snapshot as JSON, or
/// `{"error": "unknown query_id"}` if the id is unknown.
pub fn get_query_status_tool(registry: &QueryRegistry, query_id: &str) -> serde_json::Value {
    match registry.get_snapshot(query_id) {
        Some(snapshot) => {
            serde_json::to_value(snapshot).unwrap_or(json!({"error": "failed to serialize snapshot"}))
        }
        None => json!({ "error": "unknown query_id" }),
    }
}

/// Fetch a page of a query's results. Returns the page as JSON, or
/// `{"error": "..."}` if the id is unknown, the query hasn't succeeded, or
/// `offset` is past the end of the result set.
pub fn fetch_query_result_tool(
    registry: &QueryRegistry,
    query_id: &str,
    offset: usize,
    limit: Option<usize>,
) -> serde_json::Value {
    match registry.fetch_result(query_id, offset, limit) {
        Some(page) => serde_json::to_value(page).unwrap_or(json!({"error": "failed to serialize page"})),
        None => json!({ "error": "unknown query_id, query not yet succeeded, or offset past end of result set" }),
    }
}

/// List every query the registry currently holds a record for, optionally
/// filtered to a single status. Returns
/// `{"queries": [{"query_id": "...", "status": "..."}]}`.
pub fn list_queries_tool(
    registry: &QueryRegistry,
    status_filter: Option<crate::record::QueryStatus>,
) -> serde_json::Value {
    let queries: Vec<serde_json::Value> = registry
        .list_queries(status_filter)
        .into_iter()
        .map(|(query_id, status)| json!({ "query_id": query_id, "status": status }))
        .collect();
    json!({ "queries": queries })
}
