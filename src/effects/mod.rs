//! Single-shot query wrappers shared by the non-registry MCP tools (list
//! schemas/tables/views, describe, sample, analyze, profile).
//!
//! These differ from [`QueryRegistry`](crate::registry::QueryRegistry) in
//! one respect: there is no background poller and no `query_id` a caller
//! polls later. Each function opens a connection, submits, waits for the
//! statement to finish, and returns the result (or error) directly — the
//! same open/submit/poll/fetch/close shape the registry uses internally,
//! just collapsed into a single call since nothing here runs long enough
//! to need paging across tool calls.

pub mod schema;
pub mod stats;

use std::time::{Duration, Instant};

use tracing::instrument;

use crate::connection::ConnectionProvider;
use crate::driver::{DriverStatus, QueryDriver};
use crate::error::{ErrorInfo, ErrorKind};
use crate::record::{ColumnMeta, Row};

/// Result of a single-shot query: columns plus every row, with no paging.
#[derive(Debug, Clone)]
pub struct EffectResult {
    /// Column metadata in result order.
    pub columns: Vec<ColumnMeta>,
    /// All rows returned by the statement.
    pub rows: Vec<Row>,
}

/// Conservative keyword check rejecting statements that look like writes.
///
/// Rejects a statement whose first non-whitespace, non-comment token is
/// `INSERT`, `UPDATE`, `DELETE`, `MERGE`, `CREATE`, `DROP`, `ALTER`,
/// `TRUNCATE`, `GRANT`, `REVOKE`, `COPY INTO`, or `PUT`, case-insensitively.
/// This is a heuristic, not a SQL parser: it exists to catch the common
/// case, not to be a security boundary.
pub fn looks_like_write(sql_text: &str) -> bool {
    const WRITE_KEYWORDS: &[&str] = &[
        "INSERT", "UPDATE", "DELETE", "MERGE", "CREATE", "DROP", "ALTER", "TRUNCATE", "GRANT",
        "REVOKE", "COPY", "PUT",
    ];

    let mut stripped = sql_text.trim_start();
    loop {
        if let Some(rest) = stripped.strip_prefix("--") {
            stripped = rest.split_once('\n').map(|(_, r)| r).unwrap_or("").trim_start();
            continue;
        }
        break;
    }

    let first_word: String = stripped
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_uppercase();

    WRITE_KEYWORDS.contains(&first_word.as_str())
}

/// Open a connection, submit `sql_text`, poll until terminal, and return
/// the result (or error) directly. Used by every effect handler below.
#[instrument(skip(connections, driver, sql_text), fields(sql_len = sql_text.len()))]
pub(crate) async fn run_to_completion(
    connections: &dyn ConnectionProvider,
    driver: &dyn QueryDriver,
    sql_text: &str,
    warehouse: Option<&str>,
    role: Option<&str>,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<EffectResult, ErrorInfo> {
    let connection = connections.new_connection(warehouse, role).await?;

    let result = async {
        let server_query_id = driver.submit_async(&connection, sql_text).await?;
        let deadline = Instant::now() + timeout;

        loop {
            if Instant::now() >= deadline {
                return Err(ErrorInfo::new(ErrorKind::Timeout, "effect query exceeded its timeout"));
            }

            match driver.check_status(&connection, &server_query_id).await? {
                DriverStatus::Running => {
                    tokio::time::sleep(poll_interval).await;
                }
                DriverStatus::Succeeded => {
                    let fetched = driver.fetch_results(&connection, &server_query_id).await?;
                    return Ok(EffectResult {
                        columns: fetched.columns,
                        rows: fetched.rows,
                    });
                }
                DriverStatus::Failed(info) => return Err(info),
            }
        }
    }
    .await;

    connections.close_safely(connection).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_common_write_statements_case_insensitively() {
        assert!(looks_like_write("insert into t values (1)"));
        assert!(looks_like_write("  DELETE FROM t"));
        assert!(looks_like_write("Merge into t using s on ..."));
        assert!(looks_like_write("CREATE TABLE t (x int)"));
        assert!(looks_like_write("copy into t from @stage"));
        assert!(looks_like_write("PUT file:///tmp/x @stage"));
    }

    #[test]
    fn allows_reads_and_skips_leading_comments() {
        assert!(!looks_like_write("select * from t"));
        assert!(!looks_like_write("-- a comment\nselect 1"));
        assert!(!looks_like_write("WITH cte AS (select 1) select * from cte"));
    }
}
