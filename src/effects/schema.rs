//! Schema-browsing and ad hoc query effects: list schemas/tables/views,
//! describe a table, run a read-only query, sample rows.

use std::time::Duration;

use crate::connection::ConnectionProvider;
use crate::driver::QueryDriver;
use crate::error::{ErrorInfo, ErrorKind};
use crate::record::Row;

use super::{looks_like_write, run_to_completion, EffectResult};

/// List the schemas visible to the current role in `database`.
pub async fn list_schemas(
    connections: &dyn ConnectionProvider,
    driver: &dyn QueryDriver,
    database: &str,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<Vec<Row>, ErrorInfo> {
    let sql = format!("SHOW SCHEMAS IN DATABASE {database}");
    let result = run_to_completion(connections, driver, &sql, None, None, poll_interval, timeout).await?;
    Ok(result.rows)
}

/// List the tables in `database.schema`, optionally filtered by a `LIKE` pattern.
pub async fn list_tables(
    connections: &dyn ConnectionProvider,
    driver: &dyn QueryDriver,
    database: &str,
    schema: &str,
    like_pattern: Option<&str>,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<Vec<Row>, ErrorInfo> {
    let sql = match like_pattern {
        Some(pattern) => format!(
            "SHOW TABLES LIKE '{}' IN SCHEMA {database}.{schema}",
            pattern.replace('\'', "''")
        ),
        None => format!("SHOW TABLES IN SCHEMA {database}.{schema}"),
    };
    let result = run_to_completion(connections, driver, &sql, None, None, poll_interval, timeout).await?;
    Ok(result.rows)
}

/// List the views in `database.schema`.
pub async fn list_views(
    connections: &dyn ConnectionProvider,
    driver: &dyn QueryDriver,
    database: &str,
    schema: &str,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<Vec<Row>, ErrorInfo> {
    let sql = format!("SHOW VIEWS IN SCHEMA {database}.{schema}");
    let result = run_to_completion(connections, driver, &sql, None, None, poll_interval, timeout).await?;
    Ok(result.rows)
}

/// Describe the columns of `database.schema.table`.
pub async fn describe_table(
    connections: &dyn ConnectionProvider,
    driver: &dyn QueryDriver,
    database: &str,
    schema: &str,
    table: &str,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<EffectResult, ErrorInfo> {
    let sql = format!("DESCRIBE TABLE {database}.{schema}.{table}");
    run_to_completion(connections, driver, &sql, None, None, poll_interval, timeout).await
}

/// Run a read-only query and return its full result.
///
/// Rejects `sql_text` outright (without opening a connection) if it looks
/// like a write per [`looks_like_write`].
pub async fn execute_read_only_query(
    connections: &dyn ConnectionProvider,
    driver: &dyn QueryDriver,
    sql_text: &str,
    warehouse: Option<&str>,
    role: Option<&str>,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<EffectResult, ErrorInfo> {
    if looks_like_write(sql_text) {
        return Err(ErrorInfo::new(
            ErrorKind::Submit,
            "statement looks like a write and is rejected by the read-only query tool",
        ));
    }
    run_to_completion(connections, driver, sql_text, warehouse, role, poll_interval, timeout).await
}

/// Sample up to `limit` rows from `database.schema.table`.
pub async fn sample_rows(
    connections: &dyn ConnectionProvider,
    driver: &dyn QueryDriver,
    database: &str,
    schema: &str,
    table: &str,
    limit: usize,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<EffectResult, ErrorInfo> {
    let sql = format!("SELECT * FROM {database}.{schema}.{table} LIMIT {limit}");
    run_to_completion(connections, driver, &sql, None, None, poll_interval, timeout).await
}
