//! The [`QueryDriver`] contract, isolating the Snowflake SQL API behind a trait.

use async_trait::async_trait;
use serde::Deserialize;

use crate::connection::SnowflakeConnection;
use crate::error::{ErrorInfo, ErrorKind};
use crate::record::{CellValue, ColumnMeta, Row};

/// Outcome of a single status check against an in-flight statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverStatus {
    /// Still executing on Snowflake's side.
    Running,
    /// Finished successfully; results can be fetched.
    Succeeded,
    /// Finished with a SQL error.
    Failed(ErrorInfo),
}

/// The result of a completed statement.
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub struct DriverResult {
    /// Column metadata in result order.
    pub columns: Vec<ColumnMeta>,
    /// All rows of the result set.
    pub rows: Vec<Row>,
}

/// Talks to the Snowflake SQL API v2 `/api/v2/statements` endpoint on
/// behalf of the registry and poller.
///
/// The registry depends only on this trait, never on `reqwest` directly,
/// so tests substitute a mock driver with scripted status sequences.
#[async_trait]
pub trait QueryDriver: Send + Sync {
    /// Submit a statement for asynchronous execution. Returns the
    /// Snowflake-assigned statement handle on success.
    async fn submit_async(
        &self,
        connection: &SnowflakeConnection,
        sql_text: &str,
    ) -> Result<String, ErrorInfo>;

    /// Check the current status of a previously submitted statement.
    async fn check_status(
        &self,
        connection: &SnowflakeConnection,
        server_query_id: &str,
    ) -> Result<DriverStatus, ErrorInfo>;

    /// Fetch the full result set of a statement that reached [`DriverStatus::Succeeded`].
    async fn fetch_results(
        &self,
        connection: &SnowflakeConnection,
        server_query_id: &str,
    ) -> Result<DriverResult, ErrorInfo>;

    /// Request cancellation of a still-running statement.
    async fn cancel_query(
        &self,
        connection: &SnowflakeConnection,
        server_query_id: &str,
    ) -> Result<(), ErrorInfo>;
}

/// Production [`QueryDriver`] backed by [`reqwest`].
pub struct SnowflakeHttpDriver {
    client: reqwest::Client,
}

impl SnowflakeHttpDriver {
    /// Build a driver with its own HTTP client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for SnowflakeHttpDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct StatementsResponse {
    #[serde(rename = "statementHandle")]
    statement_handle: Option<String>,
    #[serde(rename = "resultSetMetaData")]
    result_set_meta_data: Option<ResultSetMetaData>,
    data: Option<Vec<Vec<serde_json::Value>>>,
    message: Option<String>,
    code: Option<String>,
}

#[derive(Deserialize)]
struct ResultSetMetaData {
    #[serde(rename = "rowType")]
    row_type: Vec<RowTypeEntry>,
}

#[derive(Deserialize)]
struct RowTypeEntry {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    nullable: bool,
}

fn parse_cell(raw: &serde_json::Value, type_name: &str) -> CellValue {
    if raw.is_null() {
        return CellValue::Null;
    }
    match type_name {
        "fixed" if !type_name.contains('.') => raw
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(CellValue::Int)
            .unwrap_or_else(|| CellValue::Text(raw.to_string())),
        "real" | "float" | "double" => raw
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .map(CellValue::Float)
            .unwrap_or_else(|| CellValue::Text(raw.to_string())),
        "boolean" => raw
            .as_str()
            .map(|s| s == "true" || s == "1")
            .map(CellValue::Bool)
            .unwrap_or_else(|| CellValue::Text(raw.to_string())),
        _ => raw
            .as_str()
            .map(|s| CellValue::Text(s.to_string()))
            .unwrap_or_else(|| CellValue::Text(raw.to_string())),
    }
}

fn statements_url(connection: &SnowflakeConnection) -> String {
    format!("{}/api/v2/statements", connection.base_url)
}

fn auth_headers(connection: &SnowflakeConnection) -> (String, &'static str) {
    (format!("Bearer {}", connection.token), "application/json")
}

#[async_trait]
impl QueryDriver for SnowflakeHttpDriver {
    async fn submit_async(
        &self,
        connection: &SnowflakeConnection,
        sql_text: &str,
    ) -> Result<String, ErrorInfo> {
        let (auth, accept) = auth_headers(connection);
        let mut body = serde_json::json!({
            "statement": sql_text,
            "async": true,
        });
        if let Some(warehouse) = &connection.warehouse {
            body["warehouse"] = serde_json::Value::String(warehouse.clone());
        }
        if let Some(role) = &connection.role {
            body["role"] = serde_json::Value::String(role.clone());
        }

        let resp = self
            .client
            .post(statements_url(connection))
            .header("Authorization", auth)
            .header("Accept", accept)
            .json(&body)
            .send()
            .await
            .map_err(|e| ErrorInfo::new(ErrorKind::Submit, format!("submitting statement: {e}")))?;

        // A 202 Accepted with no statement handle yet still means "submitted";
        // Snowflake's async API returns the handle in the body regardless of
        // status code as long as submission itself succeeded.
        if !resp.status().is_success() && resp.status().as_u16() != 202 {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ErrorInfo::with_code(
                ErrorKind::Submit,
                format!("submit failed: {text}"),
                status.as_u16().to_string(),
            ));
        }

        let parsed: StatementsResponse = resp
            .json()
            .await
            .map_err(|e| ErrorInfo::new(ErrorKind::ParseResult, format!("parsing submit response: {e}")))?;

        parsed.statement_handle.ok_or_else(|| {
            ErrorInfo::new(ErrorKind::Submit, "submit response carried no statement handle")
        })
    }

    async fn check_status(
        &self,
        connection: &SnowflakeConnection,
        server_query_id: &str,
    ) -> Result<DriverStatus, ErrorInfo> {
        let (auth, accept) = auth_headers(connection);
        let url = format!("{}/{}", statements_url(connection), server_query_id);

        let resp = self
            .client
            .get(&url)
            .header("Authorization", auth)
            .header("Accept", accept)
            .send()
            .await
            .map_err(|e| ErrorInfo::new(ErrorKind::Execution, format!("checking status: {e}")))?;

        match resp.status().as_u16() {
            202 => Ok(DriverStatus::Running),
            200 => Ok(DriverStatus::Succeeded),
            422 => {
                let parsed: StatementsResponse = resp.json().await.unwrap_or(StatementsResponse {
                    statement_handle: None,
                    result_set_meta_data: None,
                    data: None,
                    message: None,
                    code: None,
                });
                let message = parsed.message.unwrap_or_else(|| "statement failed".to_string());
                let info = match parsed.code {
                    Some(code) => ErrorInfo::with_code(ErrorKind::Execution, message, code),
                    None => ErrorInfo::new(ErrorKind::Execution, message),
                };
                Ok(DriverStatus::Failed(info))
            }
            other => Err(ErrorInfo::with_code(
                ErrorKind::Execution,
                "unexpected status response",
                other.to_string(),
            )),
        }
    }

    async fn fetch_results(
        &self,
        connection: &SnowflakeConnection,
        server_query_id: &str,
    ) -> Result<DriverResult, ErrorInfo> {
        let (auth, accept) = auth_headers(connection);
        let url = format!("{}/{}", statements_url(connection), server_query_id);

        let resp = self
            .client
            .get(&url)
            .header("Authorization", auth)
            .header("Accept", accept)
            .send()
            .await
            .map_err(|e| ErrorInfo::new(ErrorKind::ParseResult, format!("fetching results: {e}")))?;

        let parsed: StatementsResponse = resp
            .json()
            .await
            .map_err(|e| ErrorInfo::new(ErrorKind::ParseResult, format!("parsing result response: {e}")))?;

        let meta = parsed
            .result_set_meta_data
            .ok_or_else(|| ErrorInfo::new(ErrorKind::ParseResult, "result response carried no metadata"))?;

        let columns: Vec<ColumnMeta> = meta
            .row_type
            .iter()
            .map(|entry| ColumnMeta {
                name: entry.name.clone(),
                type_name: entry.type_name.clone(),
                nullable: entry.nullable,
            })
            .collect();

        let raw_rows = parsed.data.unwrap_or_default();
        let rows = raw_rows
            .into_iter()
            .map(|raw_row| {
                let cells = raw_row
                    .iter()
                    .zip(meta.row_type.iter())
                    .map(|(value, entry)| (entry.name.clone(), parse_cell(value, &entry.type_name)))
                    .collect();
                Row(cells)
            })
            .collect();

        Ok(DriverResult { columns, rows })
    }

    async fn cancel_query(
        &self,
        connection: &SnowflakeConnection,
        server_query_id: &str,
    ) -> Result<(), ErrorInfo> {
        let (auth, accept) = auth_headers(connection);
        let url = format!("{}/{}/cancel", statements_url(connection), server_query_id);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", auth)
            .header("Accept", accept)
            .send()
            .await
            .map_err(|e| ErrorInfo::new(ErrorKind::Internal, format!("cancelling statement: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ErrorInfo::with_code(
                ErrorKind::Internal,
                "cancel request rejected",
                resp.status().as_u16().to_string(),
            ))
        }
    }
}

/// Test double implementing [`QueryDriver`] with scripted status sequences.
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A [`QueryDriver`] whose status-check sequence and final result are
    /// configured per statement handle ahead of time.
    pub(crate) struct MockQueryDriver {
        /// Queue of statuses to return, in order, one per `check_status` call.
        /// Once exhausted, the last entry repeats.
        scripts: Mutex<HashMap<String, Vec<DriverStatus>>>,
        results: Mutex<HashMap<String, DriverResult>>,
        pub(crate) fail_submit: bool,
        cancelled: Mutex<Vec<String>>,
        next_handle: Mutex<u64>,
    }

    impl MockQueryDriver {
        pub(crate) fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                results: Mutex::new(HashMap::new()),
                fail_submit: false,
                cancelled: Mutex::new(Vec::new()),
                next_handle: Mutex::new(1),
            }
        }

        pub(crate) fn failing_submit() -> Self {
            Self {
                fail_submit: true,
                ..Self::new()
            }
        }

        pub(crate) fn script_for(&self, handle: &str, statuses: Vec<DriverStatus>) {
            self.scripts.lock().unwrap().insert(handle.to_string(), statuses);
        }

        pub(crate) fn result_for(&self, handle: &str, result: DriverResult) {
            self.results.lock().unwrap().insert(handle.to_string(), result);
        }

        pub(crate) fn was_cancelled(&self, handle: &str) -> bool {
            self.cancelled.lock().unwrap().iter().any(|h| h == handle)
        }
    }

    #[async_trait]
    impl QueryDriver for MockQueryDriver {
        async fn submit_async(
            &self,
            _connection: &SnowflakeConnection,
            _sql_text: &str,
        ) -> Result<String, ErrorInfo> {
            if self.fail_submit {
                return Err(ErrorInfo::new(ErrorKind::Submit, "mock submit failure"));
            }
            let mut next = self.next_handle.lock().unwrap();
            let handle = format!("mock-stmt-{next}");
            *next += 1;
            Ok(handle)
        }

        async fn check_status(
            &self,
            _connection: &SnowflakeConnection,
            server_query_id: &str,
        ) -> Result<DriverStatus, ErrorInfo> {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts
                .entry(server_query_id.to_string())
                .or_insert_with(|| vec![DriverStatus::Succeeded]);
            if script.len() > 1 {
                Ok(script.remove(0))
            } else {
                Ok(script[0].clone())
            }
        }

        async fn fetch_results(
            &self,
            _connection: &SnowflakeConnection,
            server_query_id: &str,
        ) -> Result<DriverResult, ErrorInfo> {
            self.results
                .lock()
                .unwrap()
                .get(server_query_id)
                .cloned()
                .ok_or_else(|| ErrorInfo::new(ErrorKind::ParseResult, "no mock result configured"))
        }

        async fn cancel_query(
            &self,
            _connection: &SnowflakeConnection,
            server_query_id: &str,
        ) -> Result<(), ErrorInfo> {
            self.cancelled.lock().unwrap().push(server_query_id.to_string());
            Ok(())
        }
    }
}
