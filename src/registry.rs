//! [`QueryRegistry`]: the concurrent in-process manager for long-running
//! asynchronous Snowflake queries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::connection::ConnectionProvider;
use crate::driver::QueryDriver;
use crate::error::ErrorInfo;
use crate::poller;
use crate::record::{
    QueryOptions, QueryPage, QueryRecord, QueryRuntime, QuerySnapshot, QueryStatus, SnowflakeHandle,
};

/// Registry-wide defaults consulted when a [`QueryOptions`] doesn't override them.
#[derive(Debug, Clone)]
pub struct RegistryDefaults {
    /// Default interval between status-check polls.
    pub poll_interval: Duration,
    /// Default cap on rows retained in memory for paging.
    pub max_inline_rows: usize,
    /// How long a terminal record survives before [`QueryRegistry::prune_expired`] removes it.
    pub ttl: Duration,
    /// Upper bound a caller may request via [`QueryOptions::query_timeout`].
    pub max_query_timeout: Duration,
}

impl From<&crate::config::RegistrySettings> for RegistryDefaults {
    fn from(settings: &crate::config::RegistrySettings) -> Self {
        Self {
            poll_interval: settings.poll_interval,
            max_inline_rows: settings.max_inline_rows,
            ttl: settings.ttl,
            max_query_timeout: settings.max_query_timeout,
        }
    }
}

/// The concurrent in-process manager for long-running asynchronous
/// Snowflake queries.
///
/// A single [`std::sync::Mutex`] guards the record store. Every critical
/// section is synchronous HashMap/struct manipulation with no `.await`
/// inside the guard — connection I/O and driver calls always happen outside
/// the lock, inside the per-query poller task.
pub struct QueryRegistry {
    store: Arc<Mutex<HashMap<String, QueryRecord>>>,
    driver: Arc<dyn QueryDriver>,
    connections: Arc<dyn ConnectionProvider>,
    defaults: RegistryDefaults,
}

impl QueryRegistry {
    /// Build a registry around a driver, a connection provider, and a set
    /// of defaults. There is deliberately no `Default` impl — a registry
    /// always needs a driver and connection provider to do anything.
    pub fn new(
        driver: Arc<dyn QueryDriver>,
        connections: Arc<dyn ConnectionProvider>,
        defaults: RegistryDefaults,
    ) -> Arc<Self> {
        Arc::new(Self {
            store: Arc::new(Mutex::new(HashMap::new())),
            driver,
            connections,
            defaults,
        })
    }

    /// Register and begin executing a new query, returning its
    /// registry-assigned `query_id` once the connection is open and the
    /// statement has been accepted for asynchronous execution.
    ///
    /// The returned id is valid immediately; the query's status starts at
    /// [`QueryStatus::Pending`] and transitions to [`QueryStatus::Running`]
    /// once submission succeeds, or directly to [`QueryStatus::Failed`] if
    /// connecting or submitting fails.
    #[instrument(skip(self, sql_text, options), fields(query_id))]
    pub async fn execute_query(
        self: &Arc<Self>,
        sql_text: String,
        options: QueryOptions,
    ) -> String {
        let query_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("query_id", &query_id.as_str());

        {
            let mut guard = self.store.lock().expect("registry mutex poisoned");
            guard.insert(
                query_id.clone(),
                QueryRecord {
                    query_id: query_id.clone(),
                    status: QueryStatus::Pending,
                    sql_text: sql_text.clone(),
                    created_at: Instant::now(),
                    created_at_wall: chrono::Utc::now(),
                    started_at: None,
                    started_at_wall: None,
                    finished_at: None,
                    finished_at_wall: None,
                    // Defensive safety-net deadline, refreshed to a shorter
                    // grace period once the record reaches a terminal state.
                    ttl_expires_at: Instant::now() + self.defaults.ttl,
                    columns: None,
                    rows: Vec::new(),
                    total_row_count: None,
                    error: None,
                    runtime: QueryRuntime {
                        poller_handle: None,
                        cancel_tx: tokio::sync::watch::channel(false).0,
                        server_query_id: None,
                    },
                },
            );
        }

        let warehouse = options.warehouse.as_deref();
        let role = options.role.as_deref();

        let connection = match self.connections.new_connection(warehouse, role).await {
            Ok(connection) => connection,
            Err(info) => {
                warn!(error = %info, "failed to open connection");
                self.fail_immediately(&query_id, info);
                return query_id;
            }
        };

        let server_query_id = match self.driver.submit_async(&connection, &sql_text).await {
            Ok(handle) => handle,
            Err(info) => {
                warn!(error = %info, "failed to submit statement");
                self.connections.close_safely(connection).await;
                self.fail_immediately(&query_id, info);
                return query_id;
            }
        };

        let poll_interval = options.poll_interval.unwrap_or(self.defaults.poll_interval);
        let max_inline_rows = options.max_inline_rows.unwrap_or(self.defaults.max_inline_rows);
        // A caller-supplied timeout is capped by `max_query_timeout`; absent
        // one, the query runs with no deadline at all (the registry default
        // is `null`, per spec — `max_query_timeout` only bounds a value the
        // caller actually supplied).
        let deadline = options
            .query_timeout
            .map(|timeout| Instant::now() + timeout.min(self.defaults.max_query_timeout));

        let handle = poller::spawn(
            query_id.clone(),
            connection,
            server_query_id.clone(),
            Arc::clone(&self.driver),
            Arc::clone(&self.connections),
            Arc::clone(&self.store),
            poll_interval,
            deadline,
            max_inline_rows,
            self.defaults.ttl,
        );

        {
            let mut guard = self.store.lock().expect("registry mutex poisoned");
            if let Some(record) = guard.get_mut(&query_id) {
                record.status = QueryStatus::Running;
                record.started_at = Some(Instant::now());
                record.started_at_wall = Some(chrono::Utc::now());
                record.runtime.server_query_id = Some(server_query_id);
                record.runtime.poller_handle = Some(handle.join_handle);
                record.runtime.cancel_tx = handle.cancel_tx;
            }
        }

        info!("query submitted");
        query_id
    }

    fn fail_immediately(&self, query_id: &str, error: ErrorInfo) {
        let mut guard = self.store.lock().expect("registry mutex poisoned");
        if let Some(record) = guard.get_mut(query_id) {
            let now = Instant::now();
            record.status = QueryStatus::Failed;
            record.error = Some(error);
            record.finished_at = Some(now);
            record.finished_at_wall = Some(chrono::Utc::now());
            record.ttl_expires_at = now + self.defaults.ttl;
        }
    }

    /// Cancel an in-flight query. Returns `false` if the id is unknown or
    /// the query has already reached a terminal state.
    ///
    /// Ordering is strict: the poller's cancellation signal is raised, its
    /// task is joined, and only once that join completes (which happens
    /// after the poller has closed its connection) does this method return.
    #[instrument(skip(self), fields(query_id = %query_id))]
    pub async fn cancel(&self, query_id: &str) -> bool {
        let (join_handle, server_query_id) = {
            let mut guard = self.store.lock().expect("registry mutex poisoned");
            match guard.get_mut(query_id) {
                Some(record) if !record.status.is_terminal() => {
                    let _ = record.runtime.cancel_tx.send(true);
                    (
                        record.runtime.poller_handle.take(),
                        record.runtime.server_query_id.clone(),
                    )
                }
                _ => (None, None),
            }
        };

        let Some(handle) = join_handle else {
            return false;
        };

        // The poller's own finalizer closes its connection before this join
        // returns, so the owning connection is never touched here. A fresh,
        // throwaway connection issues the server-side cancel instead of
        // racing the poller's in-flight driver call on the same handle.
        if let Err(join_err) = handle.await {
            warn!(error = %join_err, "poller task panicked during cancellation");
        }

        if let Some(server_query_id) = server_query_id {
            match self.connections.new_connection(None, None).await {
                Ok(cancel_conn) => {
                    if let Err(info) = self.driver.cancel_query(&cancel_conn, &server_query_id).await {
                        warn!(error = %info, "server-side cancel request failed");
                    }
                    self.connections.close_safely(cancel_conn).await;
                }
                Err(info) => {
                    warn!(error = %info, "failed to open connection for server-side cancel");
                }
            }
        }

        info!("query canceled");
        true
    }

    /// Get a point-in-time snapshot of a query's lifecycle state. Returns
    /// `None` if the id is unknown.
    pub fn get_snapshot(&self, query_id: &str) -> Option<QuerySnapshot> {
        let guard = self.store.lock().expect("registry mutex poisoned");
        let record = guard.get(query_id)?;

        let execution_time_seconds = record.started_at.map(|started_at| {
            let end = record.finished_at.unwrap_or_else(Instant::now);
            end.saturating_duration_since(started_at).as_secs_f64()
        });

        Some(QuerySnapshot {
            query_id: record.query_id.clone(),
            sql: record.sql_text.clone(),
            status: record.status,
            created_at: record.created_at_wall,
            updated_at: record.finished_at_wall.unwrap_or_else(chrono::Utc::now),
            started_at: record.started_at_wall,
            finished_at: record.finished_at_wall,
            execution_time_seconds,
            row_count: (record.status == QueryStatus::Succeeded)
                .then_some(record.total_row_count.unwrap_or_else(|| record.rows.len())),
            columns: record.columns.clone(),
            error: record.error.clone(),
            snowflake: SnowflakeHandle {
                sfqid: record.runtime.server_query_id.clone(),
            },
        })
    }

    /// Fetch a page of a query's result rows. Returns `None` if the id is
    /// unknown, if the query has not yet succeeded, or if `offset` is
    /// beyond the end of the result set.
    ///
    /// `limit` defaults to every remaining row when not supplied.
    pub fn fetch_result(&self, query_id: &str, offset: usize, limit: Option<usize>) -> Option<QueryPage> {
        let guard = self.store.lock().expect("registry mutex poisoned");
        let record = guard.get(query_id)?;
        if record.status != QueryStatus::Succeeded {
            return None;
        }

        let total_rows = record.total_row_count.unwrap_or_else(|| record.rows.len());
        let inline_len = record.rows.len();
        if offset > total_rows {
            return None;
        }

        let limit = limit.unwrap_or_else(|| total_rows.saturating_sub(offset));
        let end = (offset + limit).min(inline_len);
        let start = offset.min(inline_len);
        let rows = record.rows[start..end].iter().map(|row| row.to_btreemap()).collect();

        Some(QueryPage {
            rows,
            offset,
            limit,
            total_rows,
            has_more: end < total_rows,
            columns: record.columns.clone(),
        })
    }

    /// List the ids and current statuses of every query the registry
    /// currently holds a record for, in insertion order, optionally filtered
    /// to a single status.
    pub fn list_queries(&self, status_filter: Option<QueryStatus>) -> Vec<(String, QueryStatus)> {
        let guard = self.store.lock().expect("registry mutex poisoned");
        let mut entries: Vec<_> = guard
            .values()
            .filter(|record| status_filter.is_none_or(|status| record.status == status))
            .map(|record| (record.query_id.clone(), record.status, record.created_at))
            .collect();
        entries.sort_by(|a, b| a.2.cmp(&b.2));
        entries.into_iter().map(|(id, status, _)| (id, status)).collect()
    }

    /// Remove records past their `ttl_expires_at` deadline. Returns the
    /// number of records removed.
    ///
    /// Terminal records carry a short post-completion grace period; a
    /// non-terminal record past its deadline is treated as a stuck straggler
    /// and torn down defensively — its cancellation signal is raised and its
    /// poller joined (which closes its connection) before the record is
    /// removed.
    #[instrument(skip(self))]
    pub async fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let (expired_ids, stragglers): (Vec<String>, Vec<tokio::task::JoinHandle<()>>) = {
            let mut guard = self.store.lock().expect("registry mutex poisoned");
            let expired_ids: Vec<String> = guard
                .iter()
                .filter(|(_, record)| now >= record.ttl_expires_at)
                .map(|(id, _)| id.clone())
                .collect();

            let mut stragglers = Vec::new();
            for id in &expired_ids {
                if let Some(record) = guard.get_mut(id) {
                    if !record.status.is_terminal() {
                        let _ = record.runtime.cancel_tx.send(true);
                        if let Some(handle) = record.runtime.poller_handle.take() {
                            stragglers.push(handle);
                        }
                    }
                }
            }
            (expired_ids, stragglers)
        };

        for handle in stragglers {
            if let Err(join_err) = handle.await {
                warn!(error = %join_err, "poller task panicked while pruning an expired record");
            }
        }

        let mut guard = self.store.lock().expect("registry mutex poisoned");
        let removed = expired_ids.iter().filter(|id| guard.remove(id.as_str()).is_some()).count();
        if removed > 0 {
            info!(removed, "pruned expired query records");
        }
        removed
    }

    /// Spawn an optional background task that calls [`prune_expired`] on a
    /// fixed interval. Not started automatically — an embedding binary
    /// opts in explicitly.
    ///
    /// [`prune_expired`]: QueryRegistry::prune_expired
    pub fn spawn_background_pruner(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.prune_expired().await;
            }
        })
    }

    /// Cancel every in-flight query and wait for their pollers to finish,
    /// in preparation for shutdown. After this returns, every record in the
    /// registry is in a terminal state.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        let ids: Vec<String> = {
            let guard = self.store.lock().expect("registry mutex poisoned");
            guard
                .iter()
                .filter(|(_, record)| !record.status.is_terminal())
                .map(|(id, _)| id.clone())
                .collect()
        };

        // Every in-flight query is cancelled concurrently; ordering between
        // records is unspecified, matching close()'s own contract.
        let cancellations = ids.iter().map(|id| self.cancel(id));
        futures::future::join_all(cancellations).await;
        info!("registry closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::MockConnectionProvider;
    use crate::driver::mock::MockQueryDriver;
    use crate::driver::{DriverResult, DriverStatus};
    use crate::record::{CellValue, ColumnMeta, Row};

    fn defaults() -> RegistryDefaults {
        RegistryDefaults {
            poll_interval: Duration::from_millis(5),
            max_inline_rows: 1000,
            ttl: Duration::from_secs(60),
            max_query_timeout: Duration::from_secs(5),
        }
    }

    fn sample_result() -> DriverResult {
        DriverResult {
            columns: vec![ColumnMeta {
                name: "N".to_string(),
                type_name: "fixed".to_string(),
                nullable: false,
            }],
            rows: vec![
                Row(vec![("N".to_string(), CellValue::Int(1))]),
                Row(vec![("N".to_string(), CellValue::Int(2))]),
                Row(vec![("N".to_string(), CellValue::Int(3))]),
            ],
        }
    }

    #[tokio::test]
    async fn execute_query_reaches_succeeded_and_pages_results() {
        let driver = Arc::new(MockQueryDriver::new());
        let connections = Arc::new(MockConnectionProvider::new());
        let registry = QueryRegistry::new(driver.clone(), connections.clone(), defaults());

        let query_id = registry.execute_query("select 1".to_string(), QueryOptions::default()).await;

        // Submission happened synchronously before the poller starts, so the
        // server_query_id is already assigned; configure its script before
        // the first status check can run.
        let snapshot = registry.get_snapshot(&query_id).unwrap();
        let handle = snapshot.snowflake.sfqid.clone().unwrap();
        driver.script_for(&handle, vec![DriverStatus::Succeeded]);
        driver.result_for(&handle, sample_result());

        for _ in 0..50 {
            if registry.get_snapshot(&query_id).unwrap().status == QueryStatus::Succeeded {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let snapshot = registry.get_snapshot(&query_id).unwrap();
        assert_eq!(snapshot.status, QueryStatus::Succeeded);
        assert_eq!(snapshot.row_count, Some(3));

        let page = registry.fetch_result(&query_id, 0, Some(2)).unwrap();
        assert_eq!(page.rows.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.total_rows, 3);

        let page2 = registry.fetch_result(&query_id, 2, Some(2)).unwrap();
        assert_eq!(page2.rows.len(), 1);
        assert!(!page2.has_more);

        assert_eq!(connections.opened_count(), 1);
        assert_eq!(connections.closed_count(), 1);
    }

    #[tokio::test]
    async fn cancel_joins_poller_before_returning_and_closes_connection() {
        let driver = Arc::new(MockQueryDriver::new());
        let connections = Arc::new(MockConnectionProvider::new());
        let registry = QueryRegistry::new(driver.clone(), connections.clone(), defaults());

        let query_id = registry.execute_query("select 1".to_string(), QueryOptions::default()).await;
        let snapshot = registry.get_snapshot(&query_id).unwrap();
        let handle = snapshot.snowflake.sfqid.unwrap();
        // Never reaches a terminal state on its own; only cancel ends it.
        driver.script_for(&handle, vec![DriverStatus::Running, DriverStatus::Running]);

        let canceled = registry.cancel(&query_id).await;
        assert!(canceled);

        let snapshot = registry.get_snapshot(&query_id).unwrap();
        assert_eq!(snapshot.status, QueryStatus::Canceled);
        // cancel() only returns after the poller joins, and the poller
        // closes its connection before exiting — so by now close already happened.
        // A second, throwaway connection was also opened for the server-side
        // cancel-query call and closed again.
        assert_eq!(connections.opened_count(), 2);
        assert_eq!(connections.closed_count(), 2);
        assert!(driver.was_cancelled(&handle));

        let canceled_again = registry.cancel(&query_id).await;
        assert!(!canceled_again);
        // No additional connection opened for a no-op cancel.
        assert_eq!(connections.opened_count(), 2);
    }

    #[tokio::test]
    async fn unknown_query_id_yields_none() {
        let driver = Arc::new(MockQueryDriver::new());
        let connections = Arc::new(MockConnectionProvider::new());
        let registry = QueryRegistry::new(driver, connections, defaults());

        assert!(registry.get_snapshot("does-not-exist").is_none());
        assert!(registry.fetch_result("does-not-exist", 0, Some(10)).is_none());
        assert!(!registry.cancel("does-not-exist").await);
    }

    #[tokio::test]
    async fn connect_failure_fails_the_query_immediately() {
        let driver = Arc::new(MockQueryDriver::new());
        let connections = Arc::new(MockConnectionProvider::failing());
        let registry = QueryRegistry::new(driver, connections, defaults());

        let query_id = registry.execute_query("select 1".to_string(), QueryOptions::default()).await;
        let snapshot = registry.get_snapshot(&query_id).unwrap();
        assert_eq!(snapshot.status, QueryStatus::Failed);
        assert!(snapshot.error.is_some());
    }

    #[tokio::test]
    async fn submit_failure_closes_the_connection_and_fails_the_query() {
        let driver = Arc::new(MockQueryDriver::failing_submit());
        let connections = Arc::new(MockConnectionProvider::new());
        let registry = QueryRegistry::new(driver, connections.clone(), defaults());

        let query_id = registry.execute_query("select 1".to_string(), QueryOptions::default()).await;
        let snapshot = registry.get_snapshot(&query_id).unwrap();
        assert_eq!(snapshot.status, QueryStatus::Failed);
        assert_eq!(connections.closed_count(), 1);
    }

    #[tokio::test]
    async fn fetch_result_before_success_returns_none() {
        let driver = Arc::new(MockQueryDriver::new());
        let connections = Arc::new(MockConnectionProvider::new());
        let registry = QueryRegistry::new(driver.clone(), connections, defaults());

        let query_id = registry.execute_query("select 1".to_string(), QueryOptions::default()).await;
        let handle = registry.get_snapshot(&query_id).unwrap().snowflake.sfqid.unwrap();
        driver.script_for(&handle, vec![DriverStatus::Running, DriverStatus::Running, DriverStatus::Running]);

        assert!(registry.fetch_result(&query_id, 0, Some(10)).is_none());
    }

    #[tokio::test]
    async fn max_inline_rows_caps_stored_rows_but_not_reported_total() {
        let driver = Arc::new(MockQueryDriver::new());
        let connections = Arc::new(MockConnectionProvider::new());
        let registry = QueryRegistry::new(driver.clone(), connections, defaults());

        let options = QueryOptions {
            max_inline_rows: Some(2),
            ..Default::default()
        };
        let query_id = registry.execute_query("select 1".to_string(), options).await;
        let handle = registry.get_snapshot(&query_id).unwrap().snowflake.sfqid.unwrap();
        driver.script_for(&handle, vec![DriverStatus::Succeeded]);
        driver.result_for(&handle, sample_result());

        for _ in 0..50 {
            if registry.get_snapshot(&query_id).unwrap().status == QueryStatus::Succeeded {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let snapshot = registry.get_snapshot(&query_id).unwrap();
        assert_eq!(snapshot.row_count, Some(3), "reported total ignores the inline cap");

        let page = registry.fetch_result(&query_id, 0, Some(10)).unwrap();
        assert_eq!(page.rows.len(), 2, "stored rows are truncated to the cap");
        assert_eq!(page.total_rows, 3);
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn server_side_execution_error_transitions_to_failed() {
        let driver = Arc::new(MockQueryDriver::new());
        let connections = Arc::new(MockConnectionProvider::new());
        let registry = QueryRegistry::new(driver.clone(), connections, defaults());

        let query_id = registry.execute_query("select * from missing_column".to_string(), QueryOptions::default()).await;
        let handle = registry.get_snapshot(&query_id).unwrap().snowflake.sfqid.unwrap();
        driver.script_for(
            &handle,
            vec![DriverStatus::Failed(crate::error::ErrorInfo::new(
                crate::error::ErrorKind::Execution,
                "column 'invalid' not found",
            ))],
        );

        for _ in 0..50 {
            if registry.get_snapshot(&query_id).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let snapshot = registry.get_snapshot(&query_id).unwrap();
        assert_eq!(snapshot.status, QueryStatus::Failed);
        let error = snapshot.error.unwrap();
        assert_eq!(error.kind, crate::error::ErrorKind::Execution);
        assert!(error.message.contains("invalid"));

        assert!(registry.fetch_result(&query_id, 0, None).is_none());
    }

    #[tokio::test]
    async fn query_timeout_transitions_to_timeout_and_closes_connection() {
        let driver = Arc::new(MockQueryDriver::new());
        let connections = Arc::new(MockConnectionProvider::new());
        let registry = QueryRegistry::new(driver.clone(), connections.clone(), defaults());

        let options = QueryOptions {
            query_timeout: Some(Duration::from_millis(0)),
            poll_interval: Some(Duration::from_millis(5)),
            ..Default::default()
        };
        let query_id = registry.execute_query("select 1".to_string(), options).await;
        let handle = registry.get_snapshot(&query_id).unwrap().snowflake.sfqid.unwrap();
        driver.script_for(&handle, vec![DriverStatus::Running, DriverStatus::Running]);

        for _ in 0..50 {
            if registry.get_snapshot(&query_id).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let snapshot = registry.get_snapshot(&query_id).unwrap();
        assert_eq!(snapshot.status, QueryStatus::Timeout);
        assert_eq!(snapshot.error.unwrap().kind, crate::error::ErrorKind::Timeout);
        assert_eq!(connections.closed_count(), 1);
    }

    #[tokio::test]
    async fn prune_expired_only_removes_old_terminal_records() {
        let driver = Arc::new(MockQueryDriver::new());
        let connections = Arc::new(MockConnectionProvider::new());
        let mut settings = defaults();
        settings.ttl = Duration::from_millis(0);
        let registry = QueryRegistry::new(driver.clone(), connections, settings);

        let query_id = registry.execute_query("select 1".to_string(), QueryOptions::default()).await;
        let handle = registry.get_snapshot(&query_id).unwrap().snowflake.sfqid.unwrap();
        driver.script_for(&handle, vec![DriverStatus::Succeeded]);
        driver.result_for(&handle, sample_result());

        for _ in 0..50 {
            if registry.get_snapshot(&query_id).unwrap().status == QueryStatus::Succeeded {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
        let removed = registry.prune_expired().await;
        assert_eq!(removed, 1);
        assert!(registry.get_snapshot(&query_id).is_none());
    }

    #[tokio::test]
    async fn prune_expired_leaves_in_flight_records_within_their_ttl_alone() {
        let driver = Arc::new(MockQueryDriver::new());
        let connections = Arc::new(MockConnectionProvider::new());
        let registry = QueryRegistry::new(driver.clone(), connections, defaults());

        let query_id = registry.execute_query("select 1".to_string(), QueryOptions::default()).await;
        let handle = registry.get_snapshot(&query_id).unwrap().snowflake.sfqid.unwrap();
        driver.script_for(&handle, vec![DriverStatus::Running, DriverStatus::Running, DriverStatus::Running]);

        let removed = registry.prune_expired().await;
        assert_eq!(removed, 0);
        assert!(registry.get_snapshot(&query_id).is_some());

        registry.cancel(&query_id).await;
    }

    #[tokio::test]
    async fn prune_expired_defensively_tears_down_stuck_non_terminal_records() {
        let driver = Arc::new(MockQueryDriver::new());
        let connections = Arc::new(MockConnectionProvider::new());
        let mut settings = defaults();
        settings.ttl = Duration::from_millis(0);
        let registry = QueryRegistry::new(driver.clone(), connections.clone(), settings);

        let query_id = registry.execute_query("select 1".to_string(), QueryOptions::default()).await;
        let handle = registry.get_snapshot(&query_id).unwrap().snowflake.sfqid.unwrap();
        // Never reaches a terminal state on its own; stuck indefinitely
        // until prune_expired's defensive path cancels it.
        driver.script_for(&handle, vec![DriverStatus::Running, DriverStatus::Running, DriverStatus::Running]);

        let removed = registry.prune_expired().await;
        assert_eq!(removed, 1);
        assert!(registry.get_snapshot(&query_id).is_none());
        assert_eq!(connections.closed_count(), 1);
    }

    #[tokio::test]
    async fn close_cancels_every_in_flight_query() {
        let driver = Arc::new(MockQueryDriver::new());
        let connections = Arc::new(MockConnectionProvider::new());
        let registry = QueryRegistry::new(driver.clone(), connections, defaults());

        let mut ids = Vec::new();
        for _ in 0..3 {
            let query_id = registry.execute_query("select 1".to_string(), QueryOptions::default()).await;
            let handle = registry.get_snapshot(&query_id).unwrap().snowflake.sfqid.unwrap();
            driver.script_for(&handle, vec![DriverStatus::Running, DriverStatus::Running]);
            ids.push(query_id);
        }

        registry.close().await;

        for id in &ids {
            let snapshot = registry.get_snapshot(id).unwrap();
            assert_eq!(snapshot.status, QueryStatus::Canceled);
        }

        // A subsequent close is a no-op: nothing left to cancel.
        registry.close().await;
    }
}
