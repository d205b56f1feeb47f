//! The per-query background polling task and its finalization logic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::connection::{ConnectionProvider, SnowflakeConnection};
use crate::driver::{DriverStatus, QueryDriver};
use crate::error::ErrorInfo;
use crate::record::{ColumnMeta, QueryRecord, QueryStatus, Row};

/// Handle returned by [`spawn`]: the task's join handle and its cancellation
/// signal, installed into the query's [`QueryRuntime`](crate::record::QueryRuntime).
pub(crate) struct PollerHandle {
    pub join_handle: tokio::task::JoinHandle<()>,
    pub cancel_tx: watch::Sender<bool>,
}

/// Spawn the polling task for a query that has just been submitted
/// successfully. The task owns the connection from this point on: it polls
/// until a terminal state is reached (success, failure, cancel, or timeout),
/// finalizes the record, and only then closes the connection.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn(
    query_id: String,
    connection: SnowflakeConnection,
    server_query_id: String,
    driver: Arc<dyn QueryDriver>,
    connections: Arc<dyn ConnectionProvider>,
    store: Arc<Mutex<HashMap<String, QueryRecord>>>,
    poll_interval: Duration,
    deadline: Option<Instant>,
    max_inline_rows: usize,
    ttl: Duration,
) -> PollerHandle {
    let (cancel_tx, mut cancel_rx) = watch::channel(false);

    let join_handle = tokio::spawn(async move {
        let outcome = poll_loop(
            &query_id,
            &connection,
            &server_query_id,
            driver.as_ref(),
            poll_interval,
            deadline,
            &mut cancel_rx,
        )
        .await;

        finalize(&store, &query_id, outcome, max_inline_rows, ttl);
        connections.close_safely(connection).await;
    });

    PollerHandle { join_handle, cancel_tx }
}

enum Outcome {
    Canceled,
    Timeout,
    Succeeded(Vec<ColumnMeta>, Vec<Row>),
    Failed(ErrorInfo),
}

#[instrument(skip(connection, driver, cancel_rx), fields(query_id = %query_id, server_query_id = %server_query_id))]
async fn poll_loop(
    query_id: &str,
    connection: &SnowflakeConnection,
    server_query_id: &str,
    driver: &dyn QueryDriver,
    poll_interval: Duration,
    deadline: Option<Instant>,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Outcome {
    loop {
        if *cancel_rx.borrow() {
            info!("query canceled before reaching a terminal state");
            return Outcome::Canceled;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                warn!("query exceeded its configured timeout");
                return Outcome::Timeout;
            }
        }

        match driver.check_status(connection, server_query_id).await {
            Ok(DriverStatus::Running) => {
                debug!("query still running");
            }
            Ok(DriverStatus::Succeeded) => {
                return match driver.fetch_results(connection, server_query_id).await {
                    Ok(result) => {
                        info!(row_count = result.rows.len(), "query succeeded");
                        Outcome::Succeeded(result.columns, result.rows)
                    }
                    Err(info) => {
                        warn!(error = %info, "failed to fetch results for a succeeded query");
                        Outcome::Failed(info)
                    }
                };
            }
            Ok(DriverStatus::Failed(info)) => {
                warn!(error = %info, "query failed");
                return Outcome::Failed(info);
            }
            Err(info) => {
                warn!(error = %info, "status check failed");
                return Outcome::Failed(info);
            }
        }

        tokio::select! {
            biased;
            changed = cancel_rx.changed() => {
                let canceled = changed.is_err() || *cancel_rx.borrow();
                if canceled {
                    info!("query canceled during poll wait");
                    return Outcome::Canceled;
                }
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}

fn finalize(
    store: &Mutex<HashMap<String, QueryRecord>>,
    query_id: &str,
    outcome: Outcome,
    max_inline_rows: usize,
    ttl: Duration,
) {
    let mut guard = store.lock().expect("registry mutex poisoned");
    let Some(record) = guard.get_mut(query_id) else {
        return;
    };
    if record.status.is_terminal() {
        return;
    }

    match outcome {
        Outcome::Canceled => {
            record.status = QueryStatus::Canceled;
        }
        Outcome::Timeout => {
            record.status = QueryStatus::Timeout;
            record.error = Some(ErrorInfo::new(
                crate::error::ErrorKind::Timeout,
                "query exceeded its configured timeout",
            ));
        }
        Outcome::Succeeded(columns, mut rows) => {
            record.status = QueryStatus::Succeeded;
            record.columns = Some(columns);
            record.total_row_count = Some(rows.len());
            rows.truncate(max_inline_rows);
            record.rows = rows;
        }
        Outcome::Failed(info) => {
            record.status = QueryStatus::Failed;
            record.error = Some(info);
        }
    }
    let now = Instant::now();
    record.finished_at = Some(now);
    record.finished_at_wall = Some(chrono::Utc::now());
    // Refresh from the creation-time safety net to a shorter post-completion
    // grace period now that the record has reached a terminal state.
    record.ttl_expires_at = now + ttl;
}
