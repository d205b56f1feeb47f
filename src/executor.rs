//! [`BlockingExecutor`]: runs synchronous driver work off the async scheduler.

use crate::error::ErrorInfo;

/// Wraps [`tokio::task::spawn_blocking`] so synchronous driver calls never
/// block the async scheduler, and joined panics surface as
/// [`ErrorKind::Internal`](crate::error::ErrorKind::Internal) instead of
/// propagating as a panic.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingExecutor;

impl BlockingExecutor {
    /// Construct an executor. Stateless — kept as a type so call sites read
    /// `executor.run(...)` the same way they'd read any other collaborator call.
    pub fn new() -> Self {
        Self
    }

    /// Run `f` on the blocking thread pool, returning its result or mapping
    /// a panic to [`ErrorInfo::internal`].
    pub async fn run<F, T>(&self, f: F) -> Result<T, ErrorInfo>
    where
        F: FnOnce() -> Result<T, ErrorInfo> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .unwrap_or_else(|join_err| Err(ErrorInfo::internal(format!("task panicked: {join_err}"))))
    }
}
