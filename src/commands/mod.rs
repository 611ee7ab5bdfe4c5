pub mod explain;
pub mod keywords;
pub mod respond;
pub mod search;
pub mod sectors;
pub mod serve;

use anyhow::{Context, Result};

/// Runs a blocking reference-store lookup off the async runtime.
pub(crate) async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .context("reference lookup task failed")?
}
