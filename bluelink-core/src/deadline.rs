use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use crate::error::{BluetoothError, Result};

/// Runs `future` to completion unless `limit` elapses first.
///
/// Every workflow settles through here: a terminal protocol event or a user
/// decline resolves the inner future, the deadline maps to `Timeout`, and in
/// all cases the pending timer is dropped with the future.
pub async fn within<F, T>(operation: &'static str, limit: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!("{} timed out after {:?}", operation, limit);
            Err(BluetoothError::Timeout {
                operation,
                after: limit,
            })
        }
    }
}
