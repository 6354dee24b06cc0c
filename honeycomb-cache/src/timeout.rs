//! Deadline wrapper for remote calls.

use std::future::Future;
use std::time::Duration;

use honeycomb_core::{HoneycombError, HoneycombResult};

/// Run `call`, failing with [`HoneycombError::Timeout`] after `timeout_ms`.
pub async fn with_timeout<T, F>(operation: &str, timeout_ms: u64, call: F) -> HoneycombResult<T>
where
    F: Future<Output = HoneycombResult<T>>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
        Ok(result) => result,
        Err(_) => Err(HoneycombError::timeout(operation, timeout_ms)),
    }
}
