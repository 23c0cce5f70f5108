//! Concurrent batch dispatch with per-item failure isolation.
//!
//! All requests in a batch start together (the request gate still enforces
//! the global in-flight cap) and the dispatcher waits for every one to
//! settle. A failure is captured at its position; siblings are never
//! cancelled. Output order always matches input order regardless of
//! completion order.

use std::future::Future;

use futures_util::future::join_all;

use crate::service::ServiceError;

/// Run independent reasoning futures concurrently and settle them all.
/// The result at position `i` belongs to the request at position `i`.
pub async fn dispatch<T, Fut>(requests: Vec<Fut>) -> Vec<Result<T, ServiceError>>
where
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let total = requests.len();
    let settled = join_all(requests).await;

    let failures = settled.iter().filter(|r| r.is_err()).count();
    if failures > 0 {
        tracing::warn!(total, failures, "Batch settled with per-item failures");
    } else {
        tracing::debug!(total, "Batch settled cleanly");
    }

    settled
}

/// Keep the successful results, logging each failure with its position.
/// Used by stages that drop failed items rather than abort.
pub fn successes<T>(settled: Vec<Result<T, ServiceError>>, stage: &str) -> Vec<T> {
    settled
        .into_iter()
        .enumerate()
        .filter_map(|(position, result)| match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(stage, position, error = %e, "Dropping failed batch item");
                None
            }
        })
        .collect()
}
