//! Wrappers that make the failure policy of a remote call explicit at the
//! call site.

use crate::session::transport::TransportError;
use log::debug;
use std::future::Future;

/// Runs a remote call whose failure must reach the caller.
pub async fn must_succeed<T, F>(op: &str, call: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    call.await.inspect_err(|e| {
        debug!(target: "Session", "{op} failed: {e}");
    })
}

/// Runs a remote call whose failure is logged and dropped. Returns `None`
/// when the call failed.
pub async fn best_effort<T, F>(op: &str, call: F) -> Option<T>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match call.await {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(target: "Session", "Ignoring failed {op} (best effort): {e}");
            None
        }
    }
}
