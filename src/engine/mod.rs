//! Claim-and-advance engine and the reconciliation sweep that backs it.

pub mod claim;
pub mod reconcile;

pub use claim::{ClaimEngine, EngineConfig, NoCandidateReason, RunOutcome};
pub use reconcile::{ReconcileConfig, Reconciler, SweepReport};

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Run a store call under a deadline. An elapsed deadline is a transient
/// store failure.
pub(crate) async fn bounded<T>(
    operation: &'static str,
    timeout: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| Error::StoreUnavailable(format!("{operation} timed out after {timeout:?}")))?
}
