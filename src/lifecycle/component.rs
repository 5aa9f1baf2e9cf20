//! The long-running unit the orchestrator manages

use crate::lifecycle::Readiness;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A named long-running unit with a readiness signal.
///
/// `run` must keep going until `shutdown` is cancelled (returning `Ok`) or
/// until it fails. Returning early for any reason tears the whole run down.
/// Readiness should fire once the component is safe to depend on.
pub trait Component: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn readiness(&self) -> Readiness;

    fn run(self: Arc<Self>, shutdown: CancellationToken) -> BoxFuture<'static, anyhow::Result<()>>;
}
