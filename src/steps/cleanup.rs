//! Compensating deletes shared by the resource-owning steps.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::CloudError;
use crate::error::CleanupWarning;
use crate::poll::{PollSpec, Readiness, poll_until};
use crate::step::CleanupOutcome;

/// Issues `delete` until it succeeds, retrying while the provider reports a
/// transient conflict.
///
/// A `NotFound` answer counts as removed. Any other error ends the retries and
/// is returned as a [`CleanupOutcome::Failed`] warning. The retries are bounded
/// by `spec` and run even after the build was cancelled.
pub(crate) async fn delete_with_retry<F, Fut>(
    step: &'static str,
    resource: String,
    spec: PollSpec,
    mut delete: F,
) -> CleanupOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), CloudError>>,
{
    let uncancellable = CancellationToken::new();
    let what = format!("deletion of {resource}");
    let result = poll_until(
        &what,
        spec,
        &uncancellable,
        || {
            let attempt = delete();
            async move { classify_delete(attempt.await) }
        },
        |()| Readiness::Ready,
    )
    .await;

    match result {
        Ok(()) => {
            info!(step, resource = %resource, "removed resource");
            CleanupOutcome::Removed
        }
        Err(err) => {
            warn!(step, resource = %resource, error = %err, "resource may still exist");
            CleanupOutcome::Failed(CleanupWarning {
                step,
                resource,
                message: err.to_string(),
            })
        }
    }
}

/// Maps a delete response onto the poll protocol: done, retry, or fail.
pub(crate) fn classify_delete(result: Result<(), CloudError>) -> Result<Option<()>, CloudError> {
    match result {
        Ok(()) => Ok(Some(())),
        Err(err) if err.is_not_found() => {
            debug!(code = %err.code, "resource already gone");
            Ok(Some(()))
        }
        Err(err) if err.is_transient() => {
            debug!(code = %err.code, "delete rejected while resource settles");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Ignores `NotFound` so repeated deletes stay idempotent.
pub(crate) fn ignore_not_found(result: Result<(), CloudError>) -> Result<(), CloudError> {
    match result {
        Err(err) if err.is_not_found() => Ok(()),
        other => other,
    }
}
