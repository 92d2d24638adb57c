//! Tears the build instance down once the image exists.

use std::sync::Arc;

use tracing::{info, warn};

use crate::client::ResourceLifecycleClient;
use crate::poll::PollSpec;
use crate::request::BuildRequest;
use crate::state::{StateBag, keys};
use crate::step::{CleanupOutcome, Step, StepAction, StepContext, StepFuture};

use super::cleanup::delete_with_retry;

/// Step name used in logs and failure reports.
pub const NAME: &str = "delete_build_instance";

/// Deletes the build instance on the success path.
///
/// A failed delete is recorded as a warning and never fails the build: the
/// image already exists at this point.
pub struct DeleteBuildInstanceStep<C: ?Sized> {
    client: Arc<C>,
    wait: PollSpec,
}

impl<C> DeleteBuildInstanceStep<C>
where
    C: ResourceLifecycleClient + ?Sized,
{
    /// Creates the step.
    #[must_use]
    pub fn new(client: Arc<C>, request: &BuildRequest) -> Self {
        Self {
            client,
            wait: request.timeouts.cleanup_wait(),
        }
    }
}

impl<C> Step for DeleteBuildInstanceStep<C>
where
    C: ResourceLifecycleClient + ?Sized + 'static,
{
    fn name(&self) -> &'static str {
        NAME
    }

    fn run<'a>(
        &'a mut self,
        _ctx: &'a StepContext,
        state: &'a mut StateBag,
    ) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            let Some(instance) = state.get(keys::INSTANCE).cloned() else {
                warn!("no build instance recorded; nothing to delete");
                return StepAction::Continue;
            };

            let client = &*self.client;
            let outcome = delete_with_retry(
                NAME,
                format!("instance {}", instance.id),
                self.wait,
                || client.delete_instance(&instance.region, &instance.id, true),
            )
            .await;

            match outcome {
                CleanupOutcome::Failed(warning) => state.push_warning(warning),
                CleanupOutcome::Removed | CleanupOutcome::NothingToDo => {
                    info!(instance_id = %instance.id, "build instance deleted");
                }
            }
            StepAction::Continue
        })
    }

    fn cleanup<'a>(&'a mut self, _state: &'a mut StateBag) -> StepFuture<'a, CleanupOutcome> {
        Box::pin(async { CleanupOutcome::NothingToDo })
    }
}
