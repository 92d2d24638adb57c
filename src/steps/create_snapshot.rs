//! Snapshots the build instance's system disk.
//!
//! Only part of the pipeline when data disks are excluded from the image.

use std::sync::Arc;

use tracing::info;

use crate::client::{ResourceLifecycleClient, SnapshotSpec};
use crate::error::BuildError;
use crate::poll::{PollSpec, Readiness, poll_until};
use crate::request::BuildRequest;
use crate::state::{StateBag, keys};
use crate::step::{CleanupOutcome, Step, StepAction, StepContext, StepFuture, halt};

use super::cleanup::delete_with_retry;

/// Step name used in logs and failure reports.
pub const NAME: &str = "create_snapshot";

/// Captures the system disk and stores the snapshot id under
/// [`keys::SOURCE_SNAPSHOT`].
pub struct CreateSnapshotStep<C: ?Sized> {
    client: Arc<C>,
    name: String,
    wait: PollSpec,
    cleanup_wait: PollSpec,
    owned: Option<(String, String)>,
}

impl<C> CreateSnapshotStep<C>
where
    C: ResourceLifecycleClient + ?Sized,
{
    /// Names the snapshot after the target image.
    #[must_use]
    pub fn new(client: Arc<C>, request: &BuildRequest) -> Self {
        Self {
            client,
            name: format!("{}-system", request.image_name),
            wait: request.timeouts.snapshot_wait(),
            cleanup_wait: request.timeouts.cleanup_wait(),
            owned: None,
        }
    }
}

impl<C> Step for CreateSnapshotStep<C>
where
    C: ResourceLifecycleClient + ?Sized + 'static,
{
    fn name(&self) -> &'static str {
        NAME
    }

    fn run<'a>(
        &'a mut self,
        ctx: &'a StepContext,
        state: &'a mut StateBag,
    ) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            let instance = match state.require(keys::INSTANCE).cloned() {
                Ok(instance) => instance,
                Err(err) => return halt(state, NAME, err),
            };
            let Some(disk_id) = instance.system_disk_id else {
                let error = BuildError::Unsatisfiable {
                    what: format!("system disk snapshot of instance {}", instance.id),
                    reason: String::from("the instance reports no system disk"),
                };
                return halt(state, NAME, error);
            };

            let spec = SnapshotSpec {
                disk_id,
                region: instance.region,
                name: self.name.clone(),
            };
            let id = match self.client.create_snapshot(&spec).await {
                Ok(id) => id,
                Err(err) => return halt(state, NAME, BuildError::cloud("create snapshot", err)),
            };
            info!(snapshot_id = %id, disk_id = %spec.disk_id, "system disk snapshot started");
            self.owned = Some((spec.region.clone(), id.clone()));

            let client = &*self.client;
            let region = spec.region.as_str();
            let what = format!("snapshot {id} to complete");
            let waited = poll_until(
                &what,
                self.wait,
                ctx.cancel(),
                || client.describe_snapshot(region, &id),
                |snapshot| Readiness::from(snapshot.is_complete()),
            )
            .await;

            match waited {
                Ok(_) => {
                    state.put(keys::SOURCE_SNAPSHOT, id);
                    StepAction::Continue
                }
                Err(err) => halt(state, NAME, err.into()),
            }
        })
    }

    fn cleanup<'a>(&'a mut self, _state: &'a mut StateBag) -> StepFuture<'a, CleanupOutcome> {
        Box::pin(async move {
            let Some((region, id)) = self.owned.take() else {
                return CleanupOutcome::NothingToDo;
            };
            let client = &*self.client;
            delete_with_retry(
                NAME,
                format!("snapshot {id}"),
                self.cleanup_wait,
                || client.delete_snapshot(&region, &id),
            )
            .await
        })
    }
}
