//! Creates the build instance and waits for it to stop.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::client::{InstanceSpec, InstanceStatus, ResourceLifecycleClient};
use crate::error::BuildError;
use crate::poll::{PollSpec, Readiness, poll_until};
use crate::request::BuildRequest;
use crate::state::{StateBag, keys};
use crate::step::{CleanupOutcome, Step, StepAction, StepContext, StepFuture, halt};

use super::cleanup::delete_with_retry;

/// Step name used in logs and failure reports.
pub const NAME: &str = "create_instance";

#[derive(Clone, Debug)]
struct OwnedInstance {
    region: String,
    id: String,
}

/// Creates the temporary instance the image is captured from.
///
/// The instance is created powered off; the step waits until the provider
/// reports it as `Stopped` and stores its descriptor under
/// [`keys::INSTANCE`].
pub struct CreateInstanceStep<C: ?Sized> {
    client: Arc<C>,
    template: InstanceSpec,
    wait: PollSpec,
    cleanup_wait: PollSpec,
    owned: Option<OwnedInstance>,
}

impl<C> CreateInstanceStep<C>
where
    C: ResourceLifecycleClient + ?Sized,
{
    /// Captures the instance layout from the request.
    #[must_use]
    pub fn new(client: Arc<C>, request: &BuildRequest) -> Self {
        let template = InstanceSpec {
            client_token: String::new(),
            name: request.instance_name(),
            region: request.region.clone(),
            instance_type: request.instance_type.clone(),
            source_image: request.source_image.clone(),
            architecture: request.architecture.clone(),
            io_optimized: request.io_optimized,
            system_disk: request.system_disk.clone(),
            data_disks: request.data_disks.clone(),
            network: request.network.clone(),
            user_data: request.user_data.clone(),
            tags: request.tags.clone(),
        };
        Self {
            client,
            template,
            wait: request.timeouts.instance_wait(),
            cleanup_wait: request.timeouts.cleanup_wait(),
            owned: None,
        }
    }
}

impl<C> Step for CreateInstanceStep<C>
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
            let spec = InstanceSpec {
                client_token: Uuid::new_v4().to_string(),
                ..self.template.clone()
            };

            let id = match self.client.create_instance(&spec).await {
                Ok(id) => id,
                Err(err) => {
                    return halt(state, NAME, BuildError::cloud("create instance", err));
                }
            };
            info!(instance_id = %id, region = %spec.region, "build instance created");
            self.owned = Some(OwnedInstance {
                region: spec.region.clone(),
                id: id.clone(),
            });

            let client = &*self.client;
            let region = spec.region.as_str();
            let what = format!("instance {id} to reach {}", InstanceStatus::Stopped);
            let waited = poll_until(
                &what,
                self.wait,
                ctx.cancel(),
                || client.describe_instance(region, &id),
                |instance| Readiness::from(instance.status == InstanceStatus::Stopped),
            )
            .await;

            match waited {
                Ok(instance) => {
                    state.put(keys::INSTANCE, instance);
                    StepAction::Continue
                }
                Err(err) => halt(state, NAME, err.into()),
            }
        })
    }

    fn cleanup<'a>(&'a mut self, _state: &'a mut StateBag) -> StepFuture<'a, CleanupOutcome> {
        Box::pin(async move {
            let Some(owned) = self.owned.take() else {
                return CleanupOutcome::NothingToDo;
            };
            let client = &*self.client;
            delete_with_retry(
                NAME,
                format!("instance {}", owned.id),
                self.cleanup_wait,
                || client.delete_instance(&owned.region, &owned.id, true),
            )
            .await
        })
    }
}
