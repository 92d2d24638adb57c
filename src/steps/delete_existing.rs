//! Removes images that already carry the target name.

use std::sync::Arc;

use tracing::info;

use crate::client::{CloudError, ImageFilter, ResourceLifecycleClient};
use crate::error::BuildError;
use crate::request::BuildRequest;
use crate::state::StateBag;
use crate::step::{CleanupOutcome, Step, StepAction, StepContext, StepFuture, halt};

use super::cleanup::ignore_not_found;

/// Step name used in logs and failure reports.
pub const NAME: &str = "delete_existing_images";

/// Deletes same-named images, and the snapshots behind them, in the build
/// region and every destination region.
///
/// Only part of the pipeline when existing images are to be replaced. The
/// deletions cannot be undone, so cleanup is always a no-op.
pub struct DeleteExistingImagesStep<C: ?Sized> {
    client: Arc<C>,
    image_name: String,
    regions: Vec<String>,
}

impl<C> DeleteExistingImagesStep<C>
where
    C: ResourceLifecycleClient + ?Sized,
{
    /// Captures the image name and the regions to sweep.
    #[must_use]
    pub fn new(client: Arc<C>, request: &BuildRequest) -> Self {
        let regions = std::iter::once(&request.region)
            .chain(&request.destination_regions)
            .cloned()
            .collect();
        Self {
            client,
            image_name: request.image_name.clone(),
            regions,
        }
    }

    async fn sweep(&self, region: &str) -> Result<usize, BuildError> {
        let filter = ImageFilter::by_name(region, &self.image_name);
        let images = self
            .client
            .describe_images(&filter)
            .await
            .map_err(|err| BuildError::cloud("list existing images", err))?;

        let mut removed = 0_usize;
        for image in images.iter().filter(|image| image.name == self.image_name) {
            info!(image_id = %image.id, region, "deleting existing image");
            let image_deleted = self.client.delete_image(region, &image.id).await;
            settle(image_deleted, "delete existing image")?;
            for snapshot_id in &image.snapshot_ids {
                let snapshot_deleted = self.client.delete_snapshot(region, snapshot_id).await;
                settle(snapshot_deleted, "delete existing image snapshot")?;
            }
            removed = removed.saturating_add(1);
        }
        Ok(removed)
    }
}

fn settle(result: Result<(), CloudError>, action: &str) -> Result<(), BuildError> {
    ignore_not_found(result).map_err(|err| BuildError::cloud(action, err))
}

impl<C> Step for DeleteExistingImagesStep<C>
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
            for region in &self.regions {
                match self.sweep(region).await {
                    Ok(0) => {}
                    Ok(removed) => info!(region = %region, removed, "existing images deleted"),
                    Err(err) => return halt(state, NAME, err),
                }
            }
            StepAction::Continue
        })
    }

    fn cleanup<'a>(&'a mut self, _state: &'a mut StateBag) -> StepFuture<'a, CleanupOutcome> {
        Box::pin(async { CleanupOutcome::NothingToDo })
    }
}
