//! Copies the finished image into every destination region.

use std::sync::Arc;

use tracing::info;

use crate::client::{ImageCopySpec, ImageFilter, ResourceLifecycleClient};
use crate::error::BuildError;
use crate::poll::{PollSpec, poll_until};
use crate::request::BuildRequest;
use crate::state::{StateBag, keys};
use crate::step::{CleanupOutcome, Step, StepAction, StepContext, StepFuture, halt};

use super::cleanup::delete_with_retry;
use super::create_image::image_readiness;

/// Step name used in logs and failure reports.
pub const NAME: &str = "copy_image";

/// Copies the image region by region, waiting for each copy before starting
/// the next, and records every copy in [`keys::REGION_IMAGES`].
pub struct CopyImageStep<C: ?Sized> {
    client: Arc<C>,
    name: String,
    description: Option<String>,
    destinations: Vec<String>,
    wait: PollSpec,
    cleanup_wait: PollSpec,
    copies: Vec<(String, String)>,
}

impl<C> CopyImageStep<C>
where
    C: ResourceLifecycleClient + ?Sized,
{
    /// Captures the destination regions from the request.
    #[must_use]
    pub fn new(client: Arc<C>, request: &BuildRequest) -> Self {
        Self {
            client,
            name: request.image_name.clone(),
            description: request.image_description.clone(),
            destinations: request.destination_regions.clone(),
            wait: request.timeouts.image_wait(),
            cleanup_wait: request.timeouts.cleanup_wait(),
            copies: Vec::new(),
        }
    }

    async fn copy_to(
        &mut self,
        ctx: &StepContext,
        source: &ImageCopySpec,
    ) -> Result<String, BuildError> {
        let id = self
            .client
            .copy_image(source)
            .await
            .map_err(|err| BuildError::cloud("copy image", err))?;
        info!(
            image_id = %id,
            region = %source.destination_region,
            "image copy started"
        );
        self.copies
            .push((source.destination_region.clone(), id.clone()));

        let client = &*self.client;
        let filter = ImageFilter::by_id(&source.destination_region, &id);
        let what = format!("image copy {id} to complete");
        poll_until(
            &what,
            self.wait,
            ctx.cancel(),
            || {
                let probe = client.describe_images(&filter);
                async move { probe.await.map(|images| images.into_iter().next()) }
            },
            image_readiness,
        )
        .await?;
        Ok(id)
    }
}

impl<C> Step for CopyImageStep<C>
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
            let image_lookup = state.require(keys::IMAGE_ID).cloned();
            let region_lookup = state
                .require(keys::INSTANCE)
                .map(|instance| instance.region.clone());
            let (image_id, source_region) = match (image_lookup, region_lookup) {
                (Ok(image_id), Ok(region)) => (image_id, region),
                (Err(err), _) | (_, Err(err)) => return halt(state, NAME, err),
            };

            for destination in self.destinations.clone() {
                let spec = ImageCopySpec {
                    source_image_id: image_id.clone(),
                    source_region: source_region.clone(),
                    destination_region: destination.clone(),
                    name: self.name.clone(),
                    description: self.description.clone(),
                };
                match self.copy_to(ctx, &spec).await {
                    Ok(copy_id) => {
                        if let Some(regions) = state.get_mut(keys::REGION_IMAGES) {
                            regions.insert(destination, copy_id);
                        }
                    }
                    Err(err) => return halt(state, NAME, err),
                }
            }
            StepAction::Continue
        })
    }

    fn cleanup<'a>(&'a mut self, state: &'a mut StateBag) -> StepFuture<'a, CleanupOutcome> {
        Box::pin(async move {
            if self.copies.is_empty() {
                return CleanupOutcome::NothingToDo;
            }

            let client = &*self.client;
            let mut failures = Vec::new();
            while let Some((region, id)) = self.copies.pop() {
                let outcome = delete_with_retry(
                    NAME,
                    format!("image copy {id} in {region}"),
                    self.cleanup_wait,
                    || client.delete_image(&region, &id),
                )
                .await;
                if let CleanupOutcome::Failed(warning) = outcome {
                    failures.push(warning);
                }
            }

            let mut remaining = failures.into_iter();
            match remaining.next() {
                None => CleanupOutcome::Removed,
                Some(first) => {
                    for warning in remaining {
                        state.push_warning(warning);
                    }
                    CleanupOutcome::Failed(first)
                }
            }
        })
    }
}
