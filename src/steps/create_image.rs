//! Captures the image and waits for it to complete.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::client::{
    ImageDescriptor, ImageFilter, ImageSource, ImageSpec, ImageStatus, ResourceLifecycleClient,
};
use crate::error::BuildError;
use crate::poll::{PollSpec, Readiness, poll_until};
use crate::request::BuildRequest;
use crate::state::{StateBag, keys};
use crate::step::{CleanupOutcome, Step, StepAction, StepContext, StepFuture, halt};

use super::cleanup::delete_with_retry;

/// Step name used in logs and failure reports.
pub const NAME: &str = "create_image";

/// Creates the image from the stopped build instance (or from the system disk
/// snapshot when data disks are ignored).
///
/// On completion the state bag holds [`keys::IMAGE_ID`],
/// [`keys::SNAPSHOT_IDS`] and [`keys::REGION_IMAGES`].
pub struct CreateImageStep<C: ?Sized> {
    client: Arc<C>,
    name: String,
    description: Option<String>,
    version: Option<String>,
    from_snapshot: bool,
    wait: PollSpec,
    cleanup_wait: PollSpec,
    owned: Option<(String, String)>,
}

impl<C> CreateImageStep<C>
where
    C: ResourceLifecycleClient + ?Sized,
{
    /// Captures the image naming from the request.
    #[must_use]
    pub fn new(client: Arc<C>, request: &BuildRequest) -> Self {
        Self {
            client,
            name: request.image_name.clone(),
            description: request.image_description.clone(),
            version: request.image_version.clone(),
            from_snapshot: request.options.ignore_data_disks,
            wait: request.timeouts.image_wait(),
            cleanup_wait: request.timeouts.cleanup_wait(),
            owned: None,
        }
    }

    fn spec(&self, state: &StateBag) -> Result<ImageSpec, BuildError> {
        let instance = state.require(keys::INSTANCE)?;
        let source = if self.from_snapshot {
            ImageSource::Snapshot(state.require(keys::SOURCE_SNAPSHOT)?.clone())
        } else {
            ImageSource::Instance(instance.id.clone())
        };
        Ok(ImageSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            region: instance.region.clone(),
            source,
        })
    }
}

/// Readiness of an image that is still being built.
pub(crate) fn image_readiness(image: &ImageDescriptor) -> Readiness {
    match image.status {
        ImageStatus::CreateFailed | ImageStatus::Unavailable => {
            Readiness::Fatal(format!("image {} is {}", image.id, image.status))
        }
        _ => Readiness::from(image.is_complete()),
    }
}

impl<C> Step for CreateImageStep<C>
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
            let spec = match self.spec(state) {
                Ok(spec) => spec,
                Err(err) => return halt(state, NAME, err),
            };

            let id = match self.client.create_image(&spec).await {
                Ok(id) => id,
                Err(err) => return halt(state, NAME, BuildError::cloud("create image", err)),
            };
            info!(image_id = %id, name = %spec.name, "image creation started");
            self.owned = Some((spec.region.clone(), id.clone()));

            let client = &*self.client;
            let filter = ImageFilter::by_id(&spec.region, &id);
            let what = format!("image {id} to complete");
            let waited = poll_until(
                &what,
                self.wait,
                ctx.cancel(),
                || {
                    let probe = client.describe_images(&filter);
                    async move { probe.await.map(|images| images.into_iter().next()) }
                },
                image_readiness,
            )
            .await;

            match waited {
                Ok(image) => {
                    info!(image_id = %id, snapshots = image.snapshot_ids.len(), "image ready");
                    state.put(keys::SNAPSHOT_IDS, image.snapshot_ids);
                    state.put(
                        keys::REGION_IMAGES,
                        BTreeMap::from([(spec.region, id.clone())]),
                    );
                    state.put(keys::IMAGE_ID, id);
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
                format!("image {id}"),
                self.cleanup_wait,
                || client.delete_image(&region, &id),
            )
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn image(status: ImageStatus, progress: Option<&str>) -> ImageDescriptor {
        ImageDescriptor {
            id: String::from("img-1"),
            name: String::from("golden"),
            region: String::from("fr-par-1"),
            status,
            progress: progress.map(ToOwned::to_owned),
            snapshot_ids: Vec::new(),
        }
    }

    #[rstest]
    #[case(ImageStatus::Creating, Some("42%"), Readiness::NotReady)]
    #[case(ImageStatus::Waiting, None, Readiness::NotReady)]
    #[case(ImageStatus::Creating, Some("100%"), Readiness::Ready)]
    #[case(ImageStatus::Available, None, Readiness::Ready)]
    fn image_progress_drives_readiness(
        #[case] status: ImageStatus,
        #[case] progress: Option<&str>,
        #[case] expected: Readiness,
    ) {
        assert_eq!(image_readiness(&image(status, progress)), expected);
    }

    #[rstest]
    #[case(ImageStatus::CreateFailed)]
    #[case(ImageStatus::Unavailable)]
    fn failed_images_are_fatal(#[case] status: ImageStatus) {
        assert!(matches!(
            image_readiness(&image(status, Some("100%"))),
            Readiness::Fatal(_)
        ));
    }
}
