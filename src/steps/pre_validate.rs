//! Checks run before any resource is created.

use std::sync::Arc;

use tracing::info;

use crate::client::{ImageFilter, ResourceLifecycleClient};
use crate::error::{BuildError, ConfigurationIssue, ConfigurationIssues, RegionRole};
use crate::request::BuildRequest;
use crate::state::StateBag;
use crate::step::{CleanupOutcome, Step, StepAction, StepContext, StepFuture, halt};

/// Step name used in logs and failure reports.
pub const NAME: &str = "pre_validate";

/// Validates regions, copy support and the target image name.
///
/// Every check runs and every problem is reported in one
/// [`BuildError::Configuration`].
pub struct PreValidateStep<C: ?Sized> {
    client: Arc<C>,
    region: String,
    destination_regions: Vec<String>,
    image_name: String,
    skip_region_validation: bool,
    force_delete_existing: bool,
}

impl<C> PreValidateStep<C>
where
    C: ResourceLifecycleClient + ?Sized,
{
    /// Captures the inputs to validate.
    #[must_use]
    pub fn new(client: Arc<C>, request: &BuildRequest) -> Self {
        Self {
            client,
            region: request.region.clone(),
            destination_regions: request.destination_regions.clone(),
            image_name: request.image_name.clone(),
            skip_region_validation: request.options.skip_region_validation,
            force_delete_existing: request.options.force_delete_existing,
        }
    }

    async fn check_regions(&self, issues: &mut ConfigurationIssues) {
        if self.skip_region_validation {
            info!("skipping region validation");
            return;
        }

        let supported = match self.client.describe_regions().await {
            Ok(regions) => regions,
            Err(err) => {
                issues.push(ConfigurationIssue::RegionLookup(err));
                return;
            }
        };

        let candidates = std::iter::once((&self.region, RegionRole::Source)).chain(
            self.destination_regions
                .iter()
                .map(|region| (region, RegionRole::Destination)),
        );
        for (region, role) in candidates {
            if !supported.contains(region) {
                issues.push(ConfigurationIssue::InvalidRegion {
                    region: region.clone(),
                    role,
                });
            }
        }
    }

    fn check_copy_support(&self, issues: &mut ConfigurationIssues) {
        if self.destination_regions.is_empty() || self.client.supports_image_copy() {
            return;
        }
        for region in &self.destination_regions {
            issues.push(ConfigurationIssue::CopyUnsupported {
                region: region.clone(),
            });
        }
    }

    async fn check_image_name(&self, issues: &mut ConfigurationIssues) {
        if self.force_delete_existing {
            info!(image = %self.image_name, "existing images with this name will be replaced");
            return;
        }

        let filter = ImageFilter::by_name(&self.region, &self.image_name);
        match self.client.describe_images(&filter).await {
            Ok(images) => {
                if let Some(existing) = images.iter().find(|image| image.name == self.image_name) {
                    issues.push(ConfigurationIssue::ImageNameInUse {
                        name: self.image_name.clone(),
                        image_id: existing.id.clone(),
                    });
                }
            }
            Err(err) => issues.push(ConfigurationIssue::ImageLookup(err)),
        }
    }
}

impl<C> Step for PreValidateStep<C>
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
            let mut issues = ConfigurationIssues::new();
            self.check_regions(&mut issues).await;
            self.check_copy_support(&mut issues);
            self.check_image_name(&mut issues).await;

            if issues.is_empty() {
                StepAction::Continue
            } else {
                halt(state, NAME, BuildError::Configuration(issues))
            }
        })
    }

    fn cleanup<'a>(&'a mut self, _state: &'a mut StateBag) -> StepFuture<'a, CleanupOutcome> {
        Box::pin(async { CleanupOutcome::NothingToDo })
    }
}
