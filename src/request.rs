//! Build request accepted by the orchestrator.

use std::time::Duration;

use thiserror::Error;

use crate::client::{DiskMapping, NetworkMode};
use crate::poll::{DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT, PollSpec};

/// Errors raised while assembling a [`BuildRequest`].
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum RequestError {
    /// A required field is missing or blank.
    #[error("missing or empty field: {0}")]
    Validation(String),
    /// A destination region repeats the source region or another destination.
    #[error("duplicate region: {0}")]
    DuplicateRegion(String),
}

/// Behaviour switches for one build.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "each flag is an independent user-facing switch"
)]
pub struct BuildOptions {
    /// Skip checking regions against the provider's supported set.
    pub skip_region_validation: bool,
    /// Delete images that already carry the target name before building.
    pub force_delete_existing: bool,
    /// Build the image from a system disk snapshot, leaving data disks out.
    pub ignore_data_disks: bool,
    /// Delete the build instance once the image is ready.
    pub delete_build_instance: bool,
}

/// Wait budgets for each resource kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BuildTimeouts {
    /// Budget for the build instance to reach `Stopped`.
    pub instance: Duration,
    /// Budget for an image (or image copy) to complete.
    pub image: Duration,
    /// Budget for a snapshot to complete.
    pub snapshot: Duration,
    /// Budget for retrying a compensating delete.
    pub cleanup: Duration,
    /// Delay between probes.
    pub poll_interval: Duration,
}

impl Default for BuildTimeouts {
    fn default() -> Self {
        Self {
            instance: Duration::from_secs(300),
            image: Duration::from_secs(3600),
            snapshot: Duration::from_secs(3600),
            cleanup: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl BuildTimeouts {
    /// Poll settings for the instance wait.
    #[must_use]
    pub const fn instance_wait(&self) -> PollSpec {
        PollSpec::new(self.instance, self.poll_interval)
    }

    /// Poll settings for image and image copy waits.
    #[must_use]
    pub const fn image_wait(&self) -> PollSpec {
        PollSpec::new(self.image, self.poll_interval)
    }

    /// Poll settings for snapshot waits.
    #[must_use]
    pub const fn snapshot_wait(&self) -> PollSpec {
        PollSpec::new(self.snapshot, self.poll_interval)
    }

    /// Poll settings for compensating deletes.
    #[must_use]
    pub const fn cleanup_wait(&self) -> PollSpec {
        PollSpec::new(self.cleanup, self.poll_interval)
    }
}

/// Everything one build needs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildRequest {
    /// Name of the image to produce.
    pub image_name: String,
    /// Optional image description.
    pub image_description: Option<String>,
    /// Optional image version label.
    pub image_version: Option<String>,
    /// Region (or zone) the build runs in.
    pub region: String,
    /// Regions receiving a copy of the image.
    pub destination_regions: Vec<String>,
    /// Commercial type for the build instance.
    pub instance_type: String,
    /// Image the build instance boots from.
    pub source_image: String,
    /// CPU architecture of the build instance.
    pub architecture: String,
    /// Whether to request I/O optimised storage.
    pub io_optimized: bool,
    /// System disk layout.
    pub system_disk: DiskMapping,
    /// Additional data disks.
    pub data_disks: Vec<DiskMapping>,
    /// Network placement of the build instance.
    pub network: NetworkMode,
    /// User data for the first boot.
    pub user_data: Option<String>,
    /// Tags applied to created resources.
    pub tags: Vec<String>,
    /// Behaviour switches.
    pub options: BuildOptions,
    /// Wait budgets.
    pub timeouts: BuildTimeouts,
}

impl BuildRequest {
    /// Starts a builder for a [`BuildRequest`].
    #[must_use]
    pub fn builder() -> BuildRequestBuilder {
        BuildRequestBuilder::new()
    }

    /// Name given to the temporary build instance.
    #[must_use]
    pub fn instance_name(&self) -> String {
        format!("imagewright-{}", self.image_name)
    }

    /// Validates required fields and region uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] for blank required fields and
    /// [`RequestError::DuplicateRegion`] when a region is listed twice.
    pub fn validate(&self) -> Result<(), RequestError> {
        let required = [
            ("image_name", &self.image_name),
            ("region", &self.region),
            ("instance_type", &self.instance_type),
            ("source_image", &self.source_image),
            ("architecture", &self.architecture),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(RequestError::Validation(field.to_owned()));
            }
        }

        let mut seen = vec![self.region.as_str()];
        for region in &self.destination_regions {
            if region.is_empty() {
                return Err(RequestError::Validation(String::from("destination_regions")));
            }
            if seen.contains(&region.as_str()) {
                return Err(RequestError::DuplicateRegion(region.clone()));
            }
            seen.push(region);
        }
        Ok(())
    }
}

/// Builder for [`BuildRequest`] that trims and validates on construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BuildRequestBuilder {
    image_name: String,
    image_description: Option<String>,
    image_version: Option<String>,
    region: String,
    destination_regions: Vec<String>,
    instance_type: String,
    source_image: String,
    architecture: String,
    io_optimized: bool,
    system_disk: DiskMapping,
    data_disks: Vec<DiskMapping>,
    network: NetworkMode,
    user_data: Option<String>,
    tags: Vec<String>,
    options: BuildOptions,
    timeouts: Option<BuildTimeouts>,
}

impl BuildRequestBuilder {
    /// Creates an empty builder; required fields must be set before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the image name.
    #[must_use]
    pub fn image_name(mut self, value: impl Into<String>) -> Self {
        self.image_name = value.into();
        self
    }

    /// Sets the optional image description.
    #[must_use]
    pub fn image_description(mut self, value: Option<String>) -> Self {
        self.image_description = value;
        self
    }

    /// Sets the optional image version.
    #[must_use]
    pub fn image_version(mut self, value: Option<String>) -> Self {
        self.image_version = value;
        self
    }

    /// Sets the build region.
    #[must_use]
    pub fn region(mut self, value: impl Into<String>) -> Self {
        self.region = value.into();
        self
    }

    /// Adds a destination region.
    #[must_use]
    pub fn destination_region(mut self, value: impl Into<String>) -> Self {
        self.destination_regions.push(value.into());
        self
    }

    /// Replaces the destination regions.
    #[must_use]
    pub fn destination_regions<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.destination_regions = values.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the instance type.
    #[must_use]
    pub fn instance_type(mut self, value: impl Into<String>) -> Self {
        self.instance_type = value.into();
        self
    }

    /// Sets the source image.
    #[must_use]
    pub fn source_image(mut self, value: impl Into<String>) -> Self {
        self.source_image = value.into();
        self
    }

    /// Sets the architecture.
    #[must_use]
    pub fn architecture(mut self, value: impl Into<String>) -> Self {
        self.architecture = value.into();
        self
    }

    /// Requests I/O optimised storage.
    #[must_use]
    pub const fn io_optimized(mut self, value: bool) -> Self {
        self.io_optimized = value;
        self
    }

    /// Sets the system disk layout.
    #[must_use]
    pub fn system_disk(mut self, value: DiskMapping) -> Self {
        self.system_disk = value;
        self
    }

    /// Adds a data disk.
    #[must_use]
    pub fn data_disk(mut self, value: DiskMapping) -> Self {
        self.data_disks.push(value);
        self
    }

    /// Sets the network mode.
    #[must_use]
    pub fn network(mut self, value: NetworkMode) -> Self {
        self.network = value;
        self
    }

    /// Sets the user data.
    #[must_use]
    pub fn user_data(mut self, value: Option<String>) -> Self {
        self.user_data = value;
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, value: impl Into<String>) -> Self {
        self.tags.push(value.into());
        self
    }

    /// Sets the behaviour switches.
    #[must_use]
    pub const fn options(mut self, value: BuildOptions) -> Self {
        self.options = value;
        self
    }

    /// Sets the wait budgets.
    #[must_use]
    pub const fn timeouts(mut self, value: BuildTimeouts) -> Self {
        self.timeouts = Some(value);
        self
    }

    /// Builds and validates the [`BuildRequest`], trimming string inputs and
    /// dropping blank optional values.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when validation fails.
    pub fn build(self) -> Result<BuildRequest, RequestError> {
        let request = BuildRequest {
            image_name: self.image_name.trim().to_owned(),
            image_description: trimmed(self.image_description),
            image_version: trimmed(self.image_version),
            region: self.region.trim().to_owned(),
            destination_regions: self
                .destination_regions
                .iter()
                .map(|region| region.trim().to_owned())
                .collect(),
            instance_type: self.instance_type.trim().to_owned(),
            source_image: self.source_image.trim().to_owned(),
            architecture: self.architecture.trim().to_owned(),
            io_optimized: self.io_optimized,
            system_disk: self.system_disk,
            data_disks: self.data_disks,
            network: self.network,
            user_data: self.user_data,
            tags: self.tags,
            options: self.options,
            timeouts: self.timeouts.unwrap_or_default(),
        };
        request.validate()?;
        Ok(request)
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}
