//! Resource lifecycle capability consumed by the build pipeline.
//!
//! The pipeline never talks to a provider directly. It drives a
//! [`ResourceLifecycleClient`], treats every returned resource as an opaque
//! descriptor with an identifier and a status, and branches on the
//! classification carried by [`CloudError`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Future returned by client operations.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CloudError>> + Send + 'a>>;

/// Classification of a provider failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CloudErrorKind {
    /// The resource exists but has not finished initialising.
    NotReady,
    /// The operation was rejected because the resource is mid-transition.
    TransientConflict,
    /// The resource does not exist (or no longer exists).
    NotFound,
    /// Any other failure; retrying will not help.
    Permanent,
}

/// Error returned by a [`ResourceLifecycleClient`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{code}: {message}")]
pub struct CloudError {
    /// Classification used by the polling and cleanup logic.
    pub kind: CloudErrorKind,
    /// Provider error code (for example `IncorrectInstanceStatus.Initializing`).
    pub code: String,
    /// Human readable message returned by the provider.
    pub message: String,
}

impl CloudError {
    /// Builds an error with an explicit classification.
    #[must_use]
    pub fn new(kind: CloudErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Builds a [`CloudErrorKind::Permanent`] error.
    #[must_use]
    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(CloudErrorKind::Permanent, code, message)
    }

    /// Builds a [`CloudErrorKind::TransientConflict`] error.
    #[must_use]
    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(CloudErrorKind::TransientConflict, code, message)
    }

    /// Builds a [`CloudErrorKind::NotFound`] error.
    #[must_use]
    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(CloudErrorKind::NotFound, code, message)
    }

    /// Returns true when the operation may succeed once the resource settles.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            CloudErrorKind::NotReady | CloudErrorKind::TransientConflict
        )
    }

    /// Returns true when the provider reports the resource as absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind, CloudErrorKind::NotFound)
    }
}

/// Lifecycle status reported for an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InstanceStatus {
    /// Accepted by the provider but not yet allocated.
    Pending,
    /// Booting.
    Starting,
    /// Running.
    Running,
    /// Shutting down.
    Stopping,
    /// Powered off; the state images are taken from.
    Stopped,
    /// Any status the pipeline does not model.
    Other(String),
}

impl InstanceStatus {
    /// Parses a provider status, ignoring case and separators.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match normalise(raw).as_str() {
            "pending" => Self::Pending,
            "starting" => Self::Starting,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            "stopped" | "stoppedinplace" => Self::Stopped,
            _ => Self::Other(raw.to_owned()),
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Starting => f.write_str("Starting"),
            Self::Running => f.write_str("Running"),
            Self::Stopping => f.write_str("Stopping"),
            Self::Stopped => f.write_str("Stopped"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// Lifecycle status reported for an image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImageStatus {
    /// Queued behind another image operation.
    Waiting,
    /// Snapshots are still being taken.
    Creating,
    /// Ready for use.
    Available,
    /// Exists but cannot be used.
    Unavailable,
    /// Creation failed; the image will never become available.
    CreateFailed,
    /// Any status the pipeline does not model.
    Other(String),
}

impl ImageStatus {
    /// Parses a provider status, ignoring case and separators.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match normalise(raw).as_str() {
            "waiting" => Self::Waiting,
            "creating" => Self::Creating,
            "available" => Self::Available,
            "unavailable" => Self::Unavailable,
            "createfailed" | "error" => Self::CreateFailed,
            _ => Self::Other(raw.to_owned()),
        }
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => f.write_str("Waiting"),
            Self::Creating => f.write_str("Creating"),
            Self::Available => f.write_str("Available"),
            Self::Unavailable => f.write_str("UnAvailable"),
            Self::CreateFailed => f.write_str("CreateFailed"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

fn normalise(raw: &str) -> String {
    raw.chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

/// Parses a provider progress string such as `"42%"`.
///
/// Returns `None` when the value is not a percentage between 0 and 100.
#[must_use]
pub fn parse_progress(raw: &str) -> Option<u8> {
    let digits = raw.trim().trim_end_matches('%').trim();
    digits.parse::<u8>().ok().filter(|value| *value <= 100)
}

/// Current view of an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceDescriptor {
    /// Provider assigned identifier.
    pub id: String,
    /// Region (or zone) hosting the instance.
    pub region: String,
    /// Current lifecycle status.
    pub status: InstanceStatus,
    /// Identifier of the system disk, when the provider exposes it.
    pub system_disk_id: Option<String>,
}

/// Current view of an image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageDescriptor {
    /// Provider assigned identifier.
    pub id: String,
    /// Image name.
    pub name: String,
    /// Region (or zone) hosting the image.
    pub region: String,
    /// Current lifecycle status.
    pub status: ImageStatus,
    /// Creation progress such as `"80%"`, when reported.
    pub progress: Option<String>,
    /// Snapshots referenced by the image's disk device mappings.
    pub snapshot_ids: Vec<String>,
}

impl ImageDescriptor {
    /// Returns true when the image reports completion.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == ImageStatus::Available
            || self.progress.as_deref().and_then(parse_progress) == Some(100)
    }
}

/// Current view of a snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotDescriptor {
    /// Provider assigned identifier.
    pub id: String,
    /// Raw provider status.
    pub status: String,
    /// Creation progress such as `"100%"`, when reported.
    pub progress: Option<String>,
}

impl SnapshotDescriptor {
    /// Returns true when the snapshot reports completion.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.progress.as_deref().and_then(parse_progress) == Some(100)
    }
}

/// Disk attached to a new instance.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiskMapping {
    /// Optional disk name.
    pub name: Option<String>,
    /// Provider disk category or volume type.
    pub category: Option<String>,
    /// Size in gigabytes; zero lets the provider pick.
    pub size_gb: u32,
    /// Snapshot to restore the disk from.
    pub snapshot_id: Option<String>,
    /// Optional description.
    pub description: Option<String>,
    /// Whether the disk is released together with the instance.
    pub delete_with_instance: bool,
    /// Device name hint (for example `/dev/xvdb`).
    pub device: Option<String>,
}

/// Network placement for the build instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkMode {
    /// Instance receives a public address.
    Public {
        /// Billing mode for outbound traffic.
        charge_type: String,
        /// Outbound bandwidth cap in Mbit/s.
        max_bandwidth_out_mbps: u32,
    },
    /// Instance is only reachable on a private network.
    Private {
        /// Private network or vswitch to attach to, when known.
        network_id: Option<String>,
    },
}

/// Default billing mode for public instances.
pub const DEFAULT_CHARGE_TYPE: &str = "PayByTraffic";
/// Default outbound bandwidth for public instances.
pub const DEFAULT_MAX_BANDWIDTH_OUT_MBPS: u32 = 5;

impl Default for NetworkMode {
    fn default() -> Self {
        Self::Public {
            charge_type: DEFAULT_CHARGE_TYPE.to_owned(),
            max_bandwidth_out_mbps: DEFAULT_MAX_BANDWIDTH_OUT_MBPS,
        }
    }
}

/// Everything a provider needs to create the build instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSpec {
    /// Idempotency token for the creation call.
    pub client_token: String,
    /// Instance name.
    pub name: String,
    /// Region (or zone) to create the instance in.
    pub region: String,
    /// Commercial type or flavour.
    pub instance_type: String,
    /// Source image identifier or label.
    pub source_image: String,
    /// CPU architecture used to resolve the source image.
    pub architecture: String,
    /// Whether to request I/O optimised storage.
    pub io_optimized: bool,
    /// System disk layout.
    pub system_disk: DiskMapping,
    /// Additional data disks.
    pub data_disks: Vec<DiskMapping>,
    /// Network placement.
    pub network: NetworkMode,
    /// User data passed to the first boot.
    pub user_data: Option<String>,
    /// Tags applied to the instance.
    pub tags: Vec<String>,
}

/// What an image is captured from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImageSource {
    /// Capture every disk of an instance.
    Instance(String),
    /// Capture a single system disk snapshot.
    Snapshot(String),
}

/// Parameters for an image creation call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageSpec {
    /// Image name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional version label.
    pub version: Option<String>,
    /// Region (or zone) hosting the source.
    pub region: String,
    /// Source of the image.
    pub source: ImageSource,
}

/// Parameters for copying an image into another region.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageCopySpec {
    /// Image to copy.
    pub source_image_id: String,
    /// Region hosting the source image.
    pub source_region: String,
    /// Region receiving the copy.
    pub destination_region: String,
    /// Name of the copy.
    pub name: String,
    /// Optional description of the copy.
    pub description: Option<String>,
}

/// Parameters for a disk snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotSpec {
    /// Disk to snapshot.
    pub disk_id: String,
    /// Region (or zone) hosting the disk.
    pub region: String,
    /// Snapshot name.
    pub name: String,
}

/// Filter used to look images up.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ImageFilter {
    /// Region (or zone) to search.
    pub region: String,
    /// Exact image identifier.
    pub image_id: Option<String>,
    /// Exact image name.
    pub name: Option<String>,
}

impl ImageFilter {
    /// Filter matching a single image by identifier.
    #[must_use]
    pub fn by_id(region: impl Into<String>, image_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            image_id: Some(image_id.into()),
            name: None,
        }
    }

    /// Filter matching images by name.
    #[must_use]
    pub fn by_name(region: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            image_id: None,
            name: Some(name.into()),
        }
    }
}

/// Provider operations the build pipeline relies on.
///
/// Implementations must classify failures through [`CloudError::kind`]; the
/// pipeline retries [`CloudErrorKind::TransientConflict`] deletes and treats
/// [`CloudErrorKind::NotFound`] deletes as already done.
pub trait ResourceLifecycleClient: Send + Sync {
    /// Lists the regions (or zones) the provider accepts.
    fn describe_regions(&self) -> ClientFuture<'_, Vec<String>>;

    /// Creates an instance and returns its identifier.
    fn create_instance<'a>(&'a self, spec: &'a InstanceSpec) -> ClientFuture<'a, String>;

    /// Describes an instance; `None` when the provider has no data yet.
    fn describe_instance<'a>(
        &'a self,
        region: &'a str,
        instance_id: &'a str,
    ) -> ClientFuture<'a, Option<InstanceDescriptor>>;

    /// Deletes an instance, stopping it first when `force` is set.
    fn delete_instance<'a>(
        &'a self,
        region: &'a str,
        instance_id: &'a str,
        force: bool,
    ) -> ClientFuture<'a, ()>;

    /// Starts image creation and returns the new image identifier.
    fn create_image<'a>(&'a self, spec: &'a ImageSpec) -> ClientFuture<'a, String>;

    /// Lists images matching the filter.
    fn describe_images<'a>(
        &'a self,
        filter: &'a ImageFilter,
    ) -> ClientFuture<'a, Vec<ImageDescriptor>>;

    /// Deletes an image.
    fn delete_image<'a>(&'a self, region: &'a str, image_id: &'a str) -> ClientFuture<'a, ()>;

    /// Whether [`copy_image`](Self::copy_image) can be served at all.
    fn supports_image_copy(&self) -> bool;

    /// Starts an image copy and returns the identifier of the copy.
    fn copy_image<'a>(&'a self, spec: &'a ImageCopySpec) -> ClientFuture<'a, String>;

    /// Starts a disk snapshot and returns the snapshot identifier.
    fn create_snapshot<'a>(&'a self, spec: &'a SnapshotSpec) -> ClientFuture<'a, String>;

    /// Describes a snapshot; `None` when the provider has no data yet.
    fn describe_snapshot<'a>(
        &'a self,
        region: &'a str,
        snapshot_id: &'a str,
    ) -> ClientFuture<'a, Option<SnapshotDescriptor>>;

    /// Deletes a snapshot.
    fn delete_snapshot<'a>(&'a self, region: &'a str, snapshot_id: &'a str)
    -> ClientFuture<'a, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("42%", Some(42))]
    #[case("100%", Some(100))]
    #[case(" 7 % ", Some(7))]
    #[case("101%", None)]
    #[case("", None)]
    #[case("done", None)]
    fn progress_parses_percentages(#[case] raw: &str, #[case] expected: Option<u8>) {
        assert_eq!(parse_progress(raw), expected);
    }

    #[rstest]
    #[case("Stopped", InstanceStatus::Stopped)]
    #[case("stopped in place", InstanceStatus::Stopped)]
    #[case("running", InstanceStatus::Running)]
    #[case("locked", InstanceStatus::Other(String::from("locked")))]
    fn instance_status_parses_provider_spellings(
        #[case] raw: &str,
        #[case] expected: InstanceStatus,
    ) {
        assert_eq!(InstanceStatus::parse(raw), expected);
    }

    #[test]
    fn image_is_complete_on_full_progress_or_available() {
        let mut image = ImageDescriptor {
            id: String::from("img-1"),
            name: String::from("golden"),
            region: String::from("fr-par-1"),
            status: ImageStatus::Creating,
            progress: Some(String::from("80%")),
            snapshot_ids: Vec::new(),
        };
        assert!(!image.is_complete());

        image.progress = Some(String::from("100%"));
        assert!(image.is_complete());

        image.progress = None;
        image.status = ImageStatus::Available;
        assert!(image.is_complete());
    }

    #[test]
    fn transient_classification_covers_not_ready_and_conflict() {
        assert!(CloudError::transient("IncorrectInstanceStatus.Initializing", "busy").is_transient());
        assert!(CloudError::new(CloudErrorKind::NotReady, "NotReady", "later").is_transient());
        assert!(!CloudError::permanent("Forbidden", "no").is_transient());
        assert!(CloudError::not_found("NotFound", "gone").is_not_found());
    }
}
