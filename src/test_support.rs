//! Test support utilities shared across unit and integration tests.
//!
//! [`ScriptedCloud`] is an in-memory [`ResourceLifecycleClient`] whose answers
//! are queued up front. Probe queues hand out entries in FIFO order and then
//! keep repeating the last one, so "never becomes ready" needs a single entry.
//! Create and delete queues are consumed once and fall back to success when
//! empty. Every call is recorded in order.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::client::{
    ClientFuture, CloudError, ImageCopySpec, ImageDescriptor, ImageFilter, ImageSource,
    ImageSpec, ImageStatus, InstanceDescriptor, InstanceSpec, InstanceStatus,
    ResourceLifecycleClient, SnapshotDescriptor, SnapshotSpec,
};

/// Regions a fresh [`ScriptedCloud`] reports as supported.
pub const DEFAULT_REGIONS: [&str; 4] = ["fr-par-1", "fr-par-2", "nl-ams-1", "pl-waw-1"];

/// One call made against a [`ScriptedCloud`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CloudCall {
    /// `describe_regions`.
    DescribeRegions,
    /// `create_instance`.
    CreateInstance {
        /// Requested instance name.
        name: String,
        /// Requested region.
        region: String,
        /// Idempotency token sent with the call.
        client_token: String,
    },
    /// `describe_instance`.
    DescribeInstance {
        /// Probed instance.
        instance_id: String,
    },
    /// `delete_instance`.
    DeleteInstance {
        /// Instance to delete.
        instance_id: String,
        /// Whether a forced delete was requested.
        force: bool,
    },
    /// `create_image`.
    CreateImage {
        /// Requested image name.
        name: String,
        /// Source the image is captured from.
        source: ImageSource,
    },
    /// `describe_images`.
    DescribeImages {
        /// Filter used for the lookup.
        filter: ImageFilter,
    },
    /// `delete_image`.
    DeleteImage {
        /// Region hosting the image.
        region: String,
        /// Image to delete.
        image_id: String,
    },
    /// `copy_image`.
    CopyImage {
        /// Image being copied.
        source_image_id: String,
        /// Region receiving the copy.
        destination_region: String,
    },
    /// `create_snapshot`.
    CreateSnapshot {
        /// Disk being captured.
        disk_id: String,
    },
    /// `describe_snapshot`.
    DescribeSnapshot {
        /// Probed snapshot.
        snapshot_id: String,
    },
    /// `delete_snapshot`.
    DeleteSnapshot {
        /// Snapshot to delete.
        snapshot_id: String,
    },
}

impl CloudCall {
    /// Returns true for any delete call.
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(
            self,
            Self::DeleteInstance { .. } | Self::DeleteImage { .. } | Self::DeleteSnapshot { .. }
        )
    }

    /// Identifier of the resource a delete call targets.
    #[must_use]
    pub fn deleted_resource(&self) -> Option<&str> {
        match self {
            Self::DeleteInstance { instance_id, .. } => Some(instance_id),
            Self::DeleteImage { image_id, .. } => Some(image_id),
            Self::DeleteSnapshot { snapshot_id } => Some(snapshot_id),
            _ => None,
        }
    }
}

/// Image status and progress returned by one image probe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageSample {
    /// Reported status.
    pub status: ImageStatus,
    /// Reported progress.
    pub progress: Option<String>,
}

impl ImageSample {
    /// A `Creating` image at the given progress.
    #[must_use]
    pub fn creating(progress: &str) -> Self {
        Self {
            status: ImageStatus::Creating,
            progress: Some(progress.to_owned()),
        }
    }

    /// An image in the given status without progress.
    #[must_use]
    pub const fn status(status: ImageStatus) -> Self {
        Self {
            status,
            progress: None,
        }
    }
}

#[derive(Debug)]
struct Script {
    regions: Result<Vec<String>, CloudError>,
    existing_images: Vec<ImageDescriptor>,
    image_lookup_error: Option<CloudError>,
    instance_creates: VecDeque<Result<String, CloudError>>,
    instance_probes: VecDeque<Result<Option<InstanceStatus>, CloudError>>,
    system_disk_id: Option<String>,
    instance_deletes: VecDeque<Result<(), CloudError>>,
    image_creates: VecDeque<Result<String, CloudError>>,
    image_samples: VecDeque<Result<ImageSample, CloudError>>,
    image_snapshot_ids: Vec<String>,
    image_deletes: VecDeque<Result<(), CloudError>>,
    copy_supported: bool,
    copy_creates: VecDeque<Result<String, CloudError>>,
    copy_samples: VecDeque<Result<ImageSample, CloudError>>,
    snapshot_creates: VecDeque<Result<String, CloudError>>,
    snapshot_progress: VecDeque<Result<String, CloudError>>,
    snapshot_deletes: VecDeque<Result<(), CloudError>>,
    created_images: Vec<(String, String)>,
    created_copies: Vec<String>,
    next_id: u32,
    calls: Vec<CloudCall>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            regions: Ok(DEFAULT_REGIONS.iter().map(|region| (*region).to_owned()).collect()),
            existing_images: Vec::new(),
            image_lookup_error: None,
            instance_creates: VecDeque::new(),
            instance_probes: VecDeque::new(),
            system_disk_id: Some(String::from("vol-system")),
            instance_deletes: VecDeque::new(),
            image_creates: VecDeque::new(),
            image_samples: VecDeque::new(),
            image_snapshot_ids: vec![String::from("snap-root")],
            image_deletes: VecDeque::new(),
            copy_supported: true,
            copy_creates: VecDeque::new(),
            copy_samples: VecDeque::new(),
            snapshot_creates: VecDeque::new(),
            snapshot_progress: VecDeque::new(),
            snapshot_deletes: VecDeque::new(),
            created_images: Vec::new(),
            created_copies: Vec::new(),
            next_id: 0,
            calls: Vec::new(),
        }
    }
}

impl Script {
    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id = self.next_id.saturating_add(1);
        format!("{prefix}-{}", self.next_id)
    }
}

fn sticky<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

fn once<T>(queue: &mut VecDeque<T>) -> Option<T> {
    queue.pop_front()
}

/// Scripted in-memory cloud used to drive the pipeline deterministically.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCloud {
    script: Arc<Mutex<Script>>,
}

impl ScriptedCloud {
    /// Creates a cloud where every call succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut script)
    }

    /// Replaces the supported region list.
    pub fn set_regions(&self, regions: &[&str]) {
        self.with_script(|script| {
            script.regions = Ok(regions.iter().map(|region| (*region).to_owned()).collect());
        });
    }

    /// Makes region listing fail.
    pub fn fail_region_lookup(&self, error: CloudError) {
        self.with_script(|script| script.regions = Err(error));
    }

    /// Reports image copies as unsupported, like a provider without a copy
    /// API.
    pub fn disable_image_copy(&self) {
        self.with_script(|script| script.copy_supported = false);
    }

    /// Makes image lookups by name fail.
    pub fn fail_image_lookup(&self, error: CloudError) {
        self.with_script(|script| script.image_lookup_error = Some(error));
    }

    /// Seeds an image that already exists before the build.
    pub fn add_existing_image(&self, region: &str, name: &str, image_id: &str, snapshots: &[&str]) {
        self.with_script(|script| {
            script.existing_images.push(ImageDescriptor {
                id: image_id.to_owned(),
                name: name.to_owned(),
                region: region.to_owned(),
                status: ImageStatus::Available,
                progress: Some(String::from("100%")),
                snapshot_ids: snapshots.iter().map(|id| (*id).to_owned()).collect(),
            });
        });
    }

    /// Queues the answer to the next `create_instance` call.
    pub fn push_instance_create(&self, result: Result<String, CloudError>) {
        self.with_script(|script| script.instance_creates.push_back(result));
    }

    /// Queues an instance status for the next probe.
    pub fn push_instance_status(&self, status: InstanceStatus) {
        self.with_script(|script| script.instance_probes.push_back(Ok(Some(status))));
    }

    /// Queues an empty instance probe ("no data yet").
    pub fn push_instance_unknown(&self) {
        self.with_script(|script| script.instance_probes.push_back(Ok(None)));
    }

    /// Queues an instance probe failure.
    pub fn push_instance_probe_error(&self, error: CloudError) {
        self.with_script(|script| script.instance_probes.push_back(Err(error)));
    }

    /// Sets the system disk reported for created instances.
    pub fn set_system_disk(&self, disk_id: Option<&str>) {
        self.with_script(|script| script.system_disk_id = disk_id.map(ToOwned::to_owned));
    }

    /// Queues the answer to the next `delete_instance` call.
    pub fn push_instance_delete(&self, result: Result<(), CloudError>) {
        self.with_script(|script| script.instance_deletes.push_back(result));
    }

    /// Queues the answer to the next `create_image` call.
    pub fn push_image_create(&self, result: Result<String, CloudError>) {
        self.with_script(|script| script.image_creates.push_back(result));
    }

    /// Queues a sample for the next probe of a created image.
    pub fn push_image_sample(&self, sample: ImageSample) {
        self.with_script(|script| script.image_samples.push_back(Ok(sample)));
    }

    /// Queues a probe failure for the next probe of a created image.
    pub fn push_image_probe_error(&self, error: CloudError) {
        self.with_script(|script| script.image_samples.push_back(Err(error)));
    }

    /// Sets the snapshots reported for created images.
    pub fn set_image_snapshots(&self, snapshot_ids: &[&str]) {
        self.with_script(|script| {
            script.image_snapshot_ids = snapshot_ids.iter().map(|id| (*id).to_owned()).collect();
        });
    }

    /// Queues the answer to the next `delete_image` call.
    pub fn push_image_delete(&self, result: Result<(), CloudError>) {
        self.with_script(|script| script.image_deletes.push_back(result));
    }

    /// Queues the answer to the next `copy_image` call.
    pub fn push_copy_create(&self, result: Result<String, CloudError>) {
        self.with_script(|script| script.copy_creates.push_back(result));
    }

    /// Queues a sample for the next probe of an image copy.
    pub fn push_copy_sample(&self, sample: ImageSample) {
        self.with_script(|script| script.copy_samples.push_back(Ok(sample)));
    }

    /// Queues the answer to the next `create_snapshot` call.
    pub fn push_snapshot_create(&self, result: Result<String, CloudError>) {
        self.with_script(|script| script.snapshot_creates.push_back(result));
    }

    /// Queues a snapshot progress value for the next probe.
    pub fn push_snapshot_progress(&self, progress: &str) {
        self.with_script(|script| script.snapshot_progress.push_back(Ok(progress.to_owned())));
    }

    /// Queues the answer to the next `delete_snapshot` call.
    pub fn push_snapshot_delete(&self, result: Result<(), CloudError>) {
        self.with_script(|script| script.snapshot_deletes.push_back(result));
    }

    /// Returns every call recorded so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CloudCall> {
        self.with_script(|script| script.calls.clone())
    }

    /// Counts the recorded calls matching `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&CloudCall) -> bool) -> usize {
        self.with_script(|script| script.calls.iter().filter(|call| predicate(call)).count())
    }

    /// Number of instance probes issued.
    #[must_use]
    pub fn instance_probes(&self) -> usize {
        self.count(|call| matches!(call, CloudCall::DescribeInstance { .. }))
    }

    /// Number of image probes issued by id.
    #[must_use]
    pub fn image_probes(&self) -> usize {
        self.count(|call| {
            matches!(call, CloudCall::DescribeImages { filter } if filter.image_id.is_some())
        })
    }

    /// Identifiers targeted by delete calls, in call order.
    #[must_use]
    pub fn deleted_resources(&self) -> Vec<String> {
        self.with_script(|script| {
            script
                .calls
                .iter()
                .filter_map(CloudCall::deleted_resource)
                .map(ToOwned::to_owned)
                .collect()
        })
    }

    fn record(&self, call: CloudCall) {
        self.with_script(|script| script.calls.push(call));
    }
}

impl ResourceLifecycleClient for ScriptedCloud {
    fn describe_regions(&self) -> ClientFuture<'_, Vec<String>> {
        self.record(CloudCall::DescribeRegions);
        let result = self.with_script(|script| script.regions.clone());
        Box::pin(async move { result })
    }

    fn create_instance<'a>(&'a self, spec: &'a InstanceSpec) -> ClientFuture<'a, String> {
        self.record(CloudCall::CreateInstance {
            name: spec.name.clone(),
            region: spec.region.clone(),
            client_token: spec.client_token.clone(),
        });
        let result = self.with_script(|script| {
            once(&mut script.instance_creates).unwrap_or_else(|| Ok(script.fresh_id("i")))
        });
        Box::pin(async move { result })
    }

    fn describe_instance<'a>(
        &'a self,
        region: &'a str,
        instance_id: &'a str,
    ) -> ClientFuture<'a, Option<InstanceDescriptor>> {
        self.record(CloudCall::DescribeInstance {
            instance_id: instance_id.to_owned(),
        });
        let result = self.with_script(|script| {
            let probe = sticky(&mut script.instance_probes)
                .unwrap_or(Ok(Some(InstanceStatus::Stopped)));
            probe.map(|status| {
                status.map(|found| InstanceDescriptor {
                    id: instance_id.to_owned(),
                    region: region.to_owned(),
                    status: found,
                    system_disk_id: script.system_disk_id.clone(),
                })
            })
        });
        Box::pin(async move { result })
    }

    fn delete_instance<'a>(
        &'a self,
        _region: &'a str,
        instance_id: &'a str,
        force: bool,
    ) -> ClientFuture<'a, ()> {
        self.record(CloudCall::DeleteInstance {
            instance_id: instance_id.to_owned(),
            force,
        });
        let result =
            self.with_script(|script| once(&mut script.instance_deletes).unwrap_or(Ok(())));
        Box::pin(async move { result })
    }

    fn create_image<'a>(&'a self, spec: &'a ImageSpec) -> ClientFuture<'a, String> {
        self.record(CloudCall::CreateImage {
            name: spec.name.clone(),
            source: spec.source.clone(),
        });
        let result = self.with_script(|script| {
            let created =
                once(&mut script.image_creates).unwrap_or_else(|| Ok(script.fresh_id("img")));
            if let Ok(id) = &created {
                script.created_images.push((id.clone(), spec.name.clone()));
            }
            created
        });
        Box::pin(async move { result })
    }

    fn describe_images<'a>(
        &'a self,
        filter: &'a ImageFilter,
    ) -> ClientFuture<'a, Vec<ImageDescriptor>> {
        self.record(CloudCall::DescribeImages {
            filter: filter.clone(),
        });
        let result = self.with_script(|script| describe_scripted_images(script, filter));
        Box::pin(async move { result })
    }

    fn delete_image<'a>(&'a self, region: &'a str, image_id: &'a str) -> ClientFuture<'a, ()> {
        self.record(CloudCall::DeleteImage {
            region: region.to_owned(),
            image_id: image_id.to_owned(),
        });
        let result = self.with_script(|script| {
            let outcome = once(&mut script.image_deletes).unwrap_or(Ok(()));
            if outcome.is_ok() {
                script
                    .existing_images
                    .retain(|image| !(image.id == image_id && image.region == region));
            }
            outcome
        });
        Box::pin(async move { result })
    }

    fn supports_image_copy(&self) -> bool {
        self.with_script(|script| script.copy_supported)
    }

    fn copy_image<'a>(&'a self, spec: &'a ImageCopySpec) -> ClientFuture<'a, String> {
        self.record(CloudCall::CopyImage {
            source_image_id: spec.source_image_id.clone(),
            destination_region: spec.destination_region.clone(),
        });
        let result = self.with_script(|script| {
            let created =
                once(&mut script.copy_creates).unwrap_or_else(|| Ok(script.fresh_id("img-copy")));
            if let Ok(id) = &created {
                script.created_copies.push(id.clone());
            }
            created
        });
        Box::pin(async move { result })
    }

    fn create_snapshot<'a>(&'a self, spec: &'a SnapshotSpec) -> ClientFuture<'a, String> {
        self.record(CloudCall::CreateSnapshot {
            disk_id: spec.disk_id.clone(),
        });
        let result = self.with_script(|script| {
            once(&mut script.snapshot_creates).unwrap_or_else(|| Ok(script.fresh_id("snap")))
        });
        Box::pin(async move { result })
    }

    fn describe_snapshot<'a>(
        &'a self,
        _region: &'a str,
        snapshot_id: &'a str,
    ) -> ClientFuture<'a, Option<SnapshotDescriptor>> {
        self.record(CloudCall::DescribeSnapshot {
            snapshot_id: snapshot_id.to_owned(),
        });
        let result = self.with_script(|script| {
            sticky(&mut script.snapshot_progress)
                .unwrap_or_else(|| Ok(String::from("100%")))
                .map(|progress| {
                    Some(SnapshotDescriptor {
                        id: snapshot_id.to_owned(),
                        status: String::from("accomplished"),
                        progress: Some(progress),
                    })
                })
        });
        Box::pin(async move { result })
    }

    fn delete_snapshot<'a>(
        &'a self,
        _region: &'a str,
        snapshot_id: &'a str,
    ) -> ClientFuture<'a, ()> {
        self.record(CloudCall::DeleteSnapshot {
            snapshot_id: snapshot_id.to_owned(),
        });
        let result =
            self.with_script(|script| once(&mut script.snapshot_deletes).unwrap_or(Ok(())));
        Box::pin(async move { result })
    }
}

fn describe_scripted_images(
    script: &mut Script,
    filter: &ImageFilter,
) -> Result<Vec<ImageDescriptor>, CloudError> {
    if let Some(image_id) = &filter.image_id {
        let created_name = script
            .created_images
            .iter()
            .find(|(id, _)| id == image_id)
            .map(|(_, name)| name.clone());
        let (queue, name) = match created_name {
            Some(name) => (&mut script.image_samples, name),
            None if script.created_copies.contains(image_id) => {
                (&mut script.copy_samples, String::new())
            }
            None => {
                return Ok(script
                    .existing_images
                    .iter()
                    .filter(|image| &image.id == image_id && image.region == filter.region)
                    .cloned()
                    .collect());
            }
        };
        let sample =
            sticky(queue).unwrap_or_else(|| Ok(ImageSample::status(ImageStatus::Available)))?;
        return Ok(vec![ImageDescriptor {
            id: image_id.clone(),
            name,
            region: filter.region.clone(),
            status: sample.status,
            progress: sample.progress,
            snapshot_ids: script.image_snapshot_ids.clone(),
        }]);
    }

    if let Some(error) = &script.image_lookup_error {
        return Err(error.clone());
    }
    Ok(script
        .existing_images
        .iter()
        .filter(|image| image.region == filter.region)
        .filter(|image| filter.name.as_ref().is_none_or(|name| &image.name == name))
        .cloned()
        .collect())
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }

    /// Also removes `keys` for the guard's lifetime, restoring them on drop.
    #[must_use]
    pub fn without(mut self, keys: &[&str]) -> Self {
        for key in keys {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe { env::remove_var(key) };
            self.previous.push(((*key).to_owned(), old));
        }
        self
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
