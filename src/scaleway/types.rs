//! Request and response bodies for the Instances REST API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::client::{
    DiskMapping, ImageDescriptor, ImageStatus, InstanceDescriptor, InstanceStatus,
    SnapshotDescriptor,
};

/// Volume type used when a disk mapping names none.
pub(super) const DEFAULT_VOLUME_TYPE: &str = "b_ssd";
const BYTES_PER_GB: u64 = 1_000_000_000;

#[derive(Debug, Serialize)]
pub(super) struct CreateServerRequest<'a> {
    pub name: &'a str,
    pub commercial_type: &'a str,
    pub image: &'a str,
    pub project: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<&'a str>,
    pub dynamic_ip_required: bool,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, VolumeTemplate>,
    pub stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_init: Option<&'a str>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub(super) struct VolumeTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub size: u64,
    pub volume_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_snapshot: Option<String>,
}

impl VolumeTemplate {
    pub(super) fn from_mapping(disk: &DiskMapping) -> Self {
        Self {
            name: disk.name.clone(),
            size: u64::from(disk.size_gb) * BYTES_PER_GB,
            volume_type: disk
                .category
                .clone()
                .unwrap_or_else(|| DEFAULT_VOLUME_TYPE.to_owned()),
            base_snapshot: disk.snapshot_id.clone(),
        }
    }
}

/// Volume map keyed by slot: `"0"` is the root volume, data disks follow.
/// The root slot is only sent when its size or type is overridden.
pub(super) fn volume_map(
    system_disk: &DiskMapping,
    data_disks: &[DiskMapping],
) -> BTreeMap<String, VolumeTemplate> {
    let mut volumes = BTreeMap::new();
    if system_disk.size_gb > 0 || system_disk.category.is_some() {
        volumes.insert(String::from("0"), VolumeTemplate::from_mapping(system_disk));
    }
    for (slot, disk) in (1_usize..).zip(data_disks) {
        volumes.insert(slot.to_string(), VolumeTemplate::from_mapping(disk));
    }
    volumes
}

#[derive(Debug, Serialize)]
pub(super) struct ActionRequest<'a> {
    pub action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(super) struct PrivateNicRequest<'a> {
    pub private_network_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateImageRequest<'a> {
    pub name: &'a str,
    pub root_volume: &'a str,
    pub arch: &'a str,
    pub project: &'a str,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateSnapshotRequest<'a> {
    pub name: &'a str,
    pub volume_id: &'a str,
    pub project: &'a str,
}

#[derive(Debug, Deserialize)]
pub(super) struct VolumeRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerEnvelope {
    pub server: ServerPayload,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerPayload {
    pub id: String,
    pub state: String,
    #[serde(default)]
    pub volumes: BTreeMap<String, VolumeRef>,
}

impl ServerPayload {
    pub(super) fn into_descriptor(self, zone: &str) -> InstanceDescriptor {
        let system_disk_id = self.volumes.get("0").map(|volume| volume.id.clone());
        InstanceDescriptor {
            id: self.id,
            region: zone.to_owned(),
            status: InstanceStatus::parse(&self.state),
            system_disk_id,
        }
    }

    pub(super) fn volume_ids(&self) -> Vec<String> {
        self.volumes.values().map(|volume| volume.id.clone()).collect()
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TaskEnvelope {
    pub task: TaskPayload,
}

#[derive(Debug, Deserialize)]
pub(super) struct TaskPayload {
    pub id: String,
    #[serde(default)]
    pub href_result: Option<String>,
}

/// Extracts the image identifier from a backup task's `href_result`, such as
/// `/images/<id>`.
pub(super) fn image_id_from_href(href: &str) -> Option<String> {
    let (kind, id) = href.trim_end_matches('/').rsplit_once('/')?;
    (kind.ends_with("images") && !id.is_empty()).then(|| id.to_owned())
}

#[derive(Debug, Deserialize)]
pub(super) struct ImageEnvelope {
    pub image: ImagePayload,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImageList {
    #[serde(default)]
    pub images: Vec<ImagePayload>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImagePayload {
    pub id: String,
    pub name: String,
    pub state: String,
    #[serde(default)]
    pub root_volume: Option<VolumeRef>,
    #[serde(default)]
    pub extra_volumes: BTreeMap<String, VolumeRef>,
}

impl ImagePayload {
    pub(super) fn into_descriptor(self, zone: &str) -> ImageDescriptor {
        let snapshot_ids = self
            .root_volume
            .into_iter()
            .chain(self.extra_volumes.into_values())
            .map(|volume| volume.id)
            .collect();
        ImageDescriptor {
            id: self.id,
            name: self.name,
            region: zone.to_owned(),
            status: ImageStatus::parse(&self.state),
            progress: None,
            snapshot_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SnapshotEnvelope {
    pub snapshot: SnapshotPayload,
}

#[derive(Debug, Deserialize)]
pub(super) struct SnapshotPayload {
    pub id: String,
    pub state: String,
}

impl SnapshotPayload {
    /// Scaleway reports no progress for snapshots; `available` counts as done.
    pub(super) fn into_descriptor(self) -> SnapshotDescriptor {
        let progress = (self.state == "available").then(|| String::from("100%"));
        SnapshotDescriptor {
            id: self.id,
            status: self.state,
            progress,
        }
    }
}
