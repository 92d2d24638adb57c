//! Volume snapshots.

use crate::client::{CloudError, SnapshotDescriptor, SnapshotSpec};

use super::ScalewayClient;
use super::types::{CreateSnapshotRequest, SnapshotEnvelope};

impl ScalewayClient {
    pub(super) async fn start_snapshot(&self, spec: &SnapshotSpec) -> Result<String, CloudError> {
        let payload = CreateSnapshotRequest {
            name: &spec.name,
            volume_id: &spec.disk_id,
            project: self.project(),
        };
        let envelope: SnapshotEnvelope = self
            .post_json(&self.zone_url(&spec.region, "snapshots"), &payload)
            .await?;
        Ok(envelope.snapshot.id)
    }

    pub(super) async fn fetch_snapshot(
        &self,
        zone: &str,
        id: &str,
    ) -> Result<Option<SnapshotDescriptor>, CloudError> {
        let url = self.zone_url(zone, &format!("snapshots/{id}"));
        match self.get_json::<SnapshotEnvelope>(&url).await {
            Ok(envelope) => Ok(Some(envelope.snapshot.into_descriptor())),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}
