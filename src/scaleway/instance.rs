//! Server creation, inspection and teardown.

use scaleway_rs::{ScalewayImage, ScalewayListInstanceImagesBuilder};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{CloudError, InstanceDescriptor, InstanceSpec, InstanceStatus, NetworkMode};

use super::types::{
    ActionRequest, CreateServerRequest, PrivateNicRequest, ServerEnvelope, ServerPayload,
    volume_map,
};
use super::{ScalewayClient, error};

impl ScalewayClient {
    /// Creates the server stopped, with user data in the creation request, then
    /// attaches the private NIC and powers it on.
    ///
    /// A server whose follow-up calls fail is deleted before the error is
    /// returned, so callers never receive an error for a server that exists.
    pub(super) async fn create_server(&self, spec: &InstanceSpec) -> Result<String, CloudError> {
        let image = self.resolve_image_id(spec).await?;
        let mut tags = spec.tags.clone();
        tags.push(format!("client-token={}", spec.client_token));

        let payload = CreateServerRequest {
            name: &spec.name,
            commercial_type: &spec.instance_type,
            image: &image,
            project: self.project(),
            organization: self.config.default_organization_id.as_deref(),
            dynamic_ip_required: matches!(spec.network, NetworkMode::Public { .. }),
            tags,
            volumes: volume_map(&spec.system_disk, &spec.data_disks),
            stopped: true,
            cloud_init: spec.user_data.as_deref(),
        };
        let created: ServerEnvelope = self
            .post_json(&self.zone_url(&spec.region, "servers"), &payload)
            .await?;
        let server = created.server;
        debug!(instance_id = %server.id, zone = %spec.region, "server created");

        match self.start_server(&spec.region, &server.id, &spec.network).await {
            Ok(()) => {
                info!(instance_id = %server.id, "server powered on");
                Ok(server.id)
            }
            Err(err) => Err(self.discard_server(&spec.region, &server, err).await),
        }
    }

    async fn start_server(
        &self,
        zone: &str,
        id: &str,
        network: &NetworkMode,
    ) -> Result<(), CloudError> {
        if let NetworkMode::Private {
            network_id: Some(network_id),
        } = network
        {
            let nic = PrivateNicRequest {
                private_network_id: network_id,
            };
            let _: serde_json::Value = self
                .post_json(
                    &self.zone_url(zone, &format!("servers/{id}/private_nics")),
                    &nic,
                )
                .await?;
        }
        self.server_action(zone, id, "poweron").await
    }

    /// Deletes a server whose setup failed and returns the setup error. When
    /// the delete fails too, the error names the server left behind.
    async fn discard_server(
        &self,
        zone: &str,
        server: &ServerPayload,
        mut cause: CloudError,
    ) -> CloudError {
        warn!(instance_id = %server.id, error = %cause, "server setup failed, deleting it");
        if let Err(err) = self
            .delete_server_and_volumes(zone, &server.id, &server.volume_ids())
            .await
        {
            warn!(instance_id = %server.id, error = %err, "failed to delete server");
            cause.message = format!(
                "{}; server {} was left behind: {err}",
                cause.message, server.id
            );
        }
        cause
    }

    pub(super) async fn fetch_server(
        &self,
        zone: &str,
        id: &str,
    ) -> Result<Option<InstanceDescriptor>, CloudError> {
        match self
            .get_json::<ServerEnvelope>(&self.zone_url(zone, &format!("servers/{id}")))
            .await
        {
            Ok(envelope) => Ok(Some(envelope.server.into_descriptor(zone))),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Deletes a server. With `force`, a running server is terminated, which
    /// also removes its local volumes; a stopped server is deleted and its
    /// volumes released afterwards.
    pub(super) async fn remove_server(
        &self,
        zone: &str,
        id: &str,
        force: bool,
    ) -> Result<(), CloudError> {
        let url = self.zone_url(zone, &format!("servers/{id}"));
        let server = self.get_json::<ServerEnvelope>(&url).await?.server;
        let stopped = InstanceStatus::parse(&server.state) == InstanceStatus::Stopped;

        if force && !stopped {
            return self.server_action(zone, id, "terminate").await;
        }

        if force {
            self.delete_server_and_volumes(zone, id, &server.volume_ids())
                .await
        } else {
            self.delete(&url).await
        }
    }

    async fn delete_server_and_volumes(
        &self,
        zone: &str,
        id: &str,
        volume_ids: &[String],
    ) -> Result<(), CloudError> {
        self.delete(&self.zone_url(zone, &format!("servers/{id}")))
            .await?;
        for volume_id in volume_ids {
            match self
                .delete(&self.zone_url(zone, &format!("volumes/{volume_id}")))
                .await
            {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    pub(super) async fn server_action(
        &self,
        zone: &str,
        id: &str,
        action: &str,
    ) -> Result<(), CloudError> {
        let payload = ActionRequest { action, name: None };
        let _: serde_json::Value = self
            .post_json(
                &self.zone_url(zone, &format!("servers/{id}/action")),
                &payload,
            )
            .await?;
        Ok(())
    }

    async fn resolve_image_id(&self, spec: &InstanceSpec) -> Result<String, CloudError> {
        if Uuid::parse_str(&spec.source_image).is_ok() {
            return Ok(spec.source_image.clone());
        }

        let images = ScalewayListInstanceImagesBuilder::new(self.api.clone(), &spec.region)
            .public(true)
            .name(&spec.source_image)
            .arch(&spec.architecture)
            .run_async()
            .await
            .map_err(error::from_sdk)?;

        select_image_id(images, &spec.architecture).ok_or_else(|| {
            CloudError::permanent(
                "image_not_found",
                format!(
                    "image '{}' (arch {}) not found in zone {}",
                    spec.source_image, spec.architecture, spec.region
                ),
            )
        })
    }
}

/// Newest available image for `architecture`.
fn select_image_id(images: Vec<ScalewayImage>, architecture: &str) -> Option<String> {
    images
        .into_iter()
        .filter(|image| image.arch == architecture && image.state == "available")
        .max_by(|lhs, rhs| lhs.creation_date.cmp(&rhs.creation_date))
        .map(|image| image.id)
}
