//! Image capture and lookup.

use tracing::debug;

use crate::client::{CloudError, ImageDescriptor, ImageFilter, ImageSource, ImageSpec};

use super::ScalewayClient;
use super::types::{
    ActionRequest, CreateImageRequest, ImageEnvelope, ImageList, TaskEnvelope, image_id_from_href,
};

const IMAGE_PAGE_SIZE: u32 = 100;

impl ScalewayClient {
    /// Starts an image from a server backup, or registers one over an
    /// existing snapshot.
    pub(super) async fn start_image(&self, spec: &ImageSpec) -> Result<String, CloudError> {
        match &spec.source {
            ImageSource::Instance(server_id) => {
                let payload = ActionRequest {
                    action: "backup",
                    name: Some(&spec.name),
                };
                let envelope: TaskEnvelope = self
                    .post_json(
                        &self.zone_url(&spec.region, &format!("servers/{server_id}/action")),
                        &payload,
                    )
                    .await?;
                debug!(task_id = %envelope.task.id, "backup task started");
                envelope
                    .task
                    .href_result
                    .as_deref()
                    .and_then(image_id_from_href)
                    .ok_or_else(|| {
                        CloudError::permanent(
                            "invalid_response",
                            format!("backup of server {server_id} returned no image reference"),
                        )
                    })
            }
            ImageSource::Snapshot(snapshot_id) => {
                let payload = CreateImageRequest {
                    name: &spec.name,
                    root_volume: snapshot_id,
                    arch: &self.architecture,
                    project: self.project(),
                    tags: spec.version.iter().map(|v| format!("version={v}")).collect(),
                };
                let envelope: ImageEnvelope = self
                    .post_json(&self.zone_url(&spec.region, "images"), &payload)
                    .await?;
                Ok(envelope.image.id)
            }
        }
    }

    pub(super) async fn find_images(
        &self,
        filter: &ImageFilter,
    ) -> Result<Vec<ImageDescriptor>, CloudError> {
        if let Some(id) = &filter.image_id {
            let url = self.zone_url(&filter.region, &format!("images/{id}"));
            return match self.get_json::<ImageEnvelope>(&url).await {
                Ok(envelope) => Ok(vec![envelope.image.into_descriptor(&filter.region)]),
                Err(err) if err.is_not_found() => Ok(Vec::new()),
                Err(err) => Err(err),
            };
        }

        let mut request = super::HTTP_CLIENT
            .get(self.zone_url(&filter.region, "images"))
            .query(&[("project", self.project())])
            .query(&[("per_page", IMAGE_PAGE_SIZE)]);
        if let Some(name) = &filter.name {
            request = request.query(&[("name", name.as_str())]);
        }
        let body = self.execute(request).await?;
        let list: ImageList = super::error::decode(&body)?;

        // The API matches names by substring.
        Ok(list
            .images
            .into_iter()
            .filter(|image| filter.name.as_ref().is_none_or(|name| *name == image.name))
            .map(|image| image.into_descriptor(&filter.region))
            .collect())
    }
}
