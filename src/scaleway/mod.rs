//! [`ResourceLifecycleClient`] over the Scaleway Instances API.
//!
//! Instance creation resolves image labels through the `scaleway-rs` SDK.
//! Everything else talks to the REST endpoints directly with `reqwest`.

mod error;
mod image;
mod instance;
mod snapshot;
mod types;

use std::sync::LazyLock;
use std::time::Duration;

use scaleway_rs::ScalewayApi;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::client::{
    ClientFuture, CloudError, ImageCopySpec, ImageDescriptor, ImageFilter, ImageSpec,
    InstanceDescriptor, InstanceSpec, ResourceLifecycleClient, SnapshotDescriptor, SnapshotSpec,
};
use crate::config::{ConfigError, ScalewayConfig};

pub use error::classify_response;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const AUTH_HEADER: &str = "X-Auth-Token";

/// Base URL of the Scaleway Instances API.
pub const SCALEWAY_INSTANCE_API_BASE: &str = "https://api.scaleway.com/instance/v1";

/// Zones accepted by the Instances API.
pub const SCALEWAY_ZONES: &[&str] = &[
    "fr-par-1", "fr-par-2", "fr-par-3", "nl-ams-1", "nl-ams-2", "nl-ams-3", "pl-waw-1",
    "pl-waw-2", "pl-waw-3",
];

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Client that builds images with Scaleway instances, snapshots and images.
#[derive(Clone)]
pub struct ScalewayClient {
    api: ScalewayApi,
    config: ScalewayConfig,
    base_url: String,
    architecture: String,
}

impl ScalewayClient {
    /// Constructs a client from validated credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required credential is
    /// empty.
    pub fn new(config: ScalewayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            api: ScalewayApi::new(&config.secret_key),
            config,
            base_url: SCALEWAY_INSTANCE_API_BASE.to_owned(),
            architecture: String::from("x86_64"),
        })
    }

    /// Sets the architecture recorded on images created from snapshots.
    #[must_use]
    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = architecture.into();
        self
    }

    /// Points the REST calls at another API endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn zone_url(&self, zone: &str, path: &str) -> String {
        format!("{}/zones/{zone}/{path}", self.base_url)
    }

    fn project(&self) -> &str {
        &self.config.default_project_id
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, CloudError> {
        let response = request
            .header(AUTH_HEADER, &self.config.secret_key)
            .send()
            .await
            .map_err(error::transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(error::transport)?;
        if status.is_success() {
            Ok(body.to_vec())
        } else {
            Err(classify_response(status.as_u16(), &body))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CloudError> {
        let body = self.execute(HTTP_CLIENT.get(url)).await?;
        error::decode(&body)
    }

    async fn post_json<B, T>(&self, url: &str, payload: &B) -> Result<T, CloudError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let body = self.execute(HTTP_CLIENT.post(url).json(payload)).await?;
        error::decode(&body)
    }

    async fn delete(&self, url: &str) -> Result<(), CloudError> {
        self.execute(HTTP_CLIENT.delete(url)).await.map(|_| ())
    }
}

impl ResourceLifecycleClient for ScalewayClient {
    fn describe_regions(&self) -> ClientFuture<'_, Vec<String>> {
        Box::pin(async move {
            Ok(SCALEWAY_ZONES
                .iter()
                .map(|zone| (*zone).to_owned())
                .collect())
        })
    }

    fn create_instance<'a>(&'a self, spec: &'a InstanceSpec) -> ClientFuture<'a, String> {
        Box::pin(async move { self.create_server(spec).await })
    }

    fn describe_instance<'a>(
        &'a self,
        region: &'a str,
        instance_id: &'a str,
    ) -> ClientFuture<'a, Option<InstanceDescriptor>> {
        Box::pin(async move { self.fetch_server(region, instance_id).await })
    }

    fn delete_instance<'a>(
        &'a self,
        region: &'a str,
        instance_id: &'a str,
        force: bool,
    ) -> ClientFuture<'a, ()> {
        Box::pin(async move { self.remove_server(region, instance_id, force).await })
    }

    fn create_image<'a>(&'a self, spec: &'a ImageSpec) -> ClientFuture<'a, String> {
        Box::pin(async move { self.start_image(spec).await })
    }

    fn describe_images<'a>(
        &'a self,
        filter: &'a ImageFilter,
    ) -> ClientFuture<'a, Vec<ImageDescriptor>> {
        Box::pin(async move { self.find_images(filter).await })
    }

    fn delete_image<'a>(&'a self, region: &'a str, image_id: &'a str) -> ClientFuture<'a, ()> {
        Box::pin(async move {
            self.delete(&self.zone_url(region, &format!("images/{image_id}")))
                .await
        })
    }

    fn supports_image_copy(&self) -> bool {
        false
    }

    fn copy_image<'a>(&'a self, spec: &'a ImageCopySpec) -> ClientFuture<'a, String> {
        Box::pin(async move {
            Err(CloudError::permanent(
                "unsupported_operation",
                format!(
                    "copying image {} from {} to {} is not supported by the Instances API",
                    spec.source_image_id, spec.source_region, spec.destination_region
                ),
            ))
        })
    }

    fn create_snapshot<'a>(&'a self, spec: &'a SnapshotSpec) -> ClientFuture<'a, String> {
        Box::pin(async move { self.start_snapshot(spec).await })
    }

    fn describe_snapshot<'a>(
        &'a self,
        region: &'a str,
        snapshot_id: &'a str,
    ) -> ClientFuture<'a, Option<SnapshotDescriptor>> {
        Box::pin(async move { self.fetch_snapshot(region, snapshot_id).await })
    }

    fn delete_snapshot<'a>(
        &'a self,
        region: &'a str,
        snapshot_id: &'a str,
    ) -> ClientFuture<'a, ()> {
        Box::pin(async move {
            self.delete(&self.zone_url(region, &format!("snapshots/{snapshot_id}")))
                .await
        })
    }
}

#[cfg(test)]
mod tests;
