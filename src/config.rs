//! Configuration loading via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::client::{
    DEFAULT_CHARGE_TYPE, DEFAULT_MAX_BANDWIDTH_OUT_MBPS, DiskMapping, NetworkMode,
};
use crate::request::{BuildOptions, BuildRequest, BuildTimeouts};
use crate::user_data::resolve_user_data;

/// Scaleway credentials and placement defaults derived from environment
/// variables and `imagewright.toml`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SCW",
    discovery(
        app_name = "imagewright",
        env_var = "IMAGEWRIGHT_CONFIG_PATH",
        config_file_name = "imagewright.toml",
        dotfile_name = ".imagewright.toml",
        project_file_name = "imagewright.toml"
    )
)]
pub struct ScalewayConfig {
    /// Access key assigned to the Scaleway application. Not needed for API
    /// calls; captured so the full credential pair can live in one place.
    pub access_key: Option<String>,
    /// Secret key used for authentication. Required; left empty here so
    /// [`Self::validate`] can report how to provide it.
    #[ortho_config(default = String::new())]
    pub secret_key: String,
    /// Organisation identifier used by some Scaleway endpoints.
    pub default_organization_id: Option<String>,
    /// Project identifier owning the build resources. Required.
    #[ortho_config(default = String::new())]
    pub default_project_id: String,
    /// Zone builds run in unless the build configuration names one.
    #[ortho_config(default = "fr-par-1".to_owned())]
    pub default_zone: String,
}

/// Build settings merged from defaults, `imagewright.toml`, environment
/// variables and CLI overrides.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "IMAGEWRIGHT",
    discovery(
        app_name = "imagewright",
        env_var = "IMAGEWRIGHT_CONFIG_PATH",
        config_file_name = "imagewright.toml",
        dotfile_name = ".imagewright.toml",
        project_file_name = "imagewright.toml"
    )
)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "configuration struct with user-facing toggle settings that are naturally expressed as booleans"
)]
pub struct BuildConfig {
    /// Name of the image to produce. Required.
    pub image_name: Option<String>,
    /// Optional image description.
    pub image_description: Option<String>,
    /// Optional image version label.
    pub image_version: Option<String>,
    /// Zone to build in; falls back to the Scaleway default zone.
    pub region: Option<String>,
    /// Comma separated zones that receive a copy of the image.
    pub destination_regions: Option<String>,
    /// Commercial type of the build instance.
    #[ortho_config(default = "DEV1-S".to_owned())]
    pub instance_type: String,
    /// Image the build instance boots from.
    #[ortho_config(default = "ubuntu_noble".to_owned())]
    pub source_image: String,
    /// CPU architecture of the build instance.
    #[ortho_config(default = "x86_64".to_owned())]
    pub architecture: String,
    /// Whether to request I/O optimised storage.
    #[ortho_config(default = true)]
    pub io_optimized: bool,
    /// System disk size in gigabytes; zero lets the provider pick.
    #[ortho_config(default = 0)]
    pub system_disk_size_gb: u32,
    /// System disk volume type.
    pub system_disk_type: Option<String>,
    /// Comma separated data disk sizes in gigabytes.
    pub data_disk_sizes_gb: Option<String>,
    /// `public` or `private`.
    #[ortho_config(default = "public".to_owned())]
    pub network_mode: String,
    /// Billing mode for outbound traffic in public mode.
    pub internet_charge_type: Option<String>,
    /// Outbound bandwidth cap in Mbit/s in public mode.
    pub internet_max_bandwidth_out: Option<u32>,
    /// Private network to attach in private mode.
    pub private_network_id: Option<String>,
    /// Inline user data for the build instance.
    pub user_data: Option<String>,
    /// File holding user data; takes precedence over `user_data`.
    pub user_data_file: Option<String>,
    /// Skip checking zones against the provider's list.
    #[ortho_config(default = false)]
    pub skip_region_validation: bool,
    /// Replace images that already carry the target name.
    #[ortho_config(default = false)]
    pub force_delete_existing: bool,
    /// Build the image from a system disk snapshot only.
    #[ortho_config(default = false)]
    pub ignore_data_disks: bool,
    /// Delete the build instance once the image is ready.
    #[ortho_config(default = true)]
    pub delete_build_instance: bool,
    /// Seconds to wait for the build instance to stop; zero or less means 60.
    #[ortho_config(default = 300)]
    pub instance_timeout_secs: i64,
    /// Seconds to wait for each image; zero or less means 60.
    #[ortho_config(default = 3600)]
    pub image_timeout_secs: i64,
    /// Seconds to wait for the system disk snapshot; zero or less means 60.
    #[ortho_config(default = 3600)]
    pub snapshot_timeout_secs: i64,
    /// Seconds to keep retrying a compensating delete; zero or less means 60.
    #[ortho_config(default = 60)]
    pub cleanup_timeout_secs: i64,
    /// Seconds between probes; zero means 5.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to imagewright.toml",
            metadata.description, metadata.env_var, metadata.toml_key
        )));
    }
    Ok(())
}

impl ScalewayConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("imagewright")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.secret_key,
            &FieldMetadata::new(
                "Scaleway API secret key",
                "SCW_SECRET_KEY",
                "secret_key",
            ),
        )?;
        require_field(
            &self.default_project_id,
            &FieldMetadata::new(
                "Scaleway project ID",
                "SCW_DEFAULT_PROJECT_ID",
                "default_project_id",
            ),
        )?;
        require_field(
            &self.default_zone,
            &FieldMetadata::new(
                "availability zone",
                "SCW_DEFAULT_ZONE",
                "default_zone",
            ),
        )?;
        Ok(())
    }
}

impl BuildConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("imagewright")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Destination zones listed in [`Self::destination_regions`].
    #[must_use]
    pub fn destination_list(&self) -> Vec<String> {
        split_list(self.destination_regions.as_deref())
    }

    /// Builds a [`BuildRequest`], falling back to `default_region` when no
    /// build zone is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required value is missing, a value
    /// cannot be parsed, or the user-data file cannot be read.
    pub fn as_request(&self, default_region: &str) -> Result<BuildRequest, ConfigError> {
        let image_name = self.image_name.clone().unwrap_or_default();
        require_field(
            &image_name,
            &FieldMetadata::new("image name", "IMAGEWRIGHT_IMAGE_NAME", "image_name"),
        )?;

        let user_data = resolve_user_data(self.user_data.as_deref(), self.user_data_file.as_deref())
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;

        let mut builder = BuildRequest::builder()
            .image_name(image_name)
            .image_description(self.image_description.clone())
            .image_version(self.image_version.clone())
            .region(self.region.as_deref().unwrap_or(default_region))
            .destination_regions(self.destination_list())
            .instance_type(&self.instance_type)
            .source_image(&self.source_image)
            .architecture(&self.architecture)
            .io_optimized(self.io_optimized)
            .system_disk(DiskMapping {
                category: self.system_disk_type.clone(),
                size_gb: self.system_disk_size_gb,
                delete_with_instance: true,
                ..DiskMapping::default()
            })
            .network(self.network()?)
            .user_data(user_data)
            .tag("imagewright")
            .options(BuildOptions {
                skip_region_validation: self.skip_region_validation,
                force_delete_existing: self.force_delete_existing,
                ignore_data_disks: self.ignore_data_disks,
                delete_build_instance: self.delete_build_instance,
            })
            .timeouts(self.timeouts());

        for size_gb in self.data_disk_sizes()? {
            builder = builder.data_disk(DiskMapping {
                size_gb,
                delete_with_instance: true,
                ..DiskMapping::default()
            });
        }

        builder
            .build()
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Wait budgets in [`BuildTimeouts`] form.
    #[must_use]
    pub fn timeouts(&self) -> BuildTimeouts {
        BuildTimeouts {
            instance: non_negative_secs(self.instance_timeout_secs),
            image: non_negative_secs(self.image_timeout_secs),
            snapshot: non_negative_secs(self.snapshot_timeout_secs),
            cleanup: non_negative_secs(self.cleanup_timeout_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }

    fn network(&self) -> Result<NetworkMode, ConfigError> {
        match self.network_mode.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(NetworkMode::Public {
                charge_type: self
                    .internet_charge_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CHARGE_TYPE.to_owned()),
                max_bandwidth_out_mbps: self
                    .internet_max_bandwidth_out
                    .unwrap_or(DEFAULT_MAX_BANDWIDTH_OUT_MBPS),
            }),
            "private" => Ok(NetworkMode::Private {
                network_id: self.private_network_id.clone(),
            }),
            other => Err(ConfigError::Invalid(format!(
                "network_mode must be `public` or `private`, got `{other}`"
            ))),
        }
    }

    fn data_disk_sizes(&self) -> Result<Vec<u32>, ConfigError> {
        split_list(self.data_disk_sizes_gb.as_deref())
            .iter()
            .map(|size| {
                size.parse::<u32>().map_err(|err| {
                    ConfigError::Invalid(format!("invalid data disk size `{size}`: {err}"))
                })
            })
            .collect()
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Zero and negative values map to zero, which wait budgets treat as "use
/// the default".
const fn non_negative_secs(value: i64) -> Duration {
    if value <= 0 {
        Duration::ZERO
    } else {
        Duration::from_secs(value.unsigned_abs())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// A configured value cannot be used.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
