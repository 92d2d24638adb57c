//! Binary entry point for the `imagewright` CLI.

use std::env;
use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use imagewright::client::ImageStatus;
use imagewright::logging::init_tracing;
use imagewright::test_support::{ImageSample, ScriptedCloud};
use imagewright::{
    BuildArtifacts, BuildConfig, BuildError, BuildFailure, BuildOrchestrator, BuildRequest,
    ConfigError, ResourceLifecycleClient, ScalewayClient, ScalewayConfig,
};

mod cli;

use cli::{BuildCommand, Cli};

/// Selects an in-memory cloud instead of Scaleway; used by the CLI tests.
const FAKE_CLOUD_ENV: &str = "IMAGEWRIGHT_FAKE_CLOUD";
/// Zone assumed by the in-memory cloud when none is configured.
const FAKE_ZONE: &str = "fr-par-1";
/// Exit status reported when the build was interrupted.
const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Build(#[from] BuildFailure),
}

impl CliError {
    const fn exit_code(&self) -> i32 {
        match self {
            Self::Build(BuildFailure {
                error: BuildError::Cancelled,
                ..
            }) => EXIT_CANCELLED,
            _ => 1,
        }
    }
}

#[tokio::main]
async fn main() {
    let Cli::Build(command) = Cli::parse();
    if let Err(err) = init_tracing(command.verbose) {
        writeln!(io::stderr(), "{err}").ok();
    }

    let exit_code = match run_build(command, cancel_on_ctrl_c()).await {
        Ok(artifacts) => {
            write_artifacts(io::stdout(), &artifacts);
            0
        }
        Err(err) => {
            write_error(io::stderr(), &err);
            err.exit_code()
        }
    };

    process::exit(exit_code);
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling build");
            trigger.cancel();
        }
    });
    token
}

async fn run_build(
    command: BuildCommand,
    cancel: CancellationToken,
) -> Result<BuildArtifacts, CliError> {
    let mut config = BuildConfig::load_without_cli_args()?;
    apply_overrides(&mut config, command);

    if let Some(cloud) = fake_cloud_from_env() {
        let request = config.as_request(FAKE_ZONE)?;
        return execute(cloud, &request, cancel).await;
    }

    let scaleway = ScalewayConfig::load_without_cli_args()?;
    let request = config.as_request(&scaleway.default_zone)?;
    let client = ScalewayClient::new(scaleway)?.with_architecture(&request.architecture);
    execute(client, &request, cancel).await
}

async fn execute<C>(
    client: C,
    request: &BuildRequest,
    cancel: CancellationToken,
) -> Result<BuildArtifacts, CliError>
where
    C: ResourceLifecycleClient + 'static,
{
    let orchestrator = BuildOrchestrator::new(Arc::new(client));
    Ok(orchestrator.build(request, cancel).await?)
}

fn apply_overrides(config: &mut BuildConfig, command: BuildCommand) {
    let BuildCommand {
        image_name,
        instance_type,
        source_image,
        zone,
        copy_to,
        force,
        skip_region_validation,
        ignore_data_disks,
        user_data,
        user_data_file,
        ..
    } = command;

    if image_name.is_some() {
        config.image_name = image_name;
    }
    if let Some(value) = instance_type {
        config.instance_type = value;
    }
    if let Some(value) = source_image {
        config.source_image = value;
    }
    if zone.is_some() {
        config.region = zone;
    }
    if !copy_to.is_empty() {
        let mut destinations = config.destination_list();
        destinations.extend(copy_to);
        config.destination_regions = Some(destinations.join(","));
    }
    if user_data.is_some() || user_data_file.is_some() {
        config.user_data = user_data;
        config.user_data_file = user_data_file;
    }
    config.force_delete_existing |= force;
    config.skip_region_validation |= skip_region_validation;
    config.ignore_data_disks |= ignore_data_disks;
}

fn fake_cloud_from_env() -> Option<ScriptedCloud> {
    let mode = env::var(FAKE_CLOUD_ENV).ok()?;
    let cloud = ScriptedCloud::new();
    match mode.as_str() {
        "success" => {}
        "image-failed" => cloud.push_image_sample(ImageSample::status(ImageStatus::CreateFailed)),
        _ => return None,
    }
    Some(cloud)
}

fn write_artifacts(mut target: impl Write, artifacts: &BuildArtifacts) {
    writeln!(target, "image: {}", artifacts.image_id).ok();
    for (region, image_id) in &artifacts.region_images {
        writeln!(target, "region {region}: {image_id}").ok();
    }
    for snapshot_id in &artifacts.snapshot_ids {
        writeln!(target, "snapshot: {snapshot_id}").ok();
    }
    if let Some(snapshot_id) = &artifacts.source_snapshot {
        writeln!(target, "source snapshot: {snapshot_id}").ok();
    }
    for warning in &artifacts.warnings {
        writeln!(target, "warning: {warning}").ok();
    }
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
    if let CliError::Build(failure) = err {
        for warning in &failure.cleanup_warnings {
            writeln!(target, "cleanup warning: {warning}").ok();
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
