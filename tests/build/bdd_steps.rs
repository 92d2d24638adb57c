//! BDD step definitions for the build pipeline.

use std::sync::Arc;
use std::time::Duration;

use imagewright::client::{CloudError, ImageStatus, InstanceStatus};
use imagewright::test_support::{CloudCall, ImageSample};
use imagewright::{BuildError, BuildOrchestrator, BuildTimeouts};
use rstest_bdd_macros::{given, then, when};
use tokio_util::sync::CancellationToken;

use super::test_helpers::{BuildWorld, split_list};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<(), StepError> {
    if condition {
        Ok(())
    } else {
        Err(StepError::Assertion(message()))
    }
}

#[given("a build of image \"{name}\" in zone \"{zone}\"")]
fn build_of_image(build_world: &BuildWorld, name: String, zone: String) {
    build_world.update_request(|builder| builder.image_name(name).region(zone));
}

#[given("the build copies to zones \"{zones}\"")]
fn build_copies_to(build_world: &BuildWorld, zones: String) {
    build_world.update_request(|builder| builder.destination_regions(split_list(&zones)));
}

#[given("build instance teardown is enabled")]
fn teardown_enabled(build_world: &BuildWorld) {
    build_world.update_options(|options| options.delete_build_instance = true);
}

#[given("existing images are replaced")]
fn replace_existing(build_world: &BuildWorld) {
    build_world.update_options(|options| options.force_delete_existing = true);
}

#[given("region validation is skipped")]
fn region_validation_skipped(build_world: &BuildWorld) {
    build_world.update_options(|options| options.skip_region_validation = true);
}

#[given("the provider cannot copy images")]
fn provider_cannot_copy(build_world: &BuildWorld) {
    build_world.cloud.disable_image_copy();
}

#[given("data disks are ignored")]
fn data_disks_ignored(build_world: &BuildWorld) {
    build_world.update_options(|options| options.ignore_data_disks = true);
}

#[given("the instance wait budget is {timeout} seconds polling every {interval} seconds")]
fn instance_budget(build_world: &BuildWorld, timeout: u64, interval: u64) {
    build_world.timeouts.set(BuildTimeouts {
        instance: Duration::from_secs(timeout),
        poll_interval: Duration::from_secs(interval),
        ..BuildTimeouts::default()
    });
}

#[given("the instance reports \"{status}\" {times} times before stopping")]
fn instance_reports_before_stopping(build_world: &BuildWorld, status: String, times: usize) {
    for _ in 0..times {
        build_world
            .cloud
            .push_instance_status(InstanceStatus::parse(&status));
    }
    build_world.cloud.push_instance_status(InstanceStatus::Stopped);
}

#[given("the instance never stops")]
fn instance_never_stops(build_world: &BuildWorld) {
    build_world.cloud.push_instance_status(InstanceStatus::Running);
}

#[given("the image reports progress \"{samples}\"")]
fn image_reports_progress(build_world: &BuildWorld, samples: String) {
    for progress in split_list(&samples) {
        build_world
            .cloud
            .push_image_sample(ImageSample::creating(&progress));
    }
}

#[given("image creation fails")]
fn image_creation_fails(build_world: &BuildWorld) {
    build_world
        .cloud
        .push_image_sample(ImageSample::status(ImageStatus::CreateFailed));
}

#[given("the image copy is rejected")]
fn image_copy_rejected(build_world: &BuildWorld) {
    build_world.cloud.push_copy_create(Err(CloudError::permanent(
        "InvalidRegion",
        "copy rejected",
    )));
}

#[given("the instance delete conflicts {times} times")]
fn instance_delete_conflicts(build_world: &BuildWorld, times: usize) {
    for _ in 0..times {
        build_world.cloud.push_instance_delete(Err(CloudError::transient(
            "IncorrectInstanceStatus",
            "instance is stopping",
        )));
    }
}

#[given("the instance delete is refused")]
fn instance_delete_refused(build_world: &BuildWorld) {
    build_world.cloud.push_instance_delete(Err(CloudError::permanent(
        "Forbidden",
        "delete protection is on",
    )));
}

#[given("an image named \"{name}\" exists in zone \"{zone}\" as \"{image_id}\"")]
fn existing_image(build_world: &BuildWorld, name: String, zone: String, image_id: String) {
    build_world
        .cloud
        .add_existing_image(&zone, &name, &image_id, &["snap-old"]);
}

#[when("I run the build")]
fn run_build(build_world: &BuildWorld) -> Result<(), StepError> {
    let request = build_world
        .request()
        .map_err(|err| StepError::Assertion(format!("request should build: {err}")))?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .map_err(|err| StepError::Assertion(err.to_string()))?;

    let orchestrator = BuildOrchestrator::new(Arc::new(build_world.cloud.clone()));
    let outcome =
        runtime.block_on(async { orchestrator.build(&request, CancellationToken::new()).await });
    build_world.outcome.replace(Some(outcome));
    Ok(())
}

#[then("the build succeeds")]
fn build_succeeds(build_world: &BuildWorld) -> Result<(), StepError> {
    match &*build_world.outcome.borrow() {
        Some(Ok(_)) => Ok(()),
        Some(Err(failure)) => Err(StepError::Assertion(format!(
            "expected success, got failure: {failure}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the build fails at step \"{step}\"")]
fn build_fails_at(build_world: &BuildWorld, step: String) -> Result<(), StepError> {
    let outcome = build_world.outcome.borrow();
    let Some(Err(failure)) = &*outcome else {
        return Err(StepError::Assertion(String::from("expected failure outcome")));
    };
    check(failure.step == Some(step.as_str()), || {
        format!("expected failure at {step}, got {:?}", failure.step)
    })
}

#[then("the build error is \"{kind}\"")]
fn build_error_kind(build_world: &BuildWorld, kind: String) -> Result<(), StepError> {
    let outcome = build_world.outcome.borrow();
    let Some(Err(failure)) = &*outcome else {
        return Err(StepError::Assertion(String::from("expected failure outcome")));
    };
    let actual = match failure.error {
        BuildError::Configuration(_) => "configuration",
        BuildError::Cloud { .. } => "cloud",
        BuildError::Probe { .. } => "probe",
        BuildError::Timeout { .. } => "timeout",
        BuildError::Unsatisfiable { .. } => "unsatisfiable",
        BuildError::Cancelled => "cancelled",
        BuildError::MissingState { .. } | BuildError::Halted { .. } => "internal",
    };
    check(actual == kind, || {
        format!("expected {kind} error, got {actual}: {}", failure.error)
    })
}

#[then("the configuration error lists {count} issues")]
fn configuration_issue_count(build_world: &BuildWorld, count: usize) -> Result<(), StepError> {
    let outcome = build_world.outcome.borrow();
    let Some(Err(failure)) = &*outcome else {
        return Err(StepError::Assertion(String::from("expected failure outcome")));
    };
    let BuildError::Configuration(issues) = &failure.error else {
        return Err(StepError::Assertion(format!(
            "expected configuration error, got {}",
            failure.error
        )));
    };
    check(issues.len() == count, || {
        format!("expected {count} issues, got {}: {issues}", issues.len())
    })
}

#[then("the built image is \"{image_id}\"")]
fn built_image(build_world: &BuildWorld, image_id: String) -> Result<(), StepError> {
    let outcome = build_world.outcome.borrow();
    let Some(Ok(artifacts)) = &*outcome else {
        return Err(StepError::Assertion(String::from("expected success outcome")));
    };
    check(artifacts.image_id == image_id, || {
        format!("expected image {image_id}, got {}", artifacts.image_id)
    })
}

#[then("zone \"{zone}\" holds image \"{image_id}\"")]
fn zone_holds_image(
    build_world: &BuildWorld,
    zone: String,
    image_id: String,
) -> Result<(), StepError> {
    let outcome = build_world.outcome.borrow();
    let Some(Ok(artifacts)) = &*outcome else {
        return Err(StepError::Assertion(String::from("expected success outcome")));
    };
    let actual = artifacts.region_images.get(&zone);
    check(actual == Some(&image_id), || {
        format!("expected {zone} to hold {image_id}, got {actual:?}")
    })
}

#[then("the instance was probed {count} times")]
fn instance_probe_count(build_world: &BuildWorld, count: usize) -> Result<(), StepError> {
    let actual = build_world.cloud.instance_probes();
    check(actual == count, || {
        format!("expected {count} instance probes, got {actual}")
    })
}

#[then("the image was probed {count} times")]
fn image_probe_count(build_world: &BuildWorld, count: usize) -> Result<(), StepError> {
    let actual = build_world.cloud.image_probes();
    check(actual == count, || {
        format!("expected {count} image probes, got {actual}")
    })
}

#[then("nothing was deleted")]
fn nothing_deleted(build_world: &BuildWorld) -> Result<(), StepError> {
    let deleted = build_world.cloud.deleted_resources();
    check(deleted.is_empty(), || {
        format!("expected no deletes, got {deleted:?}")
    })
}

#[then("the deleted resources are \"{resources}\"")]
fn deleted_resources(build_world: &BuildWorld, resources: String) -> Result<(), StepError> {
    let expected = split_list(&resources);
    let actual = build_world.cloud.deleted_resources();
    check(actual == expected, || {
        format!("expected deletes {expected:?}, got {actual:?}")
    })
}

#[then("the instance delete was attempted {count} times")]
fn instance_delete_attempts(build_world: &BuildWorld, count: usize) -> Result<(), StepError> {
    let actual = build_world
        .cloud
        .count(|call| matches!(call, CloudCall::DeleteInstance { .. }));
    check(actual == count, || {
        format!("expected {count} instance deletes, got {actual}")
    })
}

#[then("the supported regions were never listed")]
fn regions_never_listed(build_world: &BuildWorld) -> Result<(), StepError> {
    let lookups = build_world
        .cloud
        .count(|call| matches!(call, CloudCall::DescribeRegions));
    check(lookups == 0, || {
        format!("expected no region lookups, got {lookups}")
    })
}

#[then("no instance was created")]
fn no_instance_created(build_world: &BuildWorld) -> Result<(), StepError> {
    let created = build_world
        .cloud
        .count(|call| matches!(call, CloudCall::CreateInstance { .. }));
    check(created == 0, || format!("expected no instance, got {created}"))
}

#[then("no cleanup warnings were reported")]
fn no_cleanup_warnings(build_world: &BuildWorld) -> Result<(), StepError> {
    let outcome = build_world.outcome.borrow();
    let warnings = match &*outcome {
        Some(Ok(artifacts)) => artifacts.warnings.len(),
        Some(Err(failure)) => failure.cleanup_warnings.len(),
        None => return Err(StepError::Assertion(String::from("missing outcome"))),
    };
    check(warnings == 0, || format!("expected no warnings, got {warnings}"))
}

#[then("{count} cleanup warning mentions \"{resource}\"")]
fn cleanup_warning_mentions(
    build_world: &BuildWorld,
    count: usize,
    resource: String,
) -> Result<(), StepError> {
    let outcome = build_world.outcome.borrow();
    let warnings = match &*outcome {
        Some(Ok(artifacts)) => &artifacts.warnings,
        Some(Err(failure)) => &failure.cleanup_warnings,
        None => return Err(StepError::Assertion(String::from("missing outcome"))),
    };
    let matching = warnings
        .iter()
        .filter(|warning| warning.resource.contains(&resource))
        .count();
    check(matching == count, || {
        format!("expected {count} warnings about {resource}, got {warnings:?}")
    })
}

#[then("the source snapshot is \"{snapshot_id}\"")]
fn source_snapshot(build_world: &BuildWorld, snapshot_id: String) -> Result<(), StepError> {
    let outcome = build_world.outcome.borrow();
    let Some(Ok(artifacts)) = &*outcome else {
        return Err(StepError::Assertion(String::from("expected success outcome")));
    };
    check(artifacts.source_snapshot.as_deref() == Some(snapshot_id.as_str()), || {
        format!(
            "expected source snapshot {snapshot_id}, got {:?}",
            artifacts.source_snapshot
        )
    })
}
