//! BDD scenarios for the image build pipeline.

use rstest_bdd_macros::scenario;

use super::test_helpers::{BuildWorld, build_world};

#[scenario(
    path = "tests/features/build.feature",
    name = "Wait for the build instance to stop"
)]
fn scenario_wait_for_stop(build_world: BuildWorld) {
    drop(build_world);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Follow image progress until complete"
)]
fn scenario_image_progress(build_world: BuildWorld) {
    drop(build_world);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Time out when the instance never stops"
)]
fn scenario_instance_timeout(build_world: BuildWorld) {
    drop(build_world);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Retry instance deletion after a failed image"
)]
fn scenario_failed_image_cleanup(build_world: BuildWorld) {
    drop(build_world);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Remove resources in reverse order when a copy is rejected"
)]
fn scenario_copy_rejected(build_world: BuildWorld) {
    drop(build_world);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Report every invalid zone before provisioning"
)]
fn scenario_invalid_zones(build_world: BuildWorld) {
    drop(build_world);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Tear down only the build instance on success"
)]
fn scenario_teardown(build_world: BuildWorld) {
    drop(build_world);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Copy the image to another zone"
)]
fn scenario_copy_image(build_world: BuildWorld) {
    drop(build_world);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Replace an existing image with the same name"
)]
fn scenario_replace_existing(build_world: BuildWorld) {
    drop(build_world);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Refuse an existing image name without force"
)]
fn scenario_name_in_use(build_world: BuildWorld) {
    drop(build_world);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Warn when the build instance cannot be removed"
)]
fn scenario_cleanup_warning(build_world: BuildWorld) {
    drop(build_world);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Build from the system disk snapshot when data disks are ignored"
)]
fn scenario_snapshot_source(build_world: BuildWorld) {
    drop(build_world);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Reject copy destinations when the provider cannot copy images"
)]
fn scenario_copy_unsupported(build_world: BuildWorld) {
    drop(build_world);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "Build in unlisted zones when region validation is skipped"
)]
fn scenario_skip_region_validation(build_world: BuildWorld) {
    drop(build_world);
}
