//! Cancellation of a running build.

use std::sync::Arc;
use std::time::Duration;

use imagewright::client::InstanceStatus;
use imagewright::test_support::{CloudCall, ImageSample, ScriptedCloud};
use imagewright::{BuildError, BuildOrchestrator, BuildRequest};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

fn request() -> BuildRequest {
    BuildRequest::builder()
        .image_name("golden")
        .region("fr-par-1")
        .instance_type("DEV1-S")
        .source_image("ubuntu_noble")
        .architecture("x86_64")
        .build()
        .unwrap_or_else(|err| panic!("request should build: {err}"))
}

#[tokio::test(start_paused = true)]
async fn cancel_during_instance_wait_removes_the_instance() {
    let cloud = ScriptedCloud::new();
    cloud.push_instance_status(InstanceStatus::Running);
    let orchestrator = BuildOrchestrator::new(Arc::new(cloud.clone()));
    let cancel = CancellationToken::new();
    let request = request();

    let (outcome, ()) = tokio::join!(orchestrator.build(&request, cancel.clone()), async {
        sleep(Duration::from_secs(12)).await;
        cancel.cancel();
    });

    let failure = outcome
        .err()
        .unwrap_or_else(|| panic!("cancelled build should fail"));
    assert_eq!(failure.error, BuildError::Cancelled);
    assert!(failure.cleanup_warnings.is_empty());
    assert_eq!(cloud.instance_probes(), 3);
    assert_eq!(cloud.deleted_resources(), ["i-1"]);
    assert_eq!(
        cloud.count(|call| matches!(call, CloudCall::CreateImage { .. })),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn cancel_during_image_wait_removes_image_then_instance() {
    let cloud = ScriptedCloud::new();
    cloud.push_image_sample(ImageSample::creating("10%"));
    let orchestrator = BuildOrchestrator::new(Arc::new(cloud.clone()));
    let cancel = CancellationToken::new();
    let request = request();

    let (outcome, ()) = tokio::join!(orchestrator.build(&request, cancel.clone()), async {
        sleep(Duration::from_secs(30)).await;
        cancel.cancel();
    });

    let failure = outcome
        .err()
        .unwrap_or_else(|| panic!("cancelled build should fail"));
    assert_eq!(failure.error, BuildError::Cancelled);
    assert_eq!(cloud.deleted_resources(), ["img-2", "i-1"]);
}
