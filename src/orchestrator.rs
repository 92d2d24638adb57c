//! Build entry point wiring the concrete step sequence.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::ResourceLifecycleClient;
use crate::error::{BuildError, BuildFailure, CleanupWarning};
use crate::pipeline::{Pipeline, PipelineReport, RunOutcome};
use crate::request::BuildRequest;
use crate::state::{StateBag, keys};
use crate::step::StepContext;
use crate::steps::{
    CopyImageStep, CreateImageStep, CreateInstanceStep, CreateSnapshotStep,
    DeleteBuildInstanceStep, DeleteExistingImagesStep, PreValidateStep,
};

/// Identifiers produced by a successful build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildArtifacts {
    /// Image built in the source region.
    pub image_id: String,
    /// Image identifier per region, including copies.
    pub region_images: BTreeMap<String, String>,
    /// Snapshots backing the source image.
    pub snapshot_ids: Vec<String>,
    /// System disk snapshot the image was built from, when data disks were
    /// ignored.
    pub source_snapshot: Option<String>,
    /// Non-fatal problems, such as a build instance that could not be
    /// deleted.
    pub warnings: Vec<CleanupWarning>,
}

/// Runs one build per call against a shared client.
///
/// Independent builds may run concurrently on separate tasks: each call owns
/// its pipeline and state bag.
pub struct BuildOrchestrator<C: ?Sized> {
    client: Arc<C>,
}

impl<C> BuildOrchestrator<C>
where
    C: ResourceLifecycleClient + ?Sized + 'static,
{
    /// Creates an orchestrator around `client`.
    #[must_use]
    pub const fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Assembles the step sequence for `request`.
    #[must_use]
    pub fn pipeline(&self, request: &BuildRequest) -> Pipeline {
        let client = &self.client;
        let options = request.options;
        let mut pipeline =
            Pipeline::new().with_step(PreValidateStep::new(Arc::clone(client), request));
        if options.force_delete_existing {
            pipeline.push(DeleteExistingImagesStep::new(Arc::clone(client), request));
        }
        pipeline.push(CreateInstanceStep::new(Arc::clone(client), request));
        if options.ignore_data_disks {
            pipeline.push(CreateSnapshotStep::new(Arc::clone(client), request));
        }
        pipeline.push(CreateImageStep::new(Arc::clone(client), request));
        if !request.destination_regions.is_empty() {
            pipeline.push(CopyImageStep::new(Arc::clone(client), request));
        }
        if options.delete_build_instance {
            pipeline.push(DeleteBuildInstanceStep::new(Arc::clone(client), request));
        }
        pipeline
    }

    /// Runs the build and returns the produced identifiers.
    ///
    /// Cancelling `cancel` stops the build at the next step boundary or poll
    /// interval; resources created so far are then deleted.
    ///
    /// # Errors
    ///
    /// Returns [`BuildFailure`] carrying the primary error, the step that
    /// halted and any cleanup warnings.
    pub async fn build(
        &self,
        request: &BuildRequest,
        cancel: CancellationToken,
    ) -> Result<BuildArtifacts, BuildFailure> {
        let mut pipeline = self.pipeline(request);
        info!(
            image = %request.image_name,
            region = %request.region,
            steps = ?pipeline.step_names(),
            "starting image build"
        );

        let mut state = StateBag::new();
        let report = pipeline
            .run(&StepContext::new(cancel), &mut state)
            .await;
        finish(&state, report)
    }
}

fn finish(state: &StateBag, report: PipelineReport) -> Result<BuildArtifacts, BuildFailure> {
    let PipelineReport {
        outcome,
        cleanup_warnings,
        ..
    } = report;

    match outcome {
        RunOutcome::Completed => collect_artifacts(state, cleanup_warnings),
        RunOutcome::Halted { step } => {
            let error = state
                .failure()
                .map_or(BuildError::Halted { step }, |failure| failure.error.clone());
            Err(BuildFailure {
                step: Some(step),
                error,
                cleanup_warnings,
            })
        }
        RunOutcome::Cancelled { before } => {
            warn!(before = ?before, "build cancelled");
            Err(BuildFailure {
                step: None,
                error: BuildError::Cancelled,
                cleanup_warnings,
            })
        }
    }
}

fn collect_artifacts(
    state: &StateBag,
    warnings: Vec<CleanupWarning>,
) -> Result<BuildArtifacts, BuildFailure> {
    let missing = |error| BuildFailure {
        step: None,
        error,
        cleanup_warnings: Vec::new(),
    };
    let image_id = state.require(keys::IMAGE_ID).map_err(missing)?.clone();
    let region_images = state.get(keys::REGION_IMAGES).cloned().unwrap_or_default();
    let snapshot_ids = state.get(keys::SNAPSHOT_IDS).cloned().unwrap_or_default();

    info!(image_id = %image_id, regions = region_images.len(), "image build finished");
    Ok(BuildArtifacts {
        image_id,
        region_images,
        snapshot_ids,
        source_snapshot: state.get(keys::SOURCE_SNAPSHOT).cloned(),
        warnings,
    })
}
