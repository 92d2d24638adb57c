//! Step contract for the build pipeline.
//!
//! A step owns at most one remote resource. `run` creates it (and waits for it
//! to become usable); `cleanup` deletes it again when the run is abandoned.
//! Cleanup is a no-op for a step that never recorded a resource handle.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::{BuildError, CleanupWarning};
use crate::state::StateBag;

/// Future returned by step operations.
pub type StepFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the pipeline does after a step's `run` returns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepAction {
    /// Proceed to the next step.
    Continue,
    /// Stop the run and clean up.
    Halt,
}

/// Result of a step's compensating action.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CleanupOutcome {
    /// The step owns nothing that needs removing.
    NothingToDo,
    /// The owned resource was removed.
    Removed,
    /// Removal failed; the resource may still exist.
    Failed(CleanupWarning),
}

/// Lifecycle of a step within one run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepState {
    /// `run` has not been invoked.
    NotStarted,
    /// `run` is in progress.
    Running,
    /// `run` returned [`StepAction::Continue`].
    Succeeded,
    /// `run` returned [`StepAction::Halt`].
    Failed,
    /// `cleanup` is in progress.
    CleaningUp,
    /// `cleanup` finished without problems.
    CleanedUp,
    /// `cleanup` reported a warning.
    CleanupFailed,
}

/// Per-run context handed to every step's `run`.
#[derive(Clone, Debug, Default)]
pub struct StepContext {
    cancel: CancellationToken,
}

impl StepContext {
    /// Creates a context observing the given cancellation token.
    #[must_use]
    pub const fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Cancellation token for the run.
    #[must_use]
    pub const fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// One stage of the build pipeline.
pub trait Step: Send {
    /// Stable name used in logs and failure reports.
    fn name(&self) -> &'static str;

    /// Performs the step's work.
    fn run<'a>(
        &'a mut self,
        ctx: &'a StepContext,
        state: &'a mut StateBag,
    ) -> StepFuture<'a, StepAction>;

    /// Undoes the step's work after the run was halted or cancelled.
    fn cleanup<'a>(&'a mut self, state: &'a mut StateBag) -> StepFuture<'a, CleanupOutcome>;
}

/// Records `error` as the reason the run stops and returns
/// [`StepAction::Halt`].
pub fn halt(state: &mut StateBag, step: &'static str, error: BuildError) -> StepAction {
    error!(step, error = %error, "step halted the build");
    state.record_failure(step, error);
    StepAction::Halt
}
