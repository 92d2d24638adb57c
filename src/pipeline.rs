//! Sequential step runner with reverse-order compensation.
//!
//! Steps run strictly in order on the caller's task. Cancellation is observed
//! between steps (and inside waits, which observe the same token). When the
//! run halts or is cancelled, every step whose `run` was invoked is cleaned up
//! in reverse order, including the step that halted. A run that completes
//! never invokes cleanup.

use tracing::{info, warn};

use crate::error::CleanupWarning;
use crate::state::StateBag;
use crate::step::{CleanupOutcome, Step, StepAction, StepContext, StepState};

/// How a pipeline run ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunOutcome {
    /// Every step returned [`StepAction::Continue`].
    Completed,
    /// A step returned [`StepAction::Halt`].
    Halted {
        /// Step that halted.
        step: &'static str,
    },
    /// Cancellation was observed before `step` started.
    Cancelled {
        /// First step that did not run, if any remained.
        before: Option<&'static str>,
    },
}

/// Final state of one step after a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StepRecord {
    /// Step name.
    pub name: &'static str,
    /// Last lifecycle state reached.
    pub state: StepState,
}

/// Summary of a pipeline run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PipelineReport {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Per-step lifecycle, in pipeline order.
    pub steps: Vec<StepRecord>,
    /// Names of the steps cleaned up, in the order cleanup ran.
    pub cleanup_order: Vec<&'static str>,
    /// Cleanup problems, in the order they occurred.
    pub cleanup_warnings: Vec<CleanupWarning>,
}

/// Ordered list of steps executed once per build.
#[derive(Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step.
    pub fn push<S>(&mut self, step: S)
    where
        S: Step + 'static,
    {
        self.steps.push(Box::new(step));
    }

    /// Appends a step, builder style.
    #[must_use]
    pub fn with_step<S>(mut self, step: S) -> Self
    where
        S: Step + 'static,
    {
        self.push(step);
        self
    }

    /// Names of the steps in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true when the pipeline has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order, cleaning up in reverse on halt or cancel.
    pub async fn run(&mut self, ctx: &StepContext, state: &mut StateBag) -> PipelineReport {
        let mut records: Vec<StepRecord> = self
            .steps
            .iter()
            .map(|step| StepRecord {
                name: step.name(),
                state: StepState::NotStarted,
            })
            .collect();

        let mut outcome = RunOutcome::Completed;
        let mut started = 0_usize;

        for (step, record) in self.steps.iter_mut().zip(records.iter_mut()) {
            if ctx.is_cancelled() {
                info!(step = record.name, "cancellation observed, not starting step");
                state.mark_cancelled();
                outcome = RunOutcome::Cancelled {
                    before: Some(record.name),
                };
                break;
            }

            info!(step = record.name, "running step");
            record.state = StepState::Running;
            started = started.saturating_add(1);

            match step.run(ctx, state).await {
                StepAction::Continue => {
                    record.state = StepState::Succeeded;
                    info!(step = record.name, "step finished");
                }
                StepAction::Halt => {
                    record.state = StepState::Failed;
                    outcome = RunOutcome::Halted { step: record.name };
                    break;
                }
            }
        }

        let mut cleanup_order = Vec::new();
        let mut cleanup_warnings = state.take_warnings();

        if outcome != RunOutcome::Completed {
            let ran = self
                .steps
                .iter_mut()
                .zip(records.iter_mut())
                .take(started)
                .rev();
            for (step, record) in ran {
                record.state = StepState::CleaningUp;
                cleanup_order.push(record.name);
                match step.cleanup(state).await {
                    CleanupOutcome::NothingToDo | CleanupOutcome::Removed => {
                        record.state = StepState::CleanedUp;
                    }
                    CleanupOutcome::Failed(warning) => {
                        warn!(step = record.name, %warning, "cleanup failed");
                        record.state = StepState::CleanupFailed;
                        cleanup_warnings.push(warning);
                    }
                }
            }
            cleanup_warnings.append(&mut state.take_warnings());
        }

        PipelineReport {
            outcome,
            steps: records,
            cleanup_order,
            cleanup_warnings,
        }
    }
}
