//! Core library for the `imagewright` image builder.
//!
//! A build is an ordered pipeline of steps: validate the request, launch a
//! temporary instance, capture an image, optionally copy it to other regions
//! and tear the instance down. Steps share a typed [`StateBag`]; when one
//! halts, every step that ran is asked to delete what it created, newest
//! first. Remote waits go through [`poll_until`].
//!
//! The provider sits behind [`ResourceLifecycleClient`]; [`ScalewayClient`]
//! implements it over the Scaleway Instances API and
//! [`test_support::ScriptedCloud`] implements it in memory.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod poll;
pub mod request;
pub mod scaleway;
pub mod state;
pub mod step;
pub mod steps;
pub mod test_support;
pub mod user_data;

pub use client::{CloudError, CloudErrorKind, ResourceLifecycleClient};
pub use config::{BuildConfig, ConfigError, ScalewayConfig};
pub use error::{BuildError, BuildFailure, CleanupWarning, ConfigurationIssue};
pub use orchestrator::{BuildArtifacts, BuildOrchestrator};
pub use pipeline::{Pipeline, PipelineReport, RunOutcome};
pub use poll::{PollError, PollSpec, Readiness, poll_until};
pub use request::{BuildOptions, BuildRequest, BuildRequestBuilder, BuildTimeouts, RequestError};
pub use scaleway::ScalewayClient;
pub use state::StateBag;
pub use step::{CleanupOutcome, Step, StepAction, StepContext};
