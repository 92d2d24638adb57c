//! Error kinds surfaced by the build pipeline.

use std::fmt;

use thiserror::Error;

use crate::client::CloudError;
use crate::poll::PollError;

/// Role a region plays in a build.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegionRole {
    /// Region hosting the build instance.
    Source,
    /// Region receiving an image copy.
    Destination,
}

impl fmt::Display for RegionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Destination => f.write_str("destination"),
        }
    }
}

/// One problem found before any resource is created.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigurationIssue {
    /// The region is not offered by the provider.
    #[error("not a valid {role} region: {region}")]
    InvalidRegion {
        /// Region as configured.
        region: String,
        /// Whether the region is the source or a copy destination.
        role: RegionRole,
    },
    /// The target image name is already taken.
    #[error("image name '{name}' is used by an existing image: {image_id}")]
    ImageNameInUse {
        /// Requested image name.
        name: String,
        /// Identifier of the conflicting image.
        image_id: String,
    },
    /// The provider cannot copy images, so the destination is unreachable.
    #[error("cannot copy images to {region}: the provider does not support image copies")]
    CopyUnsupported {
        /// Destination region as configured.
        region: String,
    },
    /// The supported regions could not be listed.
    #[error("failed to list supported regions: {0}")]
    RegionLookup(CloudError),
    /// Existing images could not be queried.
    #[error("failed to query existing images: {0}")]
    ImageLookup(CloudError),
}

/// Every configuration problem found by one validation pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConfigurationIssues(Vec<ConfigurationIssue>);

impl ConfigurationIssues {
    /// Creates an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds an issue.
    pub fn push(&mut self, issue: ConfigurationIssue) {
        self.0.push(issue);
    }

    /// Returns true when no issue was recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of recorded issues.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the recorded issues.
    pub fn iter(&self) -> std::slice::Iter<'_, ConfigurationIssue> {
        self.0.iter()
    }
}

impl From<Vec<ConfigurationIssue>> for ConfigurationIssues {
    fn from(value: Vec<ConfigurationIssue>) -> Self {
        Self(value)
    }
}

impl<'a> IntoIterator for &'a ConfigurationIssues {
    type Item = &'a ConfigurationIssue;
    type IntoIter = std::slice::Iter<'a, ConfigurationIssue>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for ConfigurationIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for issue in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

/// Primary reason a build stopped.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BuildError {
    /// Pre-validation found one or more problems.
    #[error("invalid configuration: {0}")]
    Configuration(ConfigurationIssues),
    /// A provider call failed.
    #[error("{action} failed: {source}")]
    Cloud {
        /// Operation that failed.
        action: String,
        /// Provider error.
        #[source]
        source: Box<CloudError>,
    },
    /// A describe call failed while waiting.
    #[error("probe failed while waiting for {what}: {source}")]
    Probe {
        /// Awaited condition.
        what: String,
        /// Provider error.
        #[source]
        source: Box<CloudError>,
    },
    /// A wait exhausted its budget.
    #[error("timed out after {waited_secs}s waiting for {what}")]
    Timeout {
        /// Awaited condition.
        what: String,
        /// Exhausted budget in seconds.
        waited_secs: u64,
        /// Number of probes issued.
        attempts: u32,
    },
    /// The awaited resource entered a state it cannot leave.
    #[error("{what} can never become ready: {reason}")]
    Unsatisfiable {
        /// Awaited condition.
        what: String,
        /// Reason reported for the resource.
        reason: String,
    },
    /// The build was cancelled.
    #[error("build cancelled")]
    Cancelled,
    /// A step ran before the step that provides its input.
    #[error("pipeline state is missing `{key}`")]
    MissingState {
        /// Missing state key.
        key: &'static str,
    },
    /// A step halted without recording a reason.
    #[error("step {step} halted the build")]
    Halted {
        /// Step that halted.
        step: &'static str,
    },
}

impl BuildError {
    /// Wraps a failed provider call.
    #[must_use]
    pub fn cloud(action: impl Into<String>, source: CloudError) -> Self {
        Self::Cloud {
            action: action.into(),
            source: Box::new(source),
        }
    }
}

impl From<PollError<CloudError>> for BuildError {
    fn from(value: PollError<CloudError>) -> Self {
        match value {
            PollError::Timeout {
                what,
                waited,
                attempts,
            } => Self::Timeout {
                what,
                waited_secs: waited.as_secs(),
                attempts,
            },
            PollError::Probe { what, source } => Self::Probe {
                what,
                source: Box::new(source),
            },
            PollError::Unsatisfiable { what, reason } => Self::Unsatisfiable { what, reason },
            PollError::Cancelled { .. } => Self::Cancelled,
        }
    }
}

/// A compensating action that did not complete.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{step}: failed to remove {resource}: {message}")]
pub struct CleanupWarning {
    /// Step that owned the resource.
    pub step: &'static str,
    /// Resource that may still exist.
    pub resource: String,
    /// Why removal failed.
    pub message: String,
}

/// A failed build: the primary error plus any secondary cleanup diagnostics.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("build failed{}: {error}", .step.map(|name| format!(" at step {name}")).unwrap_or_default())]
pub struct BuildFailure {
    /// Step that halted, when the failure came from a step.
    pub step: Option<&'static str>,
    /// Primary failure reason.
    pub error: BuildError,
    /// Cleanup problems encountered afterwards.
    pub cleanup_warnings: Vec<CleanupWarning>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn issues_render_every_problem() {
        let issues = ConfigurationIssues::from(vec![
            ConfigurationIssue::InvalidRegion {
                region: String::from("mars-1"),
                role: RegionRole::Source,
            },
            ConfigurationIssue::InvalidRegion {
                region: String::from("venus-2"),
                role: RegionRole::Destination,
            },
        ]);

        assert_eq!(
            BuildError::Configuration(issues).to_string(),
            "invalid configuration: not a valid source region: mars-1; \
             not a valid destination region: venus-2"
        );
    }

    #[test]
    fn poll_timeouts_convert_to_build_timeouts() {
        let error = BuildError::from(PollError::<CloudError>::Timeout {
            what: String::from("instance i-1 to reach Stopped"),
            waited: Duration::from_secs(60),
            attempts: 12,
        });

        assert_eq!(
            error,
            BuildError::Timeout {
                what: String::from("instance i-1 to reach Stopped"),
                waited_secs: 60,
                attempts: 12,
            }
        );
    }

    #[test]
    fn failure_names_the_step() {
        let failure = BuildFailure {
            step: Some("create_instance"),
            error: BuildError::Cancelled,
            cleanup_warnings: Vec::new(),
        };
        assert_eq!(
            failure.to_string(),
            "build failed at step create_instance: build cancelled"
        );
    }
}
