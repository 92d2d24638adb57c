//! Shared state threaded through one pipeline run.
//!
//! Values are addressed by [`StateKey`]s that carry their value type, so a key
//! written by one step always reads back with the same type in later steps.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;

use crate::client::InstanceDescriptor;
use crate::error::{BuildError, CleanupWarning};

/// Typed key into a [`StateBag`].
pub struct StateKey<T> {
    name: &'static str,
    marker: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    /// Declares a key with the given name.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            marker: PhantomData,
        }
    }

    /// Name of the key.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StateKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StateKey<T> {}

impl<T> fmt::Debug for StateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateKey").field(&self.name).finish()
    }
}

/// Keys written by the build steps.
pub mod keys {
    use super::{BTreeMap, InstanceDescriptor, StateKey};

    /// Build instance created by the create-instance step.
    pub const INSTANCE: StateKey<InstanceDescriptor> = StateKey::new("instance");
    /// System disk snapshot used when data disks are ignored.
    pub const SOURCE_SNAPSHOT: StateKey<String> = StateKey::new("source_snapshot");
    /// Identifier of the image built in the source region.
    pub const IMAGE_ID: StateKey<String> = StateKey::new("image");
    /// Snapshots backing the built image.
    pub const SNAPSHOT_IDS: StateKey<Vec<String>> = StateKey::new("snapshots");
    /// Image identifier per region, including copies.
    pub const REGION_IMAGES: StateKey<BTreeMap<String, String>> = StateKey::new("region_images");
}

/// Record of the step failure that halted a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StepFailure {
    /// Step that halted.
    pub step: &'static str,
    /// Error the step reported.
    pub error: BuildError,
}

/// Mutable key/value context shared by every step of one run.
#[derive(Default)]
pub struct StateBag {
    values: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
    failure: Option<StepFailure>,
    cancelled: bool,
    warnings: Vec<CleanupWarning>,
}

impl StateBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any previous value under the same key.
    pub fn put<T>(&mut self, key: StateKey<T>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.values.insert(key.name, Box::new(value));
    }

    /// Reads a value.
    #[must_use]
    pub fn get<T: 'static>(&self, key: StateKey<T>) -> Option<&T> {
        self.values
            .get(key.name)
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Reads a mutable value.
    pub fn get_mut<T: 'static>(&mut self, key: StateKey<T>) -> Option<&mut T> {
        self.values
            .get_mut(key.name)
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Reads a value that an earlier step must have written.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MissingState`] when the key is absent.
    pub fn require<T: 'static>(&self, key: StateKey<T>) -> Result<&T, BuildError> {
        self.get(key)
            .ok_or(BuildError::MissingState { key: key.name })
    }

    /// Returns true when a value is stored under the key.
    #[must_use]
    pub fn contains<T: 'static>(&self, key: StateKey<T>) -> bool {
        self.get(key).is_some()
    }

    /// Records the error that halts the run. The first failure wins.
    pub fn record_failure(&mut self, step: &'static str, error: BuildError) {
        if self.failure.is_none() {
            self.failure = Some(StepFailure { step, error });
        }
    }

    /// Failure recorded by a halting step.
    #[must_use]
    pub const fn failure(&self) -> Option<&StepFailure> {
        self.failure.as_ref()
    }

    /// Returns true once a step has halted the run.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.failure.is_some()
    }

    /// Marks the run as cancelled.
    pub const fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Returns true when the run was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Records a non-fatal diagnostic.
    pub fn push_warning(&mut self, warning: CleanupWarning) {
        self.warnings.push(warning);
    }

    /// Drains the diagnostics recorded so far.
    pub fn take_warnings(&mut self) -> Vec<CleanupWarning> {
        std::mem::take(&mut self.warnings)
    }
}

impl fmt::Debug for StateBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort_unstable();
        f.debug_struct("StateBag")
            .field("keys", &keys)
            .field("failure", &self.failure)
            .field("cancelled", &self.cancelled)
            .field("warnings", &self.warnings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InstanceStatus;

    #[test]
    fn typed_keys_round_trip_values() {
        let mut bag = StateBag::new();
        bag.put(keys::IMAGE_ID, String::from("img-1"));
        bag.put(
            keys::INSTANCE,
            InstanceDescriptor {
                id: String::from("i-1"),
                region: String::from("fr-par-1"),
                status: InstanceStatus::Stopped,
                system_disk_id: None,
            },
        );

        assert_eq!(bag.get(keys::IMAGE_ID).map(String::as_str), Some("img-1"));
        assert_eq!(
            bag.get(keys::INSTANCE).map(|instance| instance.id.as_str()),
            Some("i-1")
        );
        assert!(!bag.contains(keys::SNAPSHOT_IDS));
    }

    #[test]
    fn require_reports_missing_key() {
        let bag = StateBag::new();
        assert_eq!(
            bag.require(keys::INSTANCE),
            Err(BuildError::MissingState { key: "instance" })
        );
    }

    #[test]
    fn first_failure_is_kept() {
        let mut bag = StateBag::new();
        bag.record_failure("first", BuildError::Cancelled);
        bag.record_failure("second", BuildError::MissingState { key: "image" });

        assert!(bag.is_halted());
        assert_eq!(bag.failure().map(|failure| failure.step), Some("first"));
    }
}
