//! Shared fixtures for build pipeline BDD scenarios.

use std::cell::{Cell, RefCell};

use imagewright::test_support::ScriptedCloud;
use imagewright::{
    BuildArtifacts, BuildFailure, BuildOptions, BuildRequest, BuildRequestBuilder, BuildTimeouts,
    RequestError,
};
use rstest::fixture;

/// Scenario state. Steps receive it by shared reference, so the mutable
/// parts live behind `Cell` and `RefCell`.
#[derive(Debug, Default)]
pub struct BuildWorld {
    pub cloud: ScriptedCloud,
    pub request: RefCell<BuildRequestBuilder>,
    pub options: Cell<BuildOptions>,
    pub timeouts: Cell<BuildTimeouts>,
    pub outcome: RefCell<Option<Result<BuildArtifacts, BuildFailure>>>,
}

impl BuildWorld {
    pub fn update_request(&self, apply: impl FnOnce(BuildRequestBuilder) -> BuildRequestBuilder) {
        let builder = self.request.take();
        self.request.replace(apply(builder));
    }

    pub fn update_options(&self, apply: impl FnOnce(&mut BuildOptions)) {
        let mut options = self.options.get();
        apply(&mut options);
        self.options.set(options);
    }

    pub fn request(&self) -> Result<BuildRequest, RequestError> {
        self.request
            .borrow()
            .clone()
            .options(self.options.get())
            .timeouts(self.timeouts.get())
            .build()
    }
}

#[fixture]
pub fn build_world() -> BuildWorld {
    let world = BuildWorld::default();
    world.update_request(|builder| {
        builder
            .image_name("golden")
            .region("fr-par-1")
            .instance_type("DEV1-S")
            .source_image("ubuntu_noble")
            .architecture("x86_64")
    });
    world
}

/// Splits a comma separated step argument, ignoring blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
