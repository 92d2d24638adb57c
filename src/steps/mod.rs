//! Concrete build steps.
//!
//! Each resource-owning step pairs its creation call with the wait for that
//! resource, records the handle as soon as the creation call succeeds, and
//! deletes it again in `cleanup`.

mod cleanup;
pub mod copy_image;
pub mod create_image;
pub mod create_instance;
pub mod create_snapshot;
pub mod delete_existing;
pub mod delete_instance;
pub mod pre_validate;

pub use copy_image::CopyImageStep;
pub use create_image::CreateImageStep;
pub use create_instance::CreateInstanceStep;
pub use create_snapshot::CreateSnapshotStep;
pub use delete_existing::DeleteExistingImagesStep;
pub use delete_instance::DeleteBuildInstanceStep;
pub use pre_validate::PreValidateStep;
