//! Command-line interface definitions for the `imagewright` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `imagewright` binary.
#[derive(Debug, Parser)]
#[command(
    name = "imagewright",
    about = "Bake machine images on Scaleway through a self-cleaning build pipeline",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Build an image from a temporary instance.
    #[command(name = "build", about = "Build an image from a temporary instance")]
    Build(BuildCommand),
}

/// Arguments for the `imagewright build` subcommand.
///
/// Every flag overrides the matching `imagewright.toml` or `IMAGEWRIGHT_*`
/// setting.
#[derive(Debug, Default, Parser)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "CLI switches map one-to-one onto build toggles"
)]
pub(crate) struct BuildCommand {
    /// Name of the image to produce.
    #[arg(long, value_name = "NAME")]
    pub(crate) image_name: Option<String>,
    /// Scaleway commercial type of the build instance.
    #[arg(long, value_name = "TYPE")]
    pub(crate) instance_type: Option<String>,
    /// Image label or identifier the build instance boots from.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) source_image: Option<String>,
    /// Zone to build in.
    #[arg(long, value_name = "ZONE")]
    pub(crate) zone: Option<String>,
    /// Copy the finished image into this zone; repeat for several zones.
    #[arg(long = "copy-to", value_name = "ZONE")]
    pub(crate) copy_to: Vec<String>,
    /// Replace images that already carry the target name.
    #[arg(long)]
    pub(crate) force: bool,
    /// Accept zones without checking them against the provider.
    #[arg(long)]
    pub(crate) skip_region_validation: bool,
    /// Build the image from a snapshot of the system disk only.
    #[arg(long)]
    pub(crate) ignore_data_disks: bool,
    /// Provide user data inline (cloud-config YAML or script).
    #[arg(long, value_name = "USER_DATA", conflicts_with = "user_data_file")]
    pub(crate) user_data: Option<String>,
    /// Provide user data from a local file.
    #[arg(long, value_name = "PATH", conflicts_with = "user_data")]
    pub(crate) user_data_file: Option<String>,
    /// Emit debug logs.
    #[arg(long, short)]
    pub(crate) verbose: bool,
}
