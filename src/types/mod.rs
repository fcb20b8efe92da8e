// ABOUTME: Validated domain types shared across the crate.
// ABOUTME: Environment names, version ids, and container image references.

mod environment_name;
mod image_ref;
mod version_id;

pub use environment_name::{EnvironmentName, EnvironmentNameError};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use version_id::{VersionId, VersionIdError};
