//! intunepack packaging library
//!
//! Converts an application installer folder into a .intunewin bundle
//! consumable by Microsoft Intune for Win32 app deployment.

pub mod cli;
pub mod models;
pub mod packager;

pub use models::error::{PackageError, PackageResult};
pub use models::msi::MsiInfo;
pub use models::package::{PackageOutcome, PackageRequest, UnpackResult, Verbosity};
pub use packager::{format_size, package, package_with_progress, unpack_package};
