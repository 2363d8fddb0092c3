//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::models::error::{PackageError, PackageResult};
use crate::models::package::{PackageRequest, Verbosity};

/// Cross-platform replacement for Microsoft Win32 Content Prep Tool
#[derive(Parser, Debug, Default)]
#[command(name = "intunepack")]
#[command(author, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct CliArgs {
    /// Source folder containing the setup file and all supporting files
    #[arg(short = 'c', long = "content")]
    pub content_folder: Option<PathBuf>,

    /// Setup file name within the source folder
    #[arg(short = 's', long = "setup")]
    pub setup_file: Option<String>,

    /// Output folder for the .intunewin file
    #[arg(short = 'o', long = "output")]
    pub output_folder: Option<PathBuf>,

    /// Quiet mode - no prompts, no progress, requires -c, -s and -o
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Print version information
    #[arg(short = 'v', long = "version")]
    pub version: bool,
}

impl CliArgs {
    /// Get the verbosity level.
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }

    /// Check if interactive mode is needed.
    pub fn needs_interactive(&self) -> bool {
        let missing_required = self.content_folder.is_none()
            || self.setup_file.is_none()
            || self.output_folder.is_none();

        missing_required && !self.quiet
    }

    /// Convert CLI args to a package request.
    pub fn to_package_request(&self) -> PackageResult<PackageRequest> {
        let content_folder =
            self.content_folder
                .clone()
                .ok_or_else(|| PackageError::InvalidArgument {
                    reason: "Source folder (-c) is required".to_string(),
                })?;

        let setup_file = self
            .setup_file
            .clone()
            .ok_or_else(|| PackageError::InvalidArgument {
                reason: "Setup file (-s) is required".to_string(),
            })?;

        let output_folder =
            self.output_folder
                .clone()
                .ok_or_else(|| PackageError::InvalidArgument {
                    reason: "Output folder (-o) is required".to_string(),
                })?;

        Ok(
            PackageRequest::new(content_folder, setup_file, output_folder)
                .with_verbosity(self.verbosity()),
        )
    }
}
