//! Package-related data models.

use std::path::PathBuf;
use std::time::Duration;

use crate::models::error::{PackageError, PackageResult};

/// Setup file extensions accepted by the packager (lowercase).
pub const SUPPORTED_SETUP_EXTENSIONS: &[&str] = &["msi", "exe", "ps1", "cmd", "bat"];

/// Verbosity level for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Normal mode - show progress and messages
    #[default]
    Normal,
    /// Quiet mode - no prompts, no progress, single-line output
    Quiet,
}

impl Verbosity {
    /// Returns true if prompts should be suppressed.
    pub fn suppress_prompts(&self) -> bool {
        matches!(self, Verbosity::Quiet)
    }

    /// Returns true if progress should be shown.
    pub fn show_progress(&self) -> bool {
        matches!(self, Verbosity::Normal)
    }
}

/// Request to create an IntuneWin package.
#[derive(Debug, Clone)]
pub struct PackageRequest {
    /// Path to the source folder containing files to package
    pub source_folder: PathBuf,
    /// Name of the setup file within the source folder
    pub setup_file: String,
    /// Path to the output folder where .intunewin will be created
    pub output_folder: PathBuf,
    /// Verbosity level for output
    pub verbosity: Verbosity,
}

impl PackageRequest {
    /// Create a new package request.
    pub fn new(source_folder: PathBuf, setup_file: String, output_folder: PathBuf) -> Self {
        Self {
            source_folder,
            setup_file,
            output_folder,
            verbosity: Verbosity::default(),
        }
    }

    /// Set verbosity level.
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Validate the package request.
    pub fn validate(&self) -> PackageResult<()> {
        if !self.source_folder.is_dir() {
            return Err(PackageError::SourceFolderNotFound {
                path: self.source_folder.clone(),
            });
        }

        // The setup file is a plain name, not a path into a subfolder
        if self.setup_file.contains('/') || self.setup_file.contains('\\') {
            return Err(PackageError::InvalidArgument {
                reason: format!(
                    "Setup file must be a plain file name, got '{}'",
                    self.setup_file
                ),
            });
        }

        let setup_path = self.source_folder.join(&self.setup_file);
        if !setup_path.is_file() {
            return Err(PackageError::SetupFileNotFound {
                file: self.setup_file.clone(),
                folder: self.source_folder.clone(),
            });
        }

        let extension = PathBuf::from(&self.setup_file)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_SETUP_EXTENSIONS.contains(&extension.as_str()) {
            return Err(PackageError::UnsupportedSetupType {
                file: self.setup_file.clone(),
            });
        }

        if self.output_folder.as_os_str().is_empty() {
            return Err(PackageError::InvalidArgument {
                reason: "Output folder path cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the output file path.
    pub fn output_path(&self) -> PathBuf {
        self.output_folder
            .join(format!("{}.intunewin", application_name(&self.setup_file)))
    }
}

/// Derive the application name from the setup file name.
///
/// A trailing `.msi` or `.exe` extension is stripped (case-insensitively);
/// script extensions stay part of the name, matching IntuneWinAppUtil
/// (`run.ps1` packages as `run.ps1.intunewin`).
pub fn application_name(setup_file: &str) -> String {
    if let Some(pos) = setup_file.rfind('.') {
        let ext = &setup_file[pos + 1..];
        if ext.eq_ignore_ascii_case("msi") || ext.eq_ignore_ascii_case("exe") {
            return setup_file[..pos].to_string();
        }
    }
    setup_file.to_string()
}

/// The outcome of a successful packaging run.
#[derive(Debug, Clone)]
pub struct PackageOutcome {
    /// Full path to the generated .intunewin file
    pub output_path: PathBuf,
    /// Total size of the source folder in bytes
    pub source_size: u64,
    /// Size of the compressed inner ZIP in bytes
    pub zip_size: u64,
    /// Size of the encrypted blob in bytes
    pub encrypted_size: u64,
    /// Size of the final .intunewin file in bytes
    pub final_size: u64,
    /// Number of regular files in the source folder
    pub file_count: usize,
    /// Time taken to create the package
    pub creation_time: Duration,
}

/// Result of unpacking an IntuneWin package (verification helper).
#[derive(Debug, Clone)]
pub struct UnpackResult {
    /// Path to the output folder containing extracted files
    pub output_folder: PathBuf,
    /// Number of files extracted
    pub file_count: usize,
    /// Total size of extracted files in bytes
    pub total_size: u64,
    /// Original setup file name
    pub setup_file: String,
}
