//! Error types for the IntuneWin packager.

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes matching CLI contract
pub mod exit_codes {
    /// Success
    pub const SUCCESS: i32 = 0;
    /// General error (I/O, permissions, etc.)
    pub const ERROR: i32 = 1;
    /// Invalid or missing required arguments
    pub const INVALID_ARGS: i32 = 2;
    /// Source folder is empty
    pub const EMPTY_SOURCE: i32 = 3;
    /// Setup file not found in source folder
    pub const SETUP_NOT_FOUND: i32 = 4;
    /// Failed to write output file
    pub const OUTPUT_ERROR: i32 = 5;
}

/// Result type for package operations.
pub type PackageResult<T> = Result<T, PackageError>;

/// Errors that can occur during packaging.
#[derive(Error, Debug)]
pub enum PackageError {
    /// Source folder not found or not a directory
    #[error("Source folder not found: {path}")]
    SourceFolderNotFound { path: PathBuf },

    /// Source folder is empty
    #[error("Source folder is empty: {path}")]
    SourceFolderEmpty { path: PathBuf },

    /// Setup file not found in source folder
    #[error("Setup file '{file}' not found in {folder}")]
    SetupFileNotFound { file: String, folder: PathBuf },

    /// Setup file has an unsupported extension
    #[error("Unsupported setup file type: '{file}' (supported: .msi, .exe, .ps1, .cmd, .bat)")]
    UnsupportedSetupType { file: String },

    /// Output folder creation failed
    #[error("Failed to create output folder '{path}': {reason}")]
    OutputFolderCreationFailed { path: PathBuf, reason: String },

    /// Failed to read source file
    #[error("Failed to read source file '{path}': {reason}")]
    SourceReadError { path: PathBuf, reason: String },

    /// Encryption error
    #[error("Encryption error: {reason}")]
    EncryptionError { reason: String },

    /// Failed to write output
    #[error("Failed to write output to '{path}': {reason}")]
    OutputWriteError { path: PathBuf, reason: String },

    /// ZIP creation error
    #[error("ZIP creation error: {reason}")]
    ZipError { reason: String },

    /// XML generation error
    #[error("XML generation error: {reason}")]
    XmlError { reason: String },

    /// Invalid argument
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// User cancelled operation
    #[error("Operation cancelled by user")]
    Cancelled,

    /// MSI file could not be opened or parsed as an OLE compound document
    #[error("Failed to parse MSI '{path}': {reason}")]
    MsiParseError { path: PathBuf, reason: String },

    /// Invalid .intunewin file
    #[error("Invalid .intunewin file '{path}': {reason}")]
    InvalidIntunewinFile { path: PathBuf, reason: String },

    /// Decryption error
    #[error("Decryption error: {reason}")]
    DecryptionError { reason: String },

    /// HMAC verification failed
    #[error("HMAC verification failed - file may be corrupted or tampered")]
    HmacVerificationFailed,

    /// Invalid PKCS7 padding
    #[error("Invalid padding in decrypted data")]
    InvalidPadding,

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PackageError {
    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            PackageError::SourceFolderNotFound { .. } => exit_codes::ERROR,
            PackageError::SourceFolderEmpty { .. } => exit_codes::EMPTY_SOURCE,
            PackageError::SetupFileNotFound { .. } => exit_codes::SETUP_NOT_FOUND,
            PackageError::UnsupportedSetupType { .. } => exit_codes::INVALID_ARGS,
            PackageError::OutputFolderCreationFailed { .. } => exit_codes::OUTPUT_ERROR,
            PackageError::SourceReadError { .. } => exit_codes::ERROR,
            PackageError::EncryptionError { .. } => exit_codes::ERROR,
            PackageError::OutputWriteError { .. } => exit_codes::OUTPUT_ERROR,
            PackageError::ZipError { .. } => exit_codes::ERROR,
            PackageError::XmlError { .. } => exit_codes::ERROR,
            PackageError::InvalidArgument { .. } => exit_codes::INVALID_ARGS,
            PackageError::Cancelled => exit_codes::ERROR,
            PackageError::MsiParseError { .. } => exit_codes::ERROR,
            PackageError::InvalidIntunewinFile { .. } => exit_codes::ERROR,
            PackageError::DecryptionError { .. } => exit_codes::ERROR,
            PackageError::HmacVerificationFailed => exit_codes::ERROR,
            PackageError::InvalidPadding => exit_codes::ERROR,
            PackageError::Io(_) => exit_codes::ERROR,
        }
    }
}
