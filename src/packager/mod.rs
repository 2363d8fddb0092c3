//! Package creation pipeline.
//!
//! A synchronous, single-threaded pipeline: validate, probe MSI metadata,
//! compress, encrypt, serialize the descriptor, assemble the container,
//! write the output. Every intermediate lives in memory, so a failing stage
//! never leaves a partial output file behind.

pub mod archive;
pub mod encrypt;
pub mod metadata;
pub mod msi;

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::time::Instant;

use zip::read::ZipArchive;

use crate::models::detection::DetectionMetadata;
use crate::models::error::{PackageError, PackageResult};
use crate::models::msi::MsiInfo;
use crate::models::package::{PackageOutcome, PackageRequest, UnpackResult};

use self::encrypt::{create_encryption_info, decrypt_content};
use self::metadata::{generate_detection_xml, parse_detection_xml};

/// Progress callback: receives a step label and an overall fraction in 0..=1.
///
/// Invoked synchronously from within the running stage; callers must not
/// block in it.
pub type ProgressFn<'a> = &'a dyn Fn(&str, f64);

/// Create an IntuneWin package from the given request.
pub fn package(request: &PackageRequest) -> PackageResult<PackageOutcome> {
    package_with_progress(request, None)
}

/// Create an IntuneWin package, reporting progress through `progress`.
pub fn package_with_progress(
    request: &PackageRequest,
    progress: Option<ProgressFn>,
) -> PackageResult<PackageOutcome> {
    let start_time = Instant::now();

    let report = |step: &str, fraction: f64| {
        if let Some(callback) = progress {
            callback(step, fraction);
        }
    };

    report("Validating inputs", 0.05);
    request.validate()?;

    let source_size = archive::folder_size(&request.source_folder)?;
    let file_count = archive::count_files(&request.source_folder)?;

    report("Checking for MSI metadata", 0.10);
    let msi_info = extract_msi_metadata(request);

    report("Compressing files", 0.15);
    let compress_progress = |file: &str, fraction: f64| {
        // Rescale compressor progress into the 15%..40% band
        report(&format!("Compressing: {}", file), 0.15 + fraction * 0.25);
    };
    let zip_data = archive::zip_folder(&request.source_folder, Some(&compress_progress))?;
    let zip_size = zip_data.len() as u64;

    report("Encrypting content", 0.45);
    let (encryption_info, encrypted_data) = create_encryption_info(&zip_data)?;
    let encrypted_size = encrypted_data.len() as u64;
    report("Encryption complete", 0.70);

    report("Generating metadata", 0.75);
    let mut detection = DetectionMetadata::new(request.setup_file.clone(), zip_size, msi_info);
    detection.encryption_info = encryption_info;
    let detection_xml = generate_detection_xml(&detection)?;

    report("Creating package", 0.85);
    let package_data =
        archive::create_intunewin_package(&encrypted_data, detection_xml.as_bytes())?;
    let final_size = package_data.len() as u64;

    report("Writing output file", 0.95);
    if !request.output_folder.exists() {
        fs::create_dir_all(&request.output_folder).map_err(|e| {
            PackageError::OutputFolderCreationFailed {
                path: request.output_folder.clone(),
                reason: e.to_string(),
            }
        })?;
    }

    let output_path = request.output_path();
    fs::write(&output_path, &package_data).map_err(|e| PackageError::OutputWriteError {
        path: output_path.clone(),
        reason: e.to_string(),
    })?;

    report("Complete", 1.0);

    Ok(PackageOutcome {
        output_path,
        source_size,
        zip_size,
        encrypted_size,
        final_size,
        file_count,
        creation_time: start_time.elapsed(),
    })
}

/// Probe the setup file for MSI metadata.
///
/// Extraction failure is deliberately non-fatal: the package is still valid
/// without product identifiers, so the error is reported as a warning and
/// packaging continues.
fn extract_msi_metadata(request: &PackageRequest) -> Option<MsiInfo> {
    if !msi::is_msi_file(&request.setup_file) {
        return None;
    }

    let setup_path = request.source_folder.join(&request.setup_file);
    match msi::extract_msi_info(&setup_path) {
        Ok(info) => Some(info),
        Err(e) => {
            eprintln!("Warning: Could not extract MSI metadata: {}", e);
            None
        }
    }
}

/// Format a byte count with binary prefixes and two decimals.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    match bytes {
        b if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.2} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.2} KB", b as f64 / KB as f64),
        b => format!("{} bytes", b),
    }
}

/// Unpack an IntuneWin package (verification helper).
///
/// Decrypts the inner content with the keys carried in Detection.xml and
/// extracts the recovered ZIP into `output_folder`. Exercised by the
/// round-trip tests; not part of the CLI surface.
pub fn unpack_package(input_file: &Path, output_folder: &Path) -> PackageResult<UnpackResult> {
    if !output_folder.exists() {
        fs::create_dir_all(output_folder).map_err(|e| {
            PackageError::OutputFolderCreationFailed {
                path: output_folder.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
    }

    let file = File::open(input_file).map_err(|e| PackageError::InvalidIntunewinFile {
        path: input_file.to_path_buf(),
        reason: format!("Failed to open file: {}", e),
    })?;

    let mut outer =
        ZipArchive::new(BufReader::new(file)).map_err(|e| PackageError::InvalidIntunewinFile {
            path: input_file.to_path_buf(),
            reason: format!("Invalid ZIP archive: {}", e),
        })?;

    let detection = read_detection_metadata(&mut outer, input_file)?;
    let encrypted_content = read_encrypted_content(&mut outer, input_file)?;

    let decrypted = decrypt_content(&encrypted_content, &detection.encryption_info)?;

    let (file_count, total_size) = extract_inner_zip(&decrypted, output_folder)?;

    Ok(UnpackResult {
        output_folder: output_folder.to_path_buf(),
        file_count,
        total_size,
        setup_file: detection.setup_file,
    })
}

fn read_detection_metadata<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    input_path: &Path,
) -> PackageResult<DetectionMetadata> {
    let mut detection_file = archive
        .by_name("IntuneWinPackage/Metadata/Detection.xml")
        .map_err(|e| PackageError::InvalidIntunewinFile {
            path: input_path.to_path_buf(),
            reason: format!("Missing Detection.xml: {}", e),
        })?;

    let mut xml_content = String::new();
    detection_file
        .read_to_string(&mut xml_content)
        .map_err(|e| PackageError::InvalidIntunewinFile {
            path: input_path.to_path_buf(),
            reason: format!("Failed to read Detection.xml: {}", e),
        })?;

    parse_detection_xml(&xml_content)
}

fn read_encrypted_content<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    input_path: &Path,
) -> PackageResult<Vec<u8>> {
    let mut content_file = archive
        .by_name("IntuneWinPackage/Contents/IntunePackage.intunewin")
        .map_err(|e| PackageError::InvalidIntunewinFile {
            path: input_path.to_path_buf(),
            reason: format!("Missing encrypted content: {}", e),
        })?;

    let mut encrypted_content = Vec::new();
    content_file
        .read_to_end(&mut encrypted_content)
        .map_err(|e| PackageError::InvalidIntunewinFile {
            path: input_path.to_path_buf(),
            reason: format!("Failed to read encrypted content: {}", e),
        })?;

    Ok(encrypted_content)
}

fn extract_inner_zip(
    decrypted_content: &[u8],
    output_folder: &Path,
) -> PackageResult<(usize, u64)> {
    let cursor = std::io::Cursor::new(decrypted_content);
    let mut archive = ZipArchive::new(cursor).map_err(|e| PackageError::DecryptionError {
        reason: format!("Decrypted content is not a valid ZIP: {}", e),
    })?;

    let mut file_count = 0;
    let mut total_size = 0u64;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| PackageError::ZipError {
            reason: format!("Failed to read file from archive: {}", e),
        })?;

        let file_name = file.name().to_string();

        // Skip directories
        if file_name.ends_with('/') {
            continue;
        }

        let output_path = output_folder.join(&file_name);

        if let Some(parent) = output_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    PackageError::OutputFolderCreationFailed {
                        path: parent.to_path_buf(),
                        reason: e.to_string(),
                    }
                })?;
            }
        }

        let mut outfile =
            File::create(&output_path).map_err(|e| PackageError::OutputWriteError {
                path: output_path.clone(),
                reason: e.to_string(),
            })?;

        let bytes_written =
            std::io::copy(&mut file, &mut outfile).map_err(|e| PackageError::OutputWriteError {
                path: output_path.clone(),
                reason: e.to_string(),
            })?;

        file_count += 1;
        total_size += bytes_written;
    }

    Ok((file_count, total_size))
}
