//! Inner ZIP compression and outer container assembly.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use time::OffsetDateTime;
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::FileOptions;

use crate::models::error::{PackageError, PackageResult};

/// Compress a folder into an in-memory ZIP archive.
///
/// Entries are named relative to `source_folder` with forward slashes on
/// every platform; directories become empty entries ending in `/` and files
/// are Deflate-compressed with their on-disk modification time. The walk is
/// sorted by file name so progress fractions never go backwards.
///
/// When a progress callback is given, a first pass counts the files and the
/// callback receives `(relative_path, files_done / total)` before each file,
/// plus `("complete", 1.0)` at the end.
pub fn zip_folder(
    source_folder: &Path,
    progress: Option<&dyn Fn(&str, f64)>,
) -> PackageResult<Vec<u8>> {
    if !source_folder.is_dir() {
        return Err(PackageError::SourceFolderNotFound {
            path: source_folder.to_path_buf(),
        });
    }

    let total_files = if progress.is_some() {
        count_files(source_folder)?
    } else {
        0
    };

    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(io::Cursor::new(&mut buffer));
        let mut processed_files = 0usize;

        for entry in WalkDir::new(source_folder)
            .min_depth(1)
            .follow_links(true)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        {
            let entry = entry.map_err(|e| PackageError::SourceReadError {
                path: e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| source_folder.to_path_buf()),
                reason: e.to_string(),
            })?;

            let full_path = entry.path();

            let relative_path = full_path.strip_prefix(source_folder).map_err(|_| {
                PackageError::SourceReadError {
                    path: full_path.to_path_buf(),
                    reason: "Failed to compute relative path".to_string(),
                }
            })?;

            // Use forward slashes for ZIP paths (cross-platform)
            let zip_path = relative_path.to_string_lossy().replace('\\', "/");

            if entry.file_type().is_dir() {
                zip.add_directory(zip_path.as_str(), FileOptions::default())
                    .map_err(|e| PackageError::ZipError {
                        reason: e.to_string(),
                    })?;
                continue;
            }

            if let Some(callback) = progress {
                let fraction = if total_files > 0 {
                    processed_files as f64 / total_files as f64
                } else {
                    0.0
                };
                callback(&zip_path, fraction);
            }

            let metadata = entry.metadata().map_err(|e| PackageError::SourceReadError {
                path: full_path.to_path_buf(),
                reason: e.to_string(),
            })?;

            let options = FileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .last_modified_time(entry_timestamp(&metadata))
                .large_file(metadata.len() >= u32::MAX as u64);

            zip.start_file(zip_path.as_str(), options)
                .map_err(|e| PackageError::ZipError {
                    reason: e.to_string(),
                })?;

            // Stream the file so descriptor use stays bounded by tree depth
            let mut file = File::open(full_path).map_err(|e| PackageError::SourceReadError {
                path: full_path.to_path_buf(),
                reason: e.to_string(),
            })?;
            io::copy(&mut file, &mut zip).map_err(|e| PackageError::SourceReadError {
                path: full_path.to_path_buf(),
                reason: e.to_string(),
            })?;

            processed_files += 1;
        }

        if let Some(callback) = progress {
            callback("complete", 1.0);
        }

        zip.finish().map_err(|e| PackageError::ZipError {
            reason: e.to_string(),
        })?;
    }

    Ok(buffer)
}

/// Assemble the final .intunewin container.
///
/// The outer archive holds exactly two entries, both with the Store method.
/// Intune rejects packages whose outer archive is compressed, so Store is an
/// interoperability requirement here, not a choice.
pub fn create_intunewin_package(
    encrypted_content: &[u8],
    detection_xml: &[u8],
) -> PackageResult<Vec<u8>> {
    let stamp = zip::DateTime::try_from(OffsetDateTime::now_utc()).unwrap_or_default();

    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(io::Cursor::new(&mut buffer));
        let options = FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .last_modified_time(stamp)
            .large_file(encrypted_content.len() >= u32::MAX as usize);

        // Encrypted content first (matches Microsoft file order)
        zip.start_file("IntuneWinPackage/Contents/IntunePackage.intunewin", options)
            .map_err(|e| PackageError::ZipError {
                reason: e.to_string(),
            })?;
        io::Write::write_all(&mut zip, encrypted_content).map_err(|e| PackageError::ZipError {
            reason: e.to_string(),
        })?;

        let options = FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .last_modified_time(stamp);

        zip.start_file("IntuneWinPackage/Metadata/Detection.xml", options)
            .map_err(|e| PackageError::ZipError {
                reason: e.to_string(),
            })?;
        io::Write::write_all(&mut zip, detection_xml).map_err(|e| PackageError::ZipError {
            reason: e.to_string(),
        })?;

        zip.finish().map_err(|e| PackageError::ZipError {
            reason: e.to_string(),
        })?;
    }

    Ok(buffer)
}

/// Total size in bytes of all regular files under `path`.
pub fn folder_size(path: &Path) -> PackageResult<u64> {
    let mut size = 0u64;
    for entry in WalkDir::new(path).follow_links(true) {
        let entry = entry.map_err(|e| PackageError::Io(io::Error::from(e)))?;
        if entry.file_type().is_file() {
            size += entry
                .metadata()
                .map_err(|e| PackageError::SourceReadError {
                    path: entry.path().to_path_buf(),
                    reason: e.to_string(),
                })?
                .len();
        }
    }
    Ok(size)
}

/// Number of regular files under `path`, recursively.
pub fn count_files(path: &Path) -> PackageResult<usize> {
    let mut count = 0usize;
    for entry in WalkDir::new(path).follow_links(true) {
        let entry = entry.map_err(|e| PackageError::Io(io::Error::from(e)))?;
        if entry.file_type().is_file() {
            count += 1;
        }
    }
    Ok(count)
}

fn entry_timestamp(metadata: &fs::Metadata) -> zip::DateTime {
    metadata
        .modified()
        .ok()
        .and_then(|mtime| zip::DateTime::try_from(OffsetDateTime::from(mtime)).ok())
        .unwrap_or_default()
}
