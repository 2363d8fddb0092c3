//! Interactive mode prompts.
//!
//! Flag values given on the command line pre-populate the corresponding
//! prompt defaults, so partial invocations only ask for what is missing.

use std::fs;
use std::path::{Path, PathBuf};

use dialoguer::{Confirm, Input, Select};

use crate::cli::args::CliArgs;
use crate::models::error::{PackageError, PackageResult};
use crate::models::package::{PackageRequest, Verbosity};

/// Run interactive mode for package creation.
pub fn run_interactive(args: &CliArgs) -> PackageResult<PackageRequest> {
    println!("intunepack v{}", env!("CARGO_PKG_VERSION"));
    println!("Interactive Mode\n");

    let source_folder = prompt_source_folder(args.content_folder.as_deref())?;
    let setup_file = prompt_setup_file(&source_folder, args.setup_file.as_deref())?;
    let output_folder = prompt_output_folder(args.output_folder.as_deref())?;

    let request = PackageRequest::new(
        source_folder.clone(),
        setup_file.clone(),
        output_folder.clone(),
    )
    .with_verbosity(Verbosity::Normal);
    let output_path = request.output_path();

    if output_path.exists() {
        let overwrite = Confirm::new()
            .with_prompt(format!(
                "Output file {} already exists. Overwrite?",
                output_path.display()
            ))
            .default(false)
            .interact()
            .map_err(|e| PackageError::Io(std::io::Error::other(e)))?;

        if !overwrite {
            return Err(PackageError::Cancelled);
        }
    }

    // Show summary and confirm
    println!("\nPackage Summary:");
    println!("  Source folder: {}", source_folder.display());
    println!("  Setup file: {}", setup_file);
    println!("  Output: {}", output_path.display());

    let proceed = Confirm::new()
        .with_prompt("Proceed with packaging?")
        .default(true)
        .interact()
        .map_err(|e| PackageError::Io(std::io::Error::other(e)))?;

    if !proceed {
        return Err(PackageError::Cancelled);
    }

    println!();

    Ok(request)
}

fn prompt_source_folder(preset: Option<&Path>) -> PackageResult<PathBuf> {
    if let Some(path) = preset {
        if path.is_dir() {
            println!("Source folder: {}", path.display());
            return Ok(path.to_path_buf());
        }
        eprintln!("Error: Folder does not exist: {}", path.display());
    }

    loop {
        let input: String = Input::new()
            .with_prompt("Source folder path")
            .interact_text()
            .map_err(|e| PackageError::Io(std::io::Error::other(e)))?;

        let path = PathBuf::from(input.trim());

        if !path.exists() {
            eprintln!("Error: Folder does not exist: {}", path.display());
            continue;
        }

        if !path.is_dir() {
            eprintln!("Error: Path is not a directory: {}", path.display());
            continue;
        }

        return Ok(path);
    }
}

fn prompt_setup_file(source_folder: &Path, preset: Option<&str>) -> PackageResult<String> {
    // List files in the source folder (non-recursive, just top level)
    let mut files: Vec<String> = fs::read_dir(source_folder)
        .map_err(|e| PackageError::SourceReadError {
            path: source_folder.to_path_buf(),
            reason: e.to_string(),
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();

    if files.is_empty() {
        return Err(PackageError::SourceFolderEmpty {
            path: source_folder.to_path_buf(),
        });
    }

    files.sort();

    let default = preset
        .and_then(|name| files.iter().position(|f| f.as_str() == name))
        .unwrap_or(0);

    let selection = Select::new()
        .with_prompt("Select setup file")
        .items(&files)
        .default(default)
        .interact()
        .map_err(|e| PackageError::Io(std::io::Error::other(e)))?;

    Ok(files[selection].clone())
}

fn prompt_output_folder(preset: Option<&Path>) -> PackageResult<PathBuf> {
    loop {
        let mut prompt = Input::<String>::new().with_prompt("Output folder path");
        if let Some(path) = preset {
            prompt = prompt.default(path.display().to_string());
        }

        let input: String = prompt
            .interact_text()
            .map_err(|e| PackageError::Io(std::io::Error::other(e)))?;

        let path = PathBuf::from(input.trim());

        // Output folder can be created if it doesn't exist
        if path.exists() && !path.is_dir() {
            eprintln!(
                "Error: Path exists but is not a directory: {}",
                path.display()
            );
            continue;
        }

        return Ok(path);
    }
}
