//! Command-line interface module.

pub mod args;
pub mod interactive;

use std::process::ExitCode;

use indicatif::{ProgressBar, ProgressStyle};

use crate::models::error::{PackageResult, exit_codes};
use crate::models::package::{PackageOutcome, PackageRequest, Verbosity};
use crate::packager::{format_size, package, package_with_progress};

use self::args::CliArgs;
use self::interactive::run_interactive;

/// Run the CLI application.
pub fn run(args: CliArgs) -> ExitCode {
    if args.version {
        println!("intunepack {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::from(exit_codes::SUCCESS as u8);
    }

    let result = if args.needs_interactive() {
        run_interactive(&args).and_then(|request| run_package(&request))
    } else {
        args.to_package_request()
            .and_then(|request| run_package(&request))
    };

    match result {
        Ok(_) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Run the packaging pipeline with output appropriate to the verbosity.
fn run_package(request: &PackageRequest) -> PackageResult<PackageOutcome> {
    match request.verbosity {
        Verbosity::Quiet => {
            let outcome = package(request)?;
            println!("{}", outcome.output_path.display());
            Ok(outcome)
        }
        Verbosity::Normal => {
            println!("intunepack v{}\n", env!("CARGO_PKG_VERSION"));
            println!("Source folder: {}", request.source_folder.display());
            println!("Setup file: {}", request.setup_file);
            println!("Output folder: {}", request.output_folder.display());
            println!();

            let outcome = run_package_with_bar(request)?;
            print_summary(&outcome);
            Ok(outcome)
        }
    }
}

/// Drive the pipeline through an indicatif bar.
///
/// The core reports `(step, fraction)` through a plain callback; the bar is
/// owned entirely by this adapter.
fn run_package_with_bar(request: &PackageRequest) -> PackageResult<PackageOutcome> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let callback = |step: &str, fraction: f64| {
        bar.set_position((fraction * 100.0).round() as u64);
        bar.set_message(step.to_string());
    };

    let result = package_with_progress(request, Some(&callback));

    match &result {
        Ok(_) => bar.finish_with_message("Done!"),
        Err(_) => bar.abandon(),
    }

    result
}

fn print_summary(outcome: &PackageOutcome) {
    println!("\nPackage created successfully:");
    println!(
        "  {} ({})",
        outcome.output_path.display(),
        format_size(outcome.final_size)
    );
    println!(
        "  {} files, {} source, {} compressed, {} encrypted",
        outcome.file_count,
        format_size(outcome.source_size),
        format_size(outcome.zip_size),
        format_size(outcome.encrypted_size)
    );
    println!(
        "  Creation time: {:.2}s",
        outcome.creation_time.as_secs_f64()
    );
}
