//! `raffler validate`
//!
//! Loads each file through the normal pipeline (without environment
//! overrides) and reports every issue found.

use std::path::Path;

use serde::Serialize;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::loader::{ConfigLoader, LoaderOptions};
use crate::error::{ConfigError, RafflerError};

#[derive(Debug, Serialize)]
struct FileReport {
    file: String,
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

/// Validate configuration files.
///
/// # Errors
///
/// Returns `ConfigError::ValidationFailed` if any file has errors (or,
/// with `--strict`, warnings).
pub fn run(args: &ValidateArgs) -> Result<(), RafflerError> {
    let loader = ConfigLoader::new(LoaderOptions {
        ignore_env: true,
        ..LoaderOptions::default()
    });

    let reports: Vec<FileReport> = args
        .files
        .iter()
        .map(|path| check(&loader, path, args.strict))
        .collect();

    match args.format {
        OutputFormat::Human => {
            for report in &reports {
                let verdict = if report.valid { "ok" } else { "FAILED" };
                println!("{}: {verdict}", report.file);
                for e in &report.errors {
                    println!("  {e}");
                }
                for w in &report.warnings {
                    println!("  warning: {w}");
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
    }

    let failed = reports.iter().filter(|r| !r.valid).count();
    if failed > 0 {
        return Err(ConfigError::ValidationFailed { count: failed }.into());
    }
    Ok(())
}

fn check(loader: &ConfigLoader, path: &Path, strict: bool) -> FileReport {
    tracing::info!(file = %path.display(), "validating configuration");
    let file = path.display().to_string();

    match loader.load(path) {
        Ok(result) => {
            let warnings: Vec<String> = result
                .warnings
                .iter()
                .map(|w| match &w.location {
                    Some(at) => format!("{} at {at}", w.message),
                    None => w.message.clone(),
                })
                .collect();
            FileReport {
                file,
                valid: !(strict && !warnings.is_empty()),
                errors: Vec::new(),
                warnings,
            }
        }
        Err(ConfigError::ValidationError { errors, .. }) => FileReport {
            file,
            valid: false,
            errors: errors.iter().map(ToString::to_string).collect(),
            warnings: Vec::new(),
        },
        Err(e) => FileReport {
            file,
            valid: false,
            errors: vec![e.to_string()],
            warnings: Vec::new(),
        },
    }
}
