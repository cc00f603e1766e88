//! `validate` command: load experiment files without simulating them.

use serde_json::json;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::loader::ConfigLoader;
use crate::error::{ConfigError, LesimError, Severity, ValidationIssue};

/// Validates each experiment file in turn.
///
/// # Errors
///
/// Returns the first file's load error, or, with `--strict`, a validation
/// error listing the warnings of the first file that has any.
#[allow(clippy::unused_async)] // dispatched alongside the async `run`
pub async fn validate(args: &ValidateArgs) -> Result<(), LesimError> {
    let loader = ConfigLoader::with_defaults();
    let mut results = Vec::with_capacity(args.files.len());

    for path in &args.files {
        tracing::info!(file = %path.display(), "validating experiment");
        let load_result = loader.load(path)?;

        for warning in &load_result.warnings {
            tracing::warn!(
                location = warning.location.as_deref().unwrap_or("<unknown>"),
                "{}",
                warning.message
            );
        }
        if args.strict && !load_result.warnings.is_empty() {
            return Err(ConfigError::ValidationError {
                path: path.display().to_string(),
                errors: load_result
                    .warnings
                    .iter()
                    .map(|w| ValidationIssue {
                        path: w.location.clone().unwrap_or_default(),
                        message: w.message.clone(),
                        severity: Severity::Warning,
                    })
                    .collect(),
            }
            .into());
        }

        let experiment = &load_result.experiment;
        let phases: Vec<_> = experiment.registry.labels().collect();
        let runs: Vec<_> = experiment.runs.iter().map(|r| r.label.as_str()).collect();
        match args.format {
            OutputFormat::Human => {
                println!(
                    "{}: ok ({} phases, {} runs)",
                    path.display(),
                    phases.len(),
                    runs.len()
                );
                for warning in &load_result.warnings {
                    println!("  warning: {warning}");
                }
            }
            OutputFormat::Json => results.push(json!({
                "file": path.display().to_string(),
                "valid": true,
                "phases": phases,
                "runs": runs,
                "warnings": load_result
                    .warnings
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
            })),
        }
        tracing::info!(file = %path.display(), "experiment valid");
    }

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}
