//! Experiment loader.
//!
//! This module implements the loading pipeline:
//! 1. Size check and UTF-8 BOM removal
//! 2. YAML parsing
//! 3. Deserialization to [`ExperimentConfig`]
//! 4. Validation of declarations, variables and run settings
//! 5. Phase script resolution (`script` or `script_file`) and compilation
//! 6. Validation of runs against the compiled phases
//! 7. Freeze with `Arc`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_yaml::Value;

use crate::config::schema::{Experiment, ExperimentConfig, RunPlan};
use crate::config::validation::{ValidationResult, Validator};
use crate::error::ConfigError;
use crate::phase::Declarations;
use crate::script;

// ============================================================================
// Public API
// ============================================================================

/// Options for the experiment loader.
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Size and simulation limits.
    pub config_limits: ConfigLimits,
}

/// Limits that keep a single experiment from exhausting resources.
#[derive(Debug, Clone)]
pub struct ConfigLimits {
    /// Maximum experiment or script file size in bytes.
    pub max_config_size: usize,

    /// Step ceiling for runs that do not set `max_steps`.
    pub max_steps: u64,

    /// Maximum number of subjects per run.
    pub max_subjects: u32,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_config_size: env_or("LESIM_MAX_CONFIG_SIZE", 10 * 1024 * 1024),
            max_steps: env_or("LESIM_MAX_STEPS", 1_000_000),
            max_subjects: env_or("LESIM_MAX_SUBJECTS", 100_000),
        }
    }
}

/// Result of loading an experiment.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated experiment.
    pub experiment: Arc<Experiment>,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during experiment loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Location where the warning occurred.
    pub location: Option<String>,
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} (at {location})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Experiment loader.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: LoaderOptions,
}

impl ConfigLoader {
    /// Creates a new loader with the given options.
    #[must_use]
    pub const fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Creates a new loader with default options.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(LoaderOptions::default())
    }

    /// Loads an experiment file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read or exceeds the size limit
    /// - YAML parsing fails
    /// - Validation fails
    /// - The phase script does not compile
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let content = self.read_limited(path)?;
        self.load_str(&content, path)
    }

    /// Loads an experiment from text. `path` is used in messages and to
    /// resolve `script_file`.
    ///
    /// # Errors
    ///
    /// Same as [`ConfigLoader::load`], minus reading the experiment file.
    pub fn load_str(&self, content: &str, path: &Path) -> Result<LoadResult, ConfigError> {
        let mut warnings = Vec::new();

        // Handle UTF-8 BOM
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        let root: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            line: e.location().map(|l| l.line()),
            message: e.to_string(),
        })?;
        if root.is_null() {
            return Err(ConfigError::ParseError {
                path: path.to_path_buf(),
                line: None,
                message: "Experiment file is empty".to_string(),
            });
        }

        let config: ExperimentConfig =
            serde_yaml::from_value(root).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: format!("Failed to deserialize experiment: {e}"),
            })?;

        let mut validator = Validator::new();
        let result = validator.validate(&config, &self.options.config_limits);
        collect(path, result, &mut warnings)?;

        let globals = config
            .global_variables()
            .map_err(|(name, err)| ConfigError::InvalidValue {
                field: format!("variables.{name}"),
                value: err.to_string(),
                expected: "an expression over earlier variables".to_string(),
            })?;
        let declarations = Declarations::new(
            config.stimulus_elements.iter().cloned(),
            config.behaviors.iter().cloned(),
            globals,
        );

        let (script_path, script_text) = self.resolve_script(&config, path)?;
        let registry =
            script::compile(&script_text, declarations).map_err(|source| ConfigError::Definition {
                path: script_path,
                source,
            })?;

        let result = validator.validate_runs(&config, &registry);
        collect(path, result, &mut warnings)?;

        let runs = config
            .runs
            .into_iter()
            .map(|run| RunPlan {
                label: run.label,
                phases: run.phases,
                subjects: run.subjects,
                seed: run.seed,
                max_steps: run.max_steps.unwrap_or(self.options.config_limits.max_steps),
                responder: run.responder,
            })
            .collect();

        tracing::debug!(
            path = %path.display(),
            phases = registry.len(),
            warnings = warnings.len(),
            "experiment loaded"
        );

        Ok(LoadResult {
            experiment: Arc::new(Experiment {
                title: config.title,
                registry,
                runs,
            }),
            warnings,
        })
    }

    /// Returns the script text and the path its line numbers refer to.
    fn resolve_script(
        &self,
        config: &ExperimentConfig,
        path: &Path,
    ) -> Result<(PathBuf, String), ConfigError> {
        match (&config.script, &config.script_file) {
            (Some(script), _) => Ok((path.to_path_buf(), script.clone())),
            (None, Some(file)) => {
                let resolved = path
                    .parent()
                    .map_or_else(|| file.clone(), |dir| dir.join(file));
                let text = self.read_limited(&resolved)?;
                Ok((resolved, text))
            }
            (None, None) => Err(ConfigError::InvalidValue {
                field: "script".to_string(),
                value: "none".to_string(),
                expected: "a phase script".to_string(),
            }),
        }
    }

    fn read_limited(&self, path: &Path) -> Result<String, ConfigError> {
        let max = self.options.config_limits.max_config_size;
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        let file_size = usize::try_from(metadata.len()).unwrap_or(max);
        if file_size > max {
            return Err(ConfigError::InvalidValue {
                field: "file_size".to_string(),
                value: format!("{file_size} bytes"),
                expected: format!("at most {max} bytes"),
            });
        }

        std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })
    }
}

fn collect(
    path: &Path,
    result: ValidationResult,
    warnings: &mut Vec<LoadWarning>,
) -> Result<(), ConfigError> {
    if result.has_errors() {
        return Err(ConfigError::ValidationError {
            path: path.display().to_string(),
            errors: result.errors,
        });
    }
    warnings.extend(result.warnings.into_iter().map(|issue| LoadWarning {
        message: issue.message,
        location: Some(issue.path),
    }));
    Ok(())
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FIXED_RATIO: &str = r"
stimulus_elements: [lever, reward]
behaviors: [R, R0]
script: |
  @phase fr stop:reward=2
  LEVER  lever  | R=3: REWARD | LEVER
  REWARD reward | LEVER
runs:
  - label: run1
    phases: [fr]
    subjects: 2
";

    fn load(yaml: &str) -> Result<LoadResult, ConfigError> {
        ConfigLoader::with_defaults().load_str(yaml, Path::new("experiment.yaml"))
    }

    #[test]
    fn test_load_inline_script() {
        let result = load(FIXED_RATIO).unwrap();
        let experiment = &result.experiment;
        assert!(experiment.registry.contains("fr"));
        let run = experiment.run("run1").unwrap();
        assert_eq!(run.subjects, 2);
        assert_eq!(run.max_steps, ConfigLimits::default().max_steps);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_bom_is_stripped() {
        let yaml = format!("\u{feff}{FIXED_RATIO}");
        assert!(load(&yaml).is_ok());
    }

    #[test]
    fn test_empty_file() {
        assert!(matches!(
            load(""),
            Err(ConfigError::ParseError { line: None, .. })
        ));
    }

    #[test]
    fn test_yaml_error_has_line() {
        let err = load("stimulus_elements: [lever\nbehaviors: [R]\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { line: Some(_), .. }));
    }

    #[test]
    fn test_definition_error() {
        let yaml = FIXED_RATIO.replace("| LEVER\n  REWARD", "| LEVR\n  REWARD");
        let err = load(&yaml).unwrap_err();
        let ConfigError::Definition { source, .. } = err else {
            panic!("expected a definition error, got {err}");
        };
        assert_eq!(source.lineno, 2);
        assert!(source.to_string().contains("Did you mean 'LEVER'?"));
    }

    #[test]
    fn test_unknown_phase_in_run() {
        let yaml = FIXED_RATIO.replace("phases: [fr]", "phases: [fx]");
        let err = load(&yaml).unwrap_err();
        let ConfigError::ValidationError { errors, .. } = err else {
            panic!("expected a validation error, got {err}");
        };
        assert_eq!(errors[0].path, "runs[0].phases[0]");
    }

    #[test]
    fn test_script_file_relative_to_experiment() {
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("phases.txt");
        std::fs::write(
            &script_path,
            "@phase fr stop:reward=1\nLEVER lever | R: REWARD | LEVER\nREWARD reward | LEVER\n",
        )
        .unwrap();

        let experiment_path = dir.path().join("experiment.yaml");
        let mut file = std::fs::File::create(&experiment_path).unwrap();
        writeln!(
            file,
            "stimulus_elements: [lever, reward]\nbehaviors: [R, R0]\nscript_file: phases.txt\nruns:\n  - {{ label: a, phases: [fr] }}"
        )
        .unwrap();

        let result = ConfigLoader::with_defaults().load(&experiment_path).unwrap();
        assert!(result.experiment.registry.contains("fr"));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::with_defaults()
            .load(Path::new("/nonexistent/experiment.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }

    #[test]
    fn test_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.yaml");
        std::fs::write(&path, FIXED_RATIO).unwrap();

        let loader = ConfigLoader::new(LoaderOptions {
            config_limits: ConfigLimits {
                max_config_size: 10,
                ..ConfigLimits::default()
            },
        });
        assert!(matches!(
            loader.load(&path),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
