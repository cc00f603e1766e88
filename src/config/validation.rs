//! Experiment validation.
//!
//! Validation collects every issue rather than stopping at the first, so a
//! user sees all problems with an experiment file at once. It runs in two
//! passes: [`Validator::validate`] checks the declarations before the phase
//! script is compiled, and [`Validator::validate_runs`] checks the runs
//! against the compiled phases.

use std::collections::HashSet;

use crate::config::loader::ConfigLimits;
use crate::config::schema::{ExperimentConfig, ResponderConfig};
use crate::error::{Severity, ValidationIssue};
use crate::phase::PhaseRegistry;
use crate::variables::{is_identifier, is_keyword};

// ============================================================================
// Public API
// ============================================================================

/// Result of validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading)
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational)
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Experiment validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks declarations, variables, the script source and run settings
    /// that do not depend on the compiled phases.
    pub fn validate(&mut self, config: &ExperimentConfig, limits: &ConfigLimits) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_names(config);
        self.validate_variables(config);
        self.validate_script_source(config);
        self.validate_run_settings(config, limits);

        self.take()
    }

    /// Checks that runs name defined phases, and warns about phases no run
    /// uses.
    pub fn validate_runs(
        &mut self,
        config: &ExperimentConfig,
        registry: &PhaseRegistry,
    ) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        let mut used = HashSet::new();
        for (i, run) in config.runs.iter().enumerate() {
            for (j, label) in run.phases.iter().enumerate() {
                if registry.contains(label) {
                    used.insert(label.as_str());
                    continue;
                }
                let hint = registry
                    .suggest(label)
                    .map(|s| format!(" Did you mean '{s}'?"))
                    .unwrap_or_default();
                self.add_error(
                    &format!("runs[{i}].phases[{j}]"),
                    &format!("Unknown phase '{label}'.{hint}"),
                );
            }
        }

        if !config.runs.is_empty() {
            for label in registry.labels().filter(|l| !used.contains(l)) {
                self.add_warning(
                    "script",
                    &format!("Phase '{label}' is not used by any run"),
                );
            }
        }

        self.take()
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    fn validate_names(&mut self, config: &ExperimentConfig) {
        if config.stimulus_elements.is_empty() {
            self.add_error("stimulus_elements", "At least one stimulus element is required");
        }
        if config.behaviors.is_empty() {
            self.add_error("behaviors", "At least one behavior is required");
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let groups = [
            ("stimulus_elements", &config.stimulus_elements),
            ("behaviors", &config.behaviors),
        ];
        for (field, names) in groups {
            for (i, name) in names.iter().enumerate() {
                let path = format!("{field}[{i}]");
                self.check_name(&path, name);
                if !seen.insert(name) {
                    self.add_error(
                        &path,
                        &format!("'{name}' is declared more than once among stimulus elements and behaviors"),
                    );
                }
            }
        }

        for name in config.variables.keys() {
            let path = format!("variables.{name}");
            self.check_name(&path, name);
            if seen.contains(name.as_str()) {
                self.add_error(
                    &path,
                    &format!("Variable '{name}' has the name of a stimulus element or behavior"),
                );
            }
        }
    }

    fn check_name(&mut self, path: &str, name: &str) {
        if !is_identifier(name) {
            self.add_error(path, &format!("'{name}' is not a valid identifier"));
        } else if is_keyword(name) {
            self.add_error(path, &format!("'{name}' is a reserved word"));
        }
    }

    fn validate_variables(&mut self, config: &ExperimentConfig) {
        if let Err((name, err)) = config.global_variables() {
            self.add_error(&format!("variables.{name}"), &err.to_string());
        }
    }

    fn validate_script_source(&mut self, config: &ExperimentConfig) {
        match (&config.script, &config.script_file) {
            (Some(_), Some(_)) => {
                self.add_error("script", "Use either 'script' or 'script_file', not both");
            }
            (None, None) => {
                self.add_error("script", "A phase script is required ('script' or 'script_file')");
            }
            (Some(script), None) if script.trim().is_empty() => {
                self.add_error("script", "Phase script is empty");
            }
            _ => {}
        }
    }

    // ========================================================================
    // Runs
    // ========================================================================

    fn validate_run_settings(&mut self, config: &ExperimentConfig, limits: &ConfigLimits) {
        if config.runs.is_empty() {
            self.add_warning("runs", "No runs defined; the experiment can only be validated");
        }

        let behaviors: HashSet<&str> = config.behaviors.iter().map(String::as_str).collect();
        let mut labels = HashSet::new();

        for (i, run) in config.runs.iter().enumerate() {
            let path = format!("runs[{i}]");
            if run.label.trim().is_empty() {
                self.add_error(&format!("{path}.label"), "Run label cannot be empty");
            } else if !labels.insert(run.label.as_str()) {
                self.add_error(
                    &format!("{path}.label"),
                    &format!("Duplicate run label '{}'", run.label),
                );
            }
            if run.phases.is_empty() {
                self.add_error(&format!("{path}.phases"), "A run needs at least one phase");
            }
            if run.subjects == 0 {
                self.add_error(&format!("{path}.subjects"), "Subject count must be positive");
            } else if run.subjects > limits.max_subjects {
                self.add_error(
                    &format!("{path}.subjects"),
                    &format!("Subject count exceeds the limit of {}", limits.max_subjects),
                );
            }
            if run.max_steps == Some(0) {
                self.add_error(&format!("{path}.max_steps"), "Step limit must be positive");
            }

            self.validate_responder(&format!("{path}.responder"), &run.responder, &behaviors);
        }
    }

    fn validate_responder(
        &mut self,
        path: &str,
        responder: &ResponderConfig,
        behaviors: &HashSet<&str>,
    ) {
        match responder {
            ResponderConfig::Random { weights } => {
                for (behavior, weight) in weights {
                    if !behaviors.contains(behavior.as_str()) {
                        self.add_error(
                            &format!("{path}.weights.{behavior}"),
                            &format!("Unknown behavior '{behavior}'"),
                        );
                    }
                    if !weight.is_finite() || *weight <= 0.0 {
                        self.add_error(
                            &format!("{path}.weights.{behavior}"),
                            "Weight must be a positive number",
                        );
                    }
                }
                if !weights.is_empty() {
                    for behavior in behaviors.iter().filter(|b| !weights.contains_key(**b)) {
                        self.add_warning(
                            &format!("{path}.weights"),
                            &format!("Behavior '{behavior}' has no weight and is never emitted"),
                        );
                    }
                }
            }
            ResponderConfig::Sequence { responses } => {
                if responses.is_empty() {
                    self.add_error(&format!("{path}.responses"), "Response sequence is empty");
                }
                for (i, response) in responses.iter().enumerate() {
                    if !behaviors.contains(response.as_str()) {
                        self.add_error(
                            &format!("{path}.responses[{i}]"),
                            &format!("Unknown behavior '{response}'"),
                        );
                    }
                }
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn take(&mut self) -> ValidationResult {
        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    /// Adds an error to the collection.
    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    /// Adds a warning to the collection.
    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RunConfig, VariableValue};
    use crate::phase::Declarations;
    use crate::script;
    use indexmap::IndexMap;

    fn minimal_config() -> ExperimentConfig {
        ExperimentConfig {
            title: None,
            stimulus_elements: vec!["lever".into(), "reward".into()],
            behaviors: vec!["R".into(), "R0".into()],
            variables: IndexMap::new(),
            script: Some("@phase p stop:reward=1\nA lever | A\n".into()),
            script_file: None,
            runs: vec![make_run("run1", &["p"])],
        }
    }

    fn make_run(label: &str, phases: &[&str]) -> RunConfig {
        RunConfig {
            label: label.into(),
            phases: phases.iter().map(|p| (*p).to_string()).collect(),
            subjects: 2,
            seed: Some(1),
            max_steps: None,
            responder: ResponderConfig::default(),
        }
    }

    fn validate(config: &ExperimentConfig) -> ValidationResult {
        Validator::new().validate(config, &ConfigLimits::default())
    }

    fn has_error_at(result: &ValidationResult, path: &str) -> bool {
        result.errors.iter().any(|e| e.path == path)
    }

    #[test]
    fn test_minimal_config_is_valid() {
        let result = validate(&minimal_config());
        assert!(result.is_valid(), "{:?}", result.errors);
    }

    #[test]
    fn test_names_are_checked() {
        let mut config = minimal_config();
        config.stimulus_elements.push("R".into());
        config.behaviors.push("count".into());
        config.behaviors.push("2x".into());
        let result = validate(&config);
        assert!(has_error_at(&result, "behaviors[0]"));
        assert!(has_error_at(&result, "behaviors[2]"));
        assert!(has_error_at(&result, "behaviors[3]"));
    }

    #[test]
    fn test_variables_are_checked() {
        let mut config = minimal_config();
        config
            .variables
            .insert("lever".into(), VariableValue::Int(1));
        config
            .variables
            .insert("p".into(), VariableValue::Expression("1/0".into()));
        let result = validate(&config);
        assert!(has_error_at(&result, "variables.lever"));
        assert!(has_error_at(&result, "variables.p"));
    }

    #[test]
    fn test_script_source_is_required_once() {
        let mut config = minimal_config();
        config.script = None;
        assert!(has_error_at(&validate(&config), "script"));

        config.script = Some("x".into());
        config.script_file = Some("phases.txt".into());
        assert!(has_error_at(&validate(&config), "script"));
    }

    #[test]
    fn test_run_settings() {
        let mut config = minimal_config();
        config.runs.push(make_run("run1", &[]));
        config.runs[1].subjects = 0;
        config.runs[1].max_steps = Some(0);
        config.runs[1].responder = ResponderConfig::Sequence {
            responses: vec!["R".into(), "jump".into()],
        };
        let result = validate(&config);
        assert!(has_error_at(&result, "runs[1].label"));
        assert!(has_error_at(&result, "runs[1].phases"));
        assert!(has_error_at(&result, "runs[1].subjects"));
        assert!(has_error_at(&result, "runs[1].max_steps"));
        assert!(has_error_at(&result, "runs[1].responder.responses[1]"));
    }

    #[test]
    fn test_random_weights() {
        let mut config = minimal_config();
        let mut weights = IndexMap::new();
        weights.insert("R".to_string(), 1.0);
        weights.insert("jump".to_string(), -1.0);
        config.runs[0].responder = ResponderConfig::Random { weights };
        let result = validate(&config);
        assert_eq!(
            result
                .errors
                .iter()
                .filter(|e| e.path == "runs[0].responder.weights.jump")
                .count(),
            2
        );
        assert!(result.warnings.iter().any(|w| w.message.contains("'R0'")));
    }

    #[test]
    fn test_validate_runs_against_registry() {
        let mut config = minimal_config();
        config.runs = vec![make_run("run1", &["p", "q"])];
        let declarations = Declarations::new(
            config.stimulus_elements.clone(),
            config.behaviors.clone(),
            crate::variables::Variables::new(),
        );
        let registry = script::compile(
            "@phase p stop:reward=1\nA lever | A\n@phase pp stop:reward=1\nA lever | A\n",
            declarations,
        )
        .unwrap();

        let result = Validator::new().validate_runs(&config, &registry);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, "runs[0].phases[1]");
        assert!(result.errors[0].message.contains("Did you mean 'p'?"));
        assert!(result.warnings.iter().any(|w| w.message.contains("'pp'")));
    }
}
