//! Experiment file schema.
//!
//! These types are deserialized from YAML experiment files. After loading,
//! the phase script is compiled and the result frozen into an
//! [`Experiment`].

use std::path::PathBuf;

use indexmap::IndexMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::expr::{self, ExprError, Value};
use crate::phase::{Declarations, PhaseRegistry};
use crate::variables::Variables;

// ============================================================================
// Experiment File
// ============================================================================

/// Root of an experiment file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Free-form title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Names of the stimulus elements phases may present
    #[serde(default)]
    pub stimulus_elements: Vec<String>,

    /// Names of the responses a subject can make
    #[serde(default)]
    pub behaviors: Vec<String>,

    /// Global variables, evaluated in order
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, VariableValue>,

    /// Inline phase script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// Phase script file, relative to the experiment file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_file: Option<PathBuf>,

    /// Runs to simulate
    #[serde(default)]
    pub runs: Vec<RunConfig>,
}

impl ExperimentConfig {
    /// Evaluates the global variables in declaration order. Each value may
    /// refer to the variables declared before it.
    ///
    /// # Errors
    ///
    /// Returns the name of the first variable that fails, with the reason.
    pub fn global_variables(&self) -> Result<Variables, (String, ExprError)> {
        let mut variables = Variables::new();
        // rand() in a variable is drawn once, reproducibly
        let mut rng = StdRng::seed_from_u64(0);
        for (name, value) in &self.variables {
            let value = match value {
                VariableValue::Bool(b) => Value::Bool(*b),
                VariableValue::Int(i) => Value::Int(*i),
                VariableValue::Float(x) => Value::Float(*x),
                VariableValue::Expression(text) => expr::evaluate(text, &variables, &mut rng)
                    .map_err(|e| (name.clone(), e))?,
            };
            variables.set(name.clone(), value);
        }
        Ok(variables)
    }
}

/// Value of a global variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    /// `true` / `false`
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// Expression over earlier variables, e.g. `"1/n"`
    Expression(String),
}

// ============================================================================
// Runs
// ============================================================================

/// One simulated run: a phase sequence applied to a group of subjects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct RunConfig {
    /// Run label
    pub label: String,

    /// Phase labels, in the order subjects go through them
    pub phases: Vec<String>,

    /// Number of subjects
    #[serde(default = "default_subjects")]
    pub subjects: u32,

    /// Base seed; subject `i` uses `seed + i`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Step ceiling per subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,

    /// How subjects respond
    #[serde(default)]
    pub responder: ResponderConfig,
}

const fn default_subjects() -> u32 {
    1
}

/// Stand-in for a learning mechanism: how a subject picks its response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ResponderConfig {
    /// Weighted random choice; behaviors without a weight are never chosen.
    /// No weights at all means every behavior is equally likely.
    Random {
        /// Behavior → relative weight
        #[serde(default)]
        weights: IndexMap<String, f64>,
    },
    /// Cycles through a fixed list of responses
    Sequence {
        /// Responses, repeated from the start when exhausted
        responses: Vec<String>,
    },
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self::Random {
            weights: IndexMap::new(),
        }
    }
}

// ============================================================================
// Frozen Experiment
// ============================================================================

/// A loaded, validated experiment.
#[derive(Debug, Clone)]
pub struct Experiment {
    /// Title from the experiment file
    pub title: Option<String>,
    /// Compiled phases
    pub registry: PhaseRegistry,
    /// Runs, in file order
    pub runs: Vec<RunPlan>,
}

impl Experiment {
    /// The run labeled `label`.
    #[must_use]
    pub fn run(&self, label: &str) -> Option<&RunPlan> {
        self.runs.iter().find(|run| run.label == label)
    }

    #[must_use]
    pub fn declarations(&self) -> &Declarations {
        self.registry.declarations()
    }
}

/// A run ready to simulate.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    /// Run label
    pub label: String,
    /// Phase labels in order
    pub phases: Vec<String>,
    /// Number of subjects
    pub subjects: u32,
    /// Base seed; `None` draws one from the operating system
    pub seed: Option<u64>,
    /// Step ceiling per subject
    pub max_steps: u64,
    /// Responder settings
    pub responder: ResponderConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_experiment() {
        let yaml = r#"
title: Fixed ratio
stimulus_elements: [lever, reward]
behaviors: [R, R0]
variables:
  n: 4
  p: "1/n"
  on: true
script: |
  @phase fr stop:reward=3
  LEVER lever | R=n: REWARD | LEVER
  REWARD reward | LEVER
runs:
  - label: run1
    phases: [fr]
    subjects: 3
    seed: 7
    responder: { kind: sequence, responses: [R] }
  - label: run2
    phases: [fr]
"#;
        let config: ExperimentConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.title.as_deref(), Some("Fixed ratio"));
        assert_eq!(config.variables["n"], VariableValue::Int(4));
        assert_eq!(config.variables["p"], VariableValue::Expression("1/n".into()));
        assert_eq!(config.variables["on"], VariableValue::Bool(true));
        assert_eq!(config.runs[0].subjects, 3);
        assert_eq!(
            config.runs[0].responder,
            ResponderConfig::Sequence {
                responses: vec!["R".into()]
            }
        );
        assert_eq!(config.runs[1].subjects, 1);
        assert_eq!(config.runs[1].responder, ResponderConfig::default());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = "behaviours: [R]\n";
        assert!(serde_yaml::from_str::<ExperimentConfig>(yaml).is_err());
    }

    #[test]
    fn test_global_variables_in_order() {
        let mut config = ExperimentConfig::default();
        config.variables.insert("n".into(), VariableValue::Int(4));
        config
            .variables
            .insert("p".into(), VariableValue::Expression("1/n".into()));
        let vars = config.global_variables().unwrap();
        assert_eq!(vars.get("p"), Some(Value::Float(0.25)));

        config
            .variables
            .insert("q".into(), VariableValue::Expression("z*2".into()));
        let (name, err) = config.global_variables().unwrap_err();
        assert_eq!(name, "q");
        assert_eq!(err, ExprError::UnknownVariable("z".into()));
    }
}
