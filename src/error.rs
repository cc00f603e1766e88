//! Error types for `lesim`.
//!
//! Definition errors are raised while a phase script is compiled and abort
//! the whole experiment. Phase errors are raised while a subject is being
//! simulated and abort only that subject.

use std::path::PathBuf;
use thiserror::Error;

use crate::expr::ExprError;
use crate::phase::counter::UnknownEvent;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `lesim` CLI operations.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// Internal failure (a worker panicked, or the interpreter reached a
    /// state validation should rule out)
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure, phase script error)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// At least one subject failed during simulation
    pub const SIMULATION_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `lesim` operations.
#[derive(Debug, Error)]
pub enum LesimError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Phase script compilation error
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// Phase execution error
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// Simulation driver error
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    /// Invalid command-line usage
    #[error("usage error: {0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl LesimError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Definition(_) | Self::Json(_) | Self::Yaml(_) => {
                ExitCode::CONFIG_ERROR
            }
            Self::Simulation(SimulationError::Cancelled) => ExitCode::INTERRUPTED,
            Self::Simulation(SimulationError::Worker(_)) => ExitCode::ERROR,
            Self::Phase(e) | Self::Simulation(SimulationError::Phase(e)) if e.is_internal() => {
                ExitCode::ERROR
            }
            Self::Phase(_) | Self::Simulation(_) => ExitCode::SIMULATION_ERROR,
            Self::Usage(_) => ExitCode::USAGE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Experiment file loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the experiment file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Experiment validation failed
    #[error("validation failed for {path}: {}", summarize(.errors))]
    ValidationError {
        /// Path to the experiment file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// The phase script failed to compile
    #[error("phase script error in {path}: {source}")]
    Definition {
        /// Path to the experiment file
        path: PathBuf,
        /// The underlying definition error
        #[source]
        source: DefinitionError,
    },
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during experiment validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "runs[0].phases[1]")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error - validation failure that prevents the experiment from being used
    Error,
    /// Warning - potential issue that does not prevent loading
    Warning,
}

// ============================================================================
// Definition Errors
// ============================================================================

/// A phase script compilation error, tied to a script line.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Error on line {lineno}: {kind}")]
pub struct DefinitionError {
    /// 1-based line number in the phase script
    pub lineno: usize,
    /// What went wrong
    pub kind: DefinitionErrorKind,
}

impl DefinitionError {
    /// Creates a definition error for the given script line.
    #[must_use]
    pub const fn new(lineno: usize, kind: DefinitionErrorKind) -> Self {
        Self { lineno, kind }
    }
}

/// The rule a phase script line violated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionErrorKind {
    // ---- phase blocks ------------------------------------------------------
    /// `@phase` header is malformed
    #[error("@PHASE line must have the form '@PHASE label stop:condition'.")]
    PhaseHeader,

    /// Stop condition part of a `@phase` header is malformed
    #[error("Phase stop condition must have the form 'stop:condition'.")]
    StopConditionForm,

    /// Phase label is not an identifier
    #[error("Phase label '{0}' is not a valid identifier.")]
    PhaseLabelNotIdentifier(String),

    /// Inherited phase is not defined (earlier in the script)
    #[error("Invalid phase label '{0}'.")]
    UnknownParentPhase(String),

    /// Phase label used twice
    #[error("Redefinition of phase '{0}'.")]
    PhaseRedefinition(String),

    /// Phase block has no lines
    #[error("Phase '{0}' has no phase lines.")]
    EmptyPhase(String),

    /// Phase line before the first `@phase` header
    #[error("Phase line found outside of a @PHASE block.")]
    LineOutsidePhase,

    // ---- line structure ----------------------------------------------------
    /// Line has a label but nothing else
    #[error("Phase line contains only label.")]
    OnlyLabel,

    /// Line label used twice in the same phase
    #[error("Duplicate of phase line label '{0}'.")]
    DuplicateLabel(String),

    /// Line label collides with a stimulus element
    #[error("The phase line label '{0}' coincides with the name of a stimulus element.")]
    LabelIsStimulusElement(String),

    /// Line label collides with a behavior
    #[error("The phase line label '{0}' coincides with the name of a behavior.")]
    LabelIsBehavior(String),

    /// No `|` separating the stimulus from the conditions
    #[error("Missing separator '|' on phase line.")]
    MissingSeparator,

    /// Nothing after the `|`
    #[error("Line with label '{0}' has no conditions.")]
    NoConditions(String),

    // ---- stimulus / help line head -----------------------------------------
    /// Single head token that is neither a stimulus element nor an action
    #[error("Unknown stimulus element or action '{0}'.")]
    UnknownStimulusOrAction(String),

    /// Compound stimulus with an undeclared element
    #[error("Expected a stimulus element, got '{0}'.")]
    ExpectedStimulusElement(String),

    /// Compound stimulus naming the same element twice
    #[error("Stimulus element '{0}' occurs more than once.")]
    DuplicateStimulusElement(String),

    /// Intensity that can never be a number
    #[error("Invalid intensity '{intensity}' for stimulus element '{element}'.")]
    InvalidIntensity {
        /// Stimulus element
        element: String,
        /// Offending intensity text
        intensity: String,
    },

    // ---- branches ----------------------------------------------------------
    /// More than one predicate in a single branch
    #[error("Condition '{0}' has more than one predicate.")]
    MultiplePredicates(String),

    /// Predicate found after a destination label
    #[error("Condition '{0}' must come before the line label(s).")]
    ConditionAfterLabel(String),

    /// Action found after a destination label
    #[error("Action '{0}' must come before the line label(s).")]
    ActionAfterLabel(String),

    /// Branch without any destination label
    #[error("Condition '{0}' has no line label to go to.")]
    MissingDestination(String),

    /// A bare label mixed with other destinations
    #[error("Invalid condition '{0}': a line label without probability must be the only destination.")]
    BareLabelNotAlone(String),

    /// Unbalanced or nested parentheses
    #[error("Mismatched parentheses in '{0}'.")]
    MalformedParentheses(String),

    /// The same destination label twice in one branch
    #[error("Label '{0}' duplicated.")]
    DuplicateDestination(String),

    /// Literal probability outside `[0, 1]`
    #[error("Expected a probability, got '{0}'.")]
    InvalidProbability(String),

    /// Literal probabilities summing past 1
    #[error("Sum of probabilities is {0}>1.")]
    ProbabilitySum(f64),

    /// A destination that is not a line label of the phase
    #[error("Invalid line label '{label}'.{}", suggestion_suffix(.suggestion.as_deref()))]
    UnknownLineLabel {
        /// The offending label
        label: String,
        /// Closest known label, if any
        suggestion: Option<String>,
    },

    /// A deterministic unconditional branch followed by more branches
    #[error("Condition '{0}' always goes to a line label, so the conditions after it are never tested.")]
    UnreachableBranch(String),

    /// Help line branching on the subject's response
    #[error("Condition on help line cannot depend on response.")]
    ResponseOnHelpLine,

    // ---- actions and expressions -------------------------------------------
    /// `count_reset` with an undeclared event
    #[error("Unknown event '{0}' in count_reset.")]
    UnknownCountResetEvent(String),

    /// `count(...)` / `count_line(...)` with an undeclared event
    #[error("Unknown event '{event}' in {function}.")]
    UnknownCountEvent {
        /// `count` or `count_line`
        function: String,
        /// The offending event name
        event: String,
    },

    /// Assignment to a global variable
    #[error("Cannot modify global variable inside a phase.")]
    ModifiesGlobalVariable(String),

    /// Assignment target that cannot be a variable name
    #[error("Variable name '{name}' {reason}.")]
    InvalidVariableName {
        /// The offending name
        name: String,
        /// Why it is rejected
        reason: String,
    },

    /// Expression with a syntax error
    #[error("{0}")]
    InvalidExpression(ExprError),
}

fn suggestion_suffix(suggestion: Option<&str>) -> String {
    suggestion.map_or_else(String::new, |s| format!(" Did you mean '{s}'?"))
}

// ============================================================================
// Phase Execution Errors
// ============================================================================

/// Errors raised while a subject moves through its phases.
///
/// All of these abort the affected subject only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhaseError {
    /// Expression evaluation failed on a phase line
    #[error("Error on line {lineno}: {source}")]
    Evaluation {
        /// Script line of the failing expression
        lineno: usize,
        /// Evaluator error
        #[source]
        source: ExprError,
    },

    /// Predicate did not produce a boolean
    #[error("Error on line {lineno}: Condition '{condition}' is not a boolean expression.")]
    NotBoolean {
        /// Script line of the condition
        lineno: usize,
        /// Condition text
        condition: String,
    },

    /// Probability expression produced a value outside `[0, 1]`
    #[error("Error on line {lineno}: Expected a probability, got '{value}' from '{expression}'.")]
    InvalidProbability {
        /// Script line of the branch
        lineno: usize,
        /// Probability expression
        expression: String,
        /// Value it evaluated to
        value: String,
    },

    /// Probabilities of one branch summed past 1
    #[error("Error on line {lineno}: Sum of probabilities is {sum}>1.")]
    ProbabilitySum {
        /// Script line of the branch
        lineno: usize,
        /// Total probability mass
        sum: f64,
    },

    /// Intensity expression did not produce a number
    #[error("Error on line {lineno}: Intensity '{expression}' of '{element}' is not a number.")]
    InvalidIntensity {
        /// Script line of the stimulus
        lineno: usize,
        /// Stimulus element
        element: String,
        /// Intensity expression
        expression: String,
    },

    /// Response is not a declared behavior
    #[error("Unknown response '{0}'.")]
    UnknownResponse(String),

    /// A response was supplied before the first stimulus of a phase
    #[error("A response was given to phase '{0}' before its first stimulus.")]
    ResponseBeforeFirstStimulus(String),

    /// A counter operation named an event the phase does not count
    #[error(transparent)]
    UnknownEvent(#[from] UnknownEvent),

    /// Internal consistency failure: a branch led to a label the phase lacks
    #[error("Internal error: phase '{phase}' has no line labeled '{label}'.")]
    UnknownLine {
        /// Phase label
        phase: String,
        /// Missing line label
        label: String,
    },

    /// Help lines keep chaining without reaching a stimulus
    #[error("Error on line {lineno}: help lines starting at '{label}' never reach a stimulus.")]
    HelpLineCycle {
        /// Script line of the help line where the chain started
        lineno: usize,
        /// Label of that help line
        label: String,
    },

    /// Internal consistency failure: every branch of a line was rejected
    #[error(
        "Internal error on line {lineno}: No condition in '{conditions}' was met for response '{response}'."
    )]
    NoConditionMet {
        /// Script line of the exhausted line
        lineno: usize,
        /// The full condition text of the line
        conditions: String,
        /// The response being processed (empty for help lines)
        response: String,
    },

    /// World requested with an undefined phase label
    #[error("Unknown phase '{label}'.{}", suggestion_suffix(.suggestion.as_deref()))]
    UnknownPhase {
        /// Requested label
        label: String,
        /// Closest defined label, if any
        suggestion: Option<String>,
    },

    /// World requested with no phases
    #[error("A world needs at least one phase.")]
    EmptyWorld,
}

impl PhaseError {
    /// Returns `true` for failures that indicate a bug in the engine or in
    /// its validation, rather than in the script or the inputs.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::NoConditionMet { .. } | Self::UnknownLine { .. })
    }
}

// ============================================================================
// Simulation Errors
// ============================================================================

/// Per-subject simulation failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// The subject did not finish within the step ceiling
    #[error("subject exceeded the step limit of {limit} without finishing")]
    StepLimitExceeded {
        /// Configured ceiling
        limit: u64,
    },

    /// The run was cancelled before the subject finished
    #[error("simulation cancelled")]
    Cancelled,

    /// The subject's phases failed
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// The responder settings cannot produce a response
    #[error("invalid responder: {0}")]
    Responder(String),

    /// The subject's worker panicked or was aborted
    #[error("subject worker failed: {0}")]
    Worker(String),
}

// ============================================================================
// Tests
// ============================================================================
