//! Phase definitions and the registry that holds them.
//!
//! A [`PhaseBuilder`] collects the raw rows of one `@phase` block, including
//! those inherited from a parent phase. [`PhaseBuilder::build`] parses them
//! into an immutable [`PhaseDefinition`]; a [`RegistryBuilder`] checks
//! labels and parents across phases and freezes the result into a
//! [`PhaseRegistry`].

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use super::line::{Line, ParseContext};
use super::stop::StopCondition;
use super::world::World;
use super::{Declarations, suggest};
use crate::error::{DefinitionError, DefinitionErrorKind, PhaseError};
use crate::variables::is_identifier;

/// Label of the line a phase starts on when present.
pub const NEW_TRIAL_LABEL: &str = "new_trial";

/// An unparsed phase line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Script line number
    pub lineno: usize,
    /// Line label
    pub label: String,
    /// Text after the label
    pub text: String,
}

// ============================================================================
// Builder
// ============================================================================

/// Rows of a phase being defined.
#[derive(Debug, Clone)]
pub struct PhaseBuilder {
    label: String,
    lineno: usize,
    parent: Option<String>,
    stop: String,
    rows: Vec<RawLine>,
    own_labels: IndexSet<String>,
}

impl PhaseBuilder {
    /// Starts an empty phase.
    #[must_use]
    pub fn new(label: impl Into<String>, lineno: usize, stop: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            lineno,
            parent: None,
            stop: stop.into(),
            rows: Vec::new(),
            own_labels: IndexSet::new(),
        }
    }

    /// Starts a phase holding a copy of `parent`'s rows.
    #[must_use]
    pub fn inheriting(
        label: impl Into<String>,
        lineno: usize,
        stop: impl Into<String>,
        parent: &PhaseDefinition,
    ) -> Self {
        Self {
            parent: Some(parent.label().to_string()),
            rows: parent.rows().to_vec(),
            ..Self::new(label, lineno, stop)
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Adds a phase line. A row whose label was inherited replaces the
    /// inherited row in place; other rows are appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the line has no text after its label, or if the
    /// phase itself already defines the label.
    pub fn add_line(&mut self, lineno: usize, line: &str) -> Result<(), DefinitionError> {
        let line = line.trim();
        let (label, text) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(label, text)| (label, text.trim()));
        if text.is_empty() {
            return Err(DefinitionError::new(lineno, DefinitionErrorKind::OnlyLabel));
        }
        if !self.own_labels.insert(label.to_string()) {
            return Err(DefinitionError::new(
                lineno,
                DefinitionErrorKind::DuplicateLabel(label.to_string()),
            ));
        }

        let row = RawLine {
            lineno,
            label: label.to_string(),
            text: text.to_string(),
        };
        match self.rows.iter_mut().find(|r| r.label == label) {
            Some(inherited) => *inherited = row,
            None => self.rows.push(row),
        }
        Ok(())
    }

    /// Parses every row against the experiment's declarations.
    ///
    /// # Errors
    ///
    /// Returns the first definition error, carrying the script line it was
    /// found on.
    pub fn build(self, declarations: &Declarations) -> Result<PhaseDefinition, DefinitionError> {
        if self.rows.is_empty() {
            return Err(DefinitionError::new(
                self.lineno,
                DefinitionErrorKind::EmptyPhase(self.label),
            ));
        }

        let mut labels = IndexSet::with_capacity(self.rows.len());
        for row in &self.rows {
            let kind = if declarations.is_stimulus_element(&row.label) {
                DefinitionErrorKind::LabelIsStimulusElement(row.label.clone())
            } else if declarations.is_behavior(&row.label) {
                DefinitionErrorKind::LabelIsBehavior(row.label.clone())
            } else {
                labels.insert(row.label.clone());
                continue;
            };
            return Err(DefinitionError::new(row.lineno, kind));
        }

        let ctx = ParseContext::new(declarations, &labels);
        let mut lines = IndexMap::with_capacity(self.rows.len());
        for row in &self.rows {
            let line = Line::parse(&row.label, row.lineno, &row.text, &ctx)
                .map_err(|kind| DefinitionError::new(row.lineno, kind))?;
            lines.insert(row.label.clone(), line);
        }
        let stop = StopCondition::parse(&self.stop, self.lineno, &ctx)
            .map_err(|kind| DefinitionError::new(self.lineno, kind))?;

        let first_label = if labels.contains(NEW_TRIAL_LABEL) {
            NEW_TRIAL_LABEL.to_string()
        } else {
            self.rows[0].label.clone()
        };
        let local_variables: IndexSet<String> = lines
            .values()
            .flat_map(Line::actions)
            .filter_map(|action| action.assigned_variable())
            .map(String::from)
            .collect();
        let events = declarations
            .stimulus_elements()
            .chain(declarations.behaviors())
            .map(String::from)
            .chain(labels)
            .collect();

        Ok(PhaseDefinition {
            label: self.label,
            lineno: self.lineno,
            parent: self.parent,
            stop,
            lines,
            rows: self.rows,
            first_label,
            local_variables: local_variables.into_iter().collect(),
            events,
        })
    }
}

// ============================================================================
// Definition
// ============================================================================

/// An immutable, parsed phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseDefinition {
    label: String,
    lineno: usize,
    parent: Option<String>,
    stop: StopCondition,
    lines: IndexMap<String, Line>,
    rows: Vec<RawLine>,
    first_label: String,
    local_variables: Vec<String>,
    events: Vec<String>,
}

impl PhaseDefinition {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Line of the `@phase` header.
    #[must_use]
    pub const fn lineno(&self) -> usize {
        self.lineno
    }

    /// Label of the phase this one inherited its lines from.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    #[must_use]
    pub const fn stop_condition(&self) -> &StopCondition {
        &self.stop
    }

    #[must_use]
    pub fn line(&self, label: &str) -> Option<&Line> {
        self.lines.get(label)
    }

    /// Lines in script order.
    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.lines.values()
    }

    /// Label of the first line visited.
    #[must_use]
    pub fn first_label(&self) -> &str {
        &self.first_label
    }

    /// Names assigned anywhere in the phase.
    #[must_use]
    pub fn local_variables(&self) -> &[String] {
        &self.local_variables
    }

    /// Everything counted by the phase: stimulus elements, behaviors and
    /// line labels.
    #[must_use]
    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// Unparsed rows, after inheritance.
    #[must_use]
    pub fn rows(&self) -> &[RawLine] {
        &self.rows
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Accumulates phases in definition order.
#[derive(Debug)]
pub struct RegistryBuilder {
    declarations: Declarations,
    phases: IndexMap<String, Arc<PhaseDefinition>>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new(declarations: Declarations) -> Self {
        Self {
            declarations,
            phases: IndexMap::new(),
        }
    }

    #[must_use]
    pub const fn declarations(&self) -> &Declarations {
        &self.declarations
    }

    /// A phase defined so far.
    #[must_use]
    pub fn phase(&self, label: &str) -> Option<&PhaseDefinition> {
        self.phases.get(label).map(AsRef::as_ref)
    }

    /// Opens a new phase, inheriting from `parent` when given.
    ///
    /// # Errors
    ///
    /// Returns an error if `label` is not an identifier or is already
    /// defined, or if `parent` has not been defined yet.
    pub fn begin(
        &self,
        label: &str,
        parent: Option<&str>,
        lineno: usize,
        stop: &str,
    ) -> Result<PhaseBuilder, DefinitionError> {
        let fail = |kind| Err(DefinitionError::new(lineno, kind));

        if !is_identifier(label) {
            return fail(DefinitionErrorKind::PhaseLabelNotIdentifier(label.to_string()));
        }
        if self.phases.contains_key(label) {
            return fail(DefinitionErrorKind::PhaseRedefinition(label.to_string()));
        }
        match parent {
            None => Ok(PhaseBuilder::new(label, lineno, stop)),
            Some(parent) => match self.phase(parent) {
                Some(definition) => Ok(PhaseBuilder::inheriting(label, lineno, stop, definition)),
                None => fail(DefinitionErrorKind::UnknownParentPhase(parent.to_string())),
            },
        }
    }

    /// Builds and adds a phase.
    ///
    /// # Errors
    ///
    /// Returns an error if the phase is already defined or does not parse.
    pub fn define(&mut self, builder: PhaseBuilder) -> Result<(), DefinitionError> {
        if self.phases.contains_key(builder.label()) {
            return Err(DefinitionError::new(
                builder.lineno,
                DefinitionErrorKind::PhaseRedefinition(builder.label),
            ));
        }
        let definition = builder.build(&self.declarations)?;
        tracing::debug!(
            phase = %definition.label(),
            lines = definition.lines.len(),
            parent = ?definition.parent(),
            "phase defined"
        );
        self.phases
            .insert(definition.label().to_string(), Arc::new(definition));
        Ok(())
    }

    /// Freezes the registry.
    #[must_use]
    pub fn finish(self) -> PhaseRegistry {
        PhaseRegistry {
            declarations: Arc::new(self.declarations),
            phases: self.phases,
        }
    }
}

/// All phases of an experiment, shared read-only by every subject.
#[derive(Debug, Clone)]
pub struct PhaseRegistry {
    declarations: Arc<Declarations>,
    phases: IndexMap<String, Arc<PhaseDefinition>>,
}

impl PhaseRegistry {
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&Arc<PhaseDefinition>> {
        self.phases.get(label)
    }

    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.phases.contains_key(label)
    }

    /// Phase labels in definition order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.phases.keys().map(String::as_str)
    }

    /// Phases in definition order.
    pub fn phases(&self) -> impl Iterator<Item = &Arc<PhaseDefinition>> {
        self.phases.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    #[must_use]
    pub const fn declarations(&self) -> &Arc<Declarations> {
        &self.declarations
    }

    /// Closest defined phase label to `label`.
    #[must_use]
    pub fn suggest(&self, label: &str) -> Option<String> {
        suggest(label, self.labels())
    }

    /// Creates a world running the listed phases in order. A label may be
    /// listed more than once; every occurrence gets its own instance.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::UnknownPhase`] for an undefined label and
    /// [`PhaseError::EmptyWorld`] for an empty list.
    pub fn world<S: AsRef<str>>(&self, labels: &[S]) -> Result<World, PhaseError> {
        World::new(self, labels)
    }
}
