//! Per-subject execution state of a phase.

use std::sync::Arc;

use rand::RngCore;
use serde::Serialize;
use tracing::{debug, trace};

use super::definition::PhaseDefinition;
use super::runtime::Runtime;
use super::stop::StopCondition;
use super::{Declarations, EventCounter, Line, Stimulus};
use crate::error::PhaseError;
use crate::variables::Variables;

/// Consecutive help lines allowed in one step before the chain is treated
/// as a cycle.
pub const MAX_HELP_CHAIN: usize = 10_000;

/// A stimulus handed to the subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Presentation {
    /// Elements with their intensities
    pub stimulus: Stimulus,
    /// Label of the line presenting it
    pub line: String,
    /// Help lines passed through on the way, in order
    pub help_lines: Vec<String>,
}

/// Result of one phase step.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseStep {
    /// The phase presents a stimulus and waits for a response
    Stimulus(Presentation),
    /// The stop condition was met
    Complete {
        /// Help lines passed through before the condition was met
        help_lines: Vec<String>,
    },
}

/// One subject's walk through a phase.
///
/// Each step takes the response to the previous stimulus, moves to the next
/// line and returns the stimulus found there, following help lines until a
/// stimulus line is reached or the stop condition is met.
#[derive(Debug, Clone)]
pub struct PhaseInstance {
    definition: Arc<PhaseDefinition>,
    declarations: Arc<Declarations>,
    stop: StopCondition,
    locals: Variables,
    counter: EventCounter,
    current: Option<String>,
    previous: Option<String>,
    is_first_line: bool,
    first_stimulus_presented: bool,
    completed: bool,
}

impl PhaseInstance {
    /// Creates a fresh instance of `definition`.
    #[must_use]
    pub fn new(definition: Arc<PhaseDefinition>, declarations: Arc<Declarations>) -> Self {
        Self {
            stop: definition.stop_condition().clone(),
            locals: Variables::zeroed(definition.local_variables().iter().cloned()),
            counter: EventCounter::new(definition.events().iter().cloned()),
            current: None,
            previous: None,
            is_first_line: true,
            first_stimulus_presented: false,
            completed: false,
            definition,
            declarations,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        self.definition.label()
    }

    #[must_use]
    pub fn definition(&self) -> &PhaseDefinition {
        &self.definition
    }

    /// Label of the line last entered.
    #[must_use]
    pub fn current_line(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Label of the line entered before the current one.
    #[must_use]
    pub fn previous_line(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    /// Returns `true` once the stop condition has been met.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub const fn counter(&self) -> &EventCounter {
        &self.counter
    }

    #[must_use]
    pub const fn locals(&self) -> &Variables {
        &self.locals
    }

    /// Restores the state of a fresh instance.
    pub fn subject_reset(&mut self) {
        self.locals = Variables::zeroed(self.definition.local_variables().iter().cloned());
        self.counter = EventCounter::new(self.definition.events().iter().cloned());
        self.current = None;
        self.previous = None;
        self.is_first_line = true;
        self.first_stimulus_presented = false;
        self.completed = false;
    }

    /// Advances the phase by one step.
    ///
    /// `response` is the subject's reaction to the previous stimulus and must
    /// be `None` on the first call. Once the stop condition has been met
    /// every call returns [`PhaseStep::Complete`] without side effects.
    ///
    /// # Errors
    ///
    /// Returns an error if `response` is not a declared behavior, if it is
    /// given before the first stimulus, if an expression on a visited line
    /// fails, or if help lines chain without end.
    pub fn next_stimulus(
        &mut self,
        response: Option<&str>,
        rng: &mut dyn RngCore,
    ) -> Result<PhaseStep, PhaseError> {
        if self.completed {
            return Ok(PhaseStep::Complete {
                help_lines: Vec::new(),
            });
        }

        if let Some(response) = response {
            if !self.declarations.is_behavior(response) {
                return Err(PhaseError::UnknownResponse(response.to_string()));
            }
            if self.is_first_line {
                return Err(PhaseError::ResponseBeforeFirstStimulus(
                    self.definition.label().to_string(),
                ));
            }
            self.counter.record(response)?;
        }

        let definition = Arc::clone(&self.definition);
        let mut rt = Runtime {
            globals: self.declarations.globals(),
            locals: &mut self.locals,
            counter: &mut self.counter,
            rng,
        };
        let mut help_lines: Vec<String> = Vec::new();
        let mut response = response;

        loop {
            if self.first_stimulus_presented && self.stop.is_met(&mut rt)? {
                debug!(phase = %definition.label(), "stop condition met");
                self.completed = true;
                return Ok(PhaseStep::Complete { help_lines });
            }

            let label = if self.is_first_line {
                self.is_first_line = false;
                definition.first_label()
            } else {
                let current = self.current.as_deref().unwrap_or_default();
                lookup(&definition, current)?.next_label(response, &mut rt)?
            };
            let line = lookup(&definition, label)?;

            self.previous = self.current.replace(label.to_string());
            rt.counter.enter_line(label);
            rt.counter.record(label)?;

            if line.is_help_line() {
                trace!(phase = %definition.label(), line = %label, "help line");
                line.perform(&mut rt)?;
                help_lines.push(label.to_string());
                if help_lines.len() > MAX_HELP_CHAIN {
                    let first = lookup(&definition, &help_lines[0])?;
                    return Err(PhaseError::HelpLineCycle {
                        lineno: first.lineno(),
                        label: help_lines.swap_remove(0),
                    });
                }
                // Help lines cannot depend on the response.
                response = None;
                continue;
            }

            let stimulus = line.resolve_stimulus(&mut rt)?.unwrap_or_default();
            for (element, _) in stimulus.iter() {
                rt.counter.record(element)?;
            }
            self.first_stimulus_presented = true;
            trace!(phase = %definition.label(), line = %label, stimulus = %stimulus, "stimulus");
            return Ok(PhaseStep::Stimulus(Presentation {
                stimulus,
                line: label.to_string(),
                help_lines,
            }));
        }
    }
}

fn lookup<'d>(definition: &'d PhaseDefinition, label: &str) -> Result<&'d Line, PhaseError> {
    definition.line(label).ok_or_else(|| PhaseError::UnknownLine {
        phase: definition.label().to_string(),
        label: label.to_string(),
    })
}
