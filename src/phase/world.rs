//! A sequence of phases run by one subject.

use std::sync::Arc;

use rand::RngCore;
use tracing::debug;

use super::definition::PhaseRegistry;
use super::instance::{PhaseInstance, PhaseStep};
use super::Stimulus;
use crate::error::PhaseError;

/// Result of one world step.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldStep {
    /// A stimulus from the current phase
    Stimulus {
        /// Elements with their intensities
        stimulus: Stimulus,
        /// Label of the phase presenting it
        phase: String,
        /// Label of the line presenting it
        line: String,
        /// Help lines passed through on the way
        help_lines: Vec<String>,
    },
    /// The last phase has completed
    End {
        /// Label of the last phase
        phase: String,
        /// Last line entered in that phase
        line: Option<String>,
        /// Help lines passed through before the end
        help_lines: Vec<String>,
    },
}

impl WorldStep {
    /// The stimulus, unless the run has ended.
    #[must_use]
    pub const fn stimulus(&self) -> Option<&Stimulus> {
        match self {
            Self::Stimulus { stimulus, .. } => Some(stimulus),
            Self::End { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_end(&self) -> bool {
        matches!(self, Self::End { .. })
    }

    #[must_use]
    pub fn phase(&self) -> &str {
        match self {
            Self::Stimulus { phase, .. } | Self::End { phase, .. } => phase,
        }
    }

    #[must_use]
    pub fn line(&self) -> Option<&str> {
        match self {
            Self::Stimulus { line, .. } => Some(line),
            Self::End { line, .. } => line.as_deref(),
        }
    }

    #[must_use]
    pub fn help_lines(&self) -> &[String] {
        match self {
            Self::Stimulus { help_lines, .. } | Self::End { help_lines, .. } => help_lines,
        }
    }
}

/// Ordered phase instances for one subject.
///
/// Every listed phase gets its own instance, so a phase listed twice keeps
/// separate counters and variables for each run through it.
#[derive(Debug, Clone)]
pub struct World {
    phases: Vec<PhaseInstance>,
    current: usize,
}

impl World {
    /// Creates a world running `labels` in order.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::UnknownPhase`] for an undefined label and
    /// [`PhaseError::EmptyWorld`] for an empty list.
    pub fn new<S: AsRef<str>>(registry: &PhaseRegistry, labels: &[S]) -> Result<Self, PhaseError> {
        if labels.is_empty() {
            return Err(PhaseError::EmptyWorld);
        }
        let phases = labels
            .iter()
            .map(|label| {
                let label = label.as_ref();
                registry
                    .get(label)
                    .map(|definition| {
                        PhaseInstance::new(
                            Arc::clone(definition),
                            Arc::clone(registry.declarations()),
                        )
                    })
                    .ok_or_else(|| PhaseError::UnknownPhase {
                        label: label.to_string(),
                        suggestion: registry.suggest(label),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { phases, current: 0 })
    }

    /// Index of the running phase.
    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current
    }

    /// The running phase.
    #[must_use]
    pub fn current_phase(&self) -> &PhaseInstance {
        &self.phases[self.current]
    }

    /// Phase instances in run order.
    #[must_use]
    pub fn phases(&self) -> &[PhaseInstance] {
        &self.phases
    }

    /// Advances the current phase. When it completes, the next phase is
    /// started without a response; after the last phase every call returns
    /// [`WorldStep::End`].
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`PhaseInstance::next_stimulus`].
    pub fn next_stimulus(
        &mut self,
        response: Option<&str>,
        rng: &mut dyn RngCore,
    ) -> Result<WorldStep, PhaseError> {
        let mut response = response;
        let mut help_lines = Vec::new();

        loop {
            let is_last = self.current + 1 >= self.phases.len();
            let phase = &mut self.phases[self.current];
            match phase.next_stimulus(response, &mut *rng)? {
                PhaseStep::Stimulus(presentation) => {
                    help_lines.extend(presentation.help_lines);
                    return Ok(WorldStep::Stimulus {
                        stimulus: presentation.stimulus,
                        phase: phase.label().to_string(),
                        line: presentation.line,
                        help_lines,
                    });
                }
                PhaseStep::Complete { help_lines: trail } => {
                    help_lines.extend(trail);
                    if is_last {
                        return Ok(WorldStep::End {
                            phase: phase.label().to_string(),
                            line: phase.current_line().map(String::from),
                            help_lines,
                        });
                    }
                    let completed = phase.label().to_string();
                    self.current += 1;
                    debug!(
                        completed = %completed,
                        next = %self.phases[self.current].label(),
                        "phase completed"
                    );
                    response = None;
                }
            }
        }
    }

    /// Rewinds to the first phase and resets every instance.
    pub fn subject_reset(&mut self) {
        self.current = 0;
        for phase in &mut self.phases {
            phase.subject_reset();
        }
    }
}
