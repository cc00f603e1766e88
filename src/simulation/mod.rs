//! Simulation driver.
//!
//! Runs the subjects of a [`RunPlan`] through their phases. Each subject has
//! its own [`World`], responder and seeded RNG, and runs on the blocking
//! pool; a failing subject does not stop the others.

pub mod history;
pub mod responder;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::schema::{Experiment, RunPlan};
use crate::error::SimulationError;
use crate::observability::events::{Event, EventEmitter};
use crate::phase::{World, WorldStep};

pub use history::{History, HistoryEntry};
pub use responder::{RandomResponder, Responder, SequenceResponder};

// ============================================================================
// Reports
// ============================================================================

/// What one subject went through.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectReport {
    /// Stimuli and responses, in order; empty unless history is recorded
    pub history: History,
    /// Presentations per stimulus element
    pub presented: IndexMap<String, u64>,
    /// Number of stimuli presented
    pub steps: u64,
    /// Last phase of the run
    pub phase: String,
    /// Last line entered in that phase
    pub line: Option<String>,
}

impl SubjectReport {
    /// Number of stimuli that contained `element`.
    #[must_use]
    pub fn presentations_of(&self, element: &str) -> u64 {
        self.presented.get(element).copied().unwrap_or(0)
    }
}

/// Result for one subject of a run.
#[derive(Debug)]
pub struct SubjectOutcome {
    /// Zero-based subject index
    pub subject: u32,
    /// Seed of the subject's RNG
    pub seed: u64,
    /// Report, or the error that stopped the subject
    pub result: Result<SubjectReport, SimulationError>,
}

/// Result of a whole run, subjects in index order.
#[derive(Debug)]
pub struct RunReport {
    /// Run label
    pub run: String,
    /// Base seed
    pub seed: u64,
    /// One outcome per subject
    pub outcomes: Vec<SubjectOutcome>,
    /// Wall-clock duration
    pub duration: Duration,
}

impl RunReport {
    /// Number of subjects that went through every phase.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Number of subjects that stopped with an error.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.completed()
    }

    /// Returns `true` if any subject was stopped by cancellation.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o.result, Err(SimulationError::Cancelled)))
    }

    /// The first error, in subject order.
    #[must_use]
    pub fn first_error(&self) -> Option<&SimulationError> {
        self.outcomes.iter().find_map(|o| o.result.as_ref().err())
    }
}

// ============================================================================
// Single subject
// ============================================================================

/// Settings shared by every step of one subject.
#[derive(Debug, Clone, Copy)]
pub struct SubjectContext<'a> {
    /// Run label, for events
    pub run: &'a str,
    /// Zero-based subject index
    pub subject: u32,
    /// Maximum number of stimuli before the subject is stopped
    pub max_steps: u64,
    /// Stops the subject between steps
    pub cancel: &'a CancellationToken,
    /// Receives per-step events
    pub emitter: &'a EventEmitter,
    /// Keep every stimulus and response, not just the counts
    pub record_history: bool,
}

/// Drives `world` until its last phase completes.
///
/// Each stimulus is answered by `responder`, and the answer is fed back as
/// the response of the next step.
///
/// # Errors
///
/// - [`SimulationError::Cancelled`] once `ctx.cancel` is triggered
/// - [`SimulationError::StepLimitExceeded`] after `ctx.max_steps` stimuli
/// - [`SimulationError::Phase`] for evaluation errors in the phases
pub fn run_subject(
    world: &mut World,
    responder: &mut dyn Responder,
    rng: &mut dyn RngCore,
    ctx: &SubjectContext<'_>,
) -> Result<SubjectReport, SimulationError> {
    let mut history = History::new();
    let mut presented: IndexMap<String, u64> = IndexMap::new();
    let mut response: Option<String> = None;
    let mut steps: u64 = 0;
    let mut entered: Option<usize> = None;

    loop {
        if ctx.cancel.is_cancelled() {
            return Err(SimulationError::Cancelled);
        }

        let step = world.next_stimulus(response.as_deref(), &mut *rng)?;
        entered = Some(announce_phases(world, entered, ctx));

        let (stimulus, phase, line, help_lines) = match step {
            WorldStep::End { phase, line, .. } => {
                return Ok(SubjectReport {
                    history,
                    presented,
                    steps,
                    phase,
                    line,
                });
            }
            WorldStep::Stimulus {
                stimulus,
                phase,
                line,
                help_lines,
            } => (stimulus, phase, line, help_lines),
        };

        steps += 1;
        if steps > ctx.max_steps {
            return Err(SimulationError::StepLimitExceeded {
                limit: ctx.max_steps,
            });
        }

        let behavior = responder.respond(&stimulus, &mut *rng);

        if ctx.emitter.is_enabled() {
            ctx.emitter.emit(Event::StimulusPresented {
                timestamp: Utc::now(),
                run: ctx.run.to_string(),
                subject: ctx.subject,
                phase: phase.clone(),
                line: line.clone(),
                stimulus: stimulus.clone(),
                help_lines: help_lines.clone(),
            });
            ctx.emitter.emit(Event::ResponseRecorded {
                timestamp: Utc::now(),
                run: ctx.run.to_string(),
                subject: ctx.subject,
                phase: phase.clone(),
                behavior: behavior.clone(),
            });
        }

        for element in stimulus.names() {
            match presented.get_mut(element) {
                Some(count) => *count += 1,
                None => {
                    presented.insert(element.to_string(), 1);
                }
            }
        }
        if ctx.record_history {
            history.push(HistoryEntry::Stimulus {
                phase: phase.clone(),
                line,
                stimulus,
                help_lines,
            });
            history.push(HistoryEntry::Response {
                phase,
                behavior: behavior.clone(),
            });
        }
        response = Some(behavior);
    }
}

/// Emits `PhaseEntered` for every phase started since `entered`, including
/// phases that completed without presenting anything.
fn announce_phases(world: &World, entered: Option<usize>, ctx: &SubjectContext<'_>) -> usize {
    let current = world.current_index();
    let first = entered.map_or(0, |index| index + 1);
    for index in first..=current {
        let phase = world.phases()[index].label();
        debug!(subject = ctx.subject, phase, index, "phase entered");
        ctx.emitter.emit(Event::PhaseEntered {
            timestamp: Utc::now(),
            run: ctx.run.to_string(),
            subject: ctx.subject,
            phase: phase.to_string(),
            phase_index: index,
        });
    }
    current
}

// ============================================================================
// Whole run
// ============================================================================

/// Runs every subject of a run plan.
#[derive(Debug, Clone)]
pub struct Simulation {
    experiment: Arc<Experiment>,
    emitter: Arc<EventEmitter>,
    cancel: CancellationToken,
    record_history: bool,
}

impl Simulation {
    /// Creates a simulation over a loaded experiment.
    #[must_use]
    pub const fn new(
        experiment: Arc<Experiment>,
        emitter: Arc<EventEmitter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            experiment,
            emitter,
            cancel,
            record_history: true,
        }
    }

    /// Whether subject reports carry the full history. Counts are always
    /// kept; without history a subject's memory stays flat however many
    /// steps it takes.
    #[must_use]
    pub const fn with_history(mut self, record: bool) -> Self {
        self.record_history = record;
        self
    }

    #[must_use]
    pub const fn experiment(&self) -> &Arc<Experiment> {
        &self.experiment
    }

    /// Runs all subjects of `plan` in parallel. Subject `i` is seeded with
    /// `seed + i`; without a seed in the plan one is drawn at random.
    ///
    /// Subject failures are reported in the [`RunReport`], not returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan names an unknown phase or its responder
    /// settings are unusable.
    pub async fn run(&self, plan: &RunPlan) -> Result<RunReport, SimulationError> {
        let started = Instant::now();
        let template = World::new(&self.experiment.registry, &plan.phases)?;
        let declarations = self.experiment.declarations();
        let seed = plan.seed.unwrap_or_else(rand::random);

        info!(
            run = %plan.label,
            subjects = plan.subjects,
            seed,
            "run started"
        );
        self.emitter.emit(Event::RunStarted {
            timestamp: Utc::now(),
            run: plan.label.clone(),
            subjects: plan.subjects,
            phases: plan.phases.clone(),
            seed,
        });

        let mut handles = Vec::with_capacity(plan.subjects as usize);
        for subject in 0..plan.subjects {
            let subject_seed = seed.wrapping_add(u64::from(subject));
            let mut world = template.clone();
            let mut responder = responder::build(&plan.responder, declarations)?;
            let emitter = Arc::clone(&self.emitter);
            let cancel = self.cancel.clone();
            let run = plan.label.clone();
            let max_steps = plan.max_steps;
            let record_history = self.record_history;

            let handle = tokio::task::spawn_blocking(move || {
                let mut rng = StdRng::seed_from_u64(subject_seed);
                let ctx = SubjectContext {
                    run: &run,
                    subject,
                    max_steps,
                    cancel: &cancel,
                    emitter: &emitter,
                    record_history,
                };
                run_subject(&mut world, responder.as_mut(), &mut rng, &ctx)
            });
            handles.push((subject, subject_seed, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (subject, subject_seed, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(SimulationError::Worker(e.to_string())),
            };
            self.report_subject(&plan.label, subject, &result);
            outcomes.push(SubjectOutcome {
                subject,
                seed: subject_seed,
                result,
            });
        }

        let report = RunReport {
            run: plan.label.clone(),
            seed,
            outcomes,
            duration: started.elapsed(),
        };
        info!(
            run = %report.run,
            completed = report.completed(),
            failed = report.failed(),
            "run completed"
        );
        self.emitter.emit(Event::RunCompleted {
            timestamp: Utc::now(),
            run: report.run.clone(),
            completed: u32::try_from(report.completed()).unwrap_or(u32::MAX),
            failed: u32::try_from(report.failed()).unwrap_or(u32::MAX),
            duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
        });
        Ok(report)
    }

    fn report_subject(
        &self,
        run: &str,
        subject: u32,
        result: &Result<SubjectReport, SimulationError>,
    ) {
        match result {
            Ok(report) => {
                info!(run, subject, steps = report.steps, "subject completed");
                self.emitter.emit(Event::SubjectCompleted {
                    timestamp: Utc::now(),
                    run: run.to_string(),
                    subject,
                    steps: report.steps,
                });
            }
            Err(e) => {
                match e {
                    SimulationError::Phase(phase) if phase.is_internal() => {
                        error!(run, subject, error = %e, "internal error in phase evaluation");
                    }
                    SimulationError::Cancelled => {
                        debug!(run, subject, "subject cancelled");
                    }
                    _ => warn!(run, subject, error = %e, "subject failed"),
                }
                self.emitter.emit(Event::SubjectFailed {
                    timestamp: Utc::now(),
                    run: run.to_string(),
                    subject,
                    error: e.to_string(),
                });
            }
        }
    }
}
