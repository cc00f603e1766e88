//! `run` command: simulate the runs of an experiment file.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::cli::args::{OutputFormat, RunArgs};
use crate::config::loader::ConfigLoader;
use crate::config::schema::{Experiment, RunPlan};
use crate::error::{LesimError, SimulationError};
use crate::observability::events::EventEmitter;
use crate::simulation::{RunReport, Simulation};

/// Loads the experiment, simulates the selected runs and prints a summary.
///
/// # Errors
///
/// Returns a config error if the experiment does not load, a usage error for
/// an unknown `--run` label or bad override, and the first subject error if
/// any subject failed. Cancellation yields [`SimulationError::Cancelled`].
pub async fn run(args: &RunArgs, cancel: CancellationToken) -> Result<(), LesimError> {
    tracing::info!(file = %args.file.display(), "loading experiment");
    let load_result = ConfigLoader::with_defaults().load(&args.file)?;
    for warning in &load_result.warnings {
        tracing::warn!(
            location = warning.location.as_deref().unwrap_or("<unknown>"),
            "{}",
            warning.message
        );
    }
    let experiment = load_result.experiment;
    let plans = select_runs(&experiment, args)?;

    let emitter = match args.events_file {
        Some(ref path) => EventEmitter::from_file(path)?,
        None => EventEmitter::noop(),
    };
    let simulation = Simulation::new(Arc::clone(&experiment), Arc::new(emitter), cancel)
        .with_history(args.history);

    let mut reports = Vec::with_capacity(plans.len());
    for plan in &plans {
        let report = simulation.run(plan).await?;
        let cancelled = report.was_cancelled();
        reports.push(report);
        if cancelled {
            break;
        }
    }

    match args.format {
        OutputFormat::Human => print_human(&experiment, &reports),
        OutputFormat::Json => {
            let output = json!({
                "title": experiment.title,
                "runs": reports
                    .iter()
                    .map(|report| report_json(&experiment, report, args.history))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    if reports.iter().any(RunReport::was_cancelled) {
        return Err(SimulationError::Cancelled.into());
    }
    match reports
        .into_iter()
        .flat_map(|report| report.outcomes)
        .find_map(|outcome| outcome.result.err())
    {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Picks the runs to simulate and applies the command-line overrides.
fn select_runs(experiment: &Experiment, args: &RunArgs) -> Result<Vec<RunPlan>, LesimError> {
    let mut plans: Vec<RunPlan> = match args.run {
        Some(ref label) => {
            let plan = experiment.run(label).ok_or_else(|| {
                let labels: Vec<_> = experiment.runs.iter().map(|r| r.label.as_str()).collect();
                LesimError::Usage(format!(
                    "no run labeled '{label}' (available: {})",
                    labels.join(", ")
                ))
            })?;
            vec![plan.clone()]
        }
        None => experiment.runs.clone(),
    };
    if plans.is_empty() {
        return Err(LesimError::Usage(
            "the experiment defines no runs".to_string(),
        ));
    }

    if args.subjects == Some(0) {
        return Err(LesimError::Usage("--subjects must be at least 1".to_string()));
    }
    for plan in &mut plans {
        if let Some(subjects) = args.subjects {
            plan.subjects = subjects;
        }
        if let Some(seed) = args.seed {
            plan.seed = Some(seed);
        }
        if let Some(max_steps) = args.max_steps {
            plan.max_steps = max_steps;
        }
    }
    Ok(plans)
}

fn print_human(experiment: &Experiment, reports: &[RunReport]) {
    if let Some(ref title) = experiment.title {
        println!("{title}");
    }
    for report in reports {
        println!(
            "{}  seed={}  subjects={}  completed={}  failed={}  ({} ms)",
            report.run,
            report.seed,
            report.outcomes.len(),
            report.completed(),
            report.failed(),
            report.duration.as_millis()
        );
        for outcome in &report.outcomes {
            match outcome.result {
                Ok(ref subject) => {
                    let presented = experiment
                        .declarations()
                        .stimulus_elements()
                        .map(|e| format!("{e}={}", subject.presentations_of(e)))
                        .collect::<Vec<_>>()
                        .join(" ");
                    println!(
                        "  subject {}  steps={}  end={}/{}  {presented}",
                        outcome.subject,
                        subject.steps,
                        subject.phase,
                        subject.line.as_deref().unwrap_or("-"),
                    );
                }
                Err(ref e) => println!("  subject {}  failed: {e}", outcome.subject),
            }
        }
    }
}

fn report_json(experiment: &Experiment, report: &RunReport, history: bool) -> serde_json::Value {
    let subjects: Vec<_> = report
        .outcomes
        .iter()
        .map(|outcome| match outcome.result {
            Ok(ref subject) => {
                let presented: serde_json::Map<_, _> = experiment
                    .declarations()
                    .stimulus_elements()
                    .map(|e| (e.to_string(), json!(subject.presentations_of(e))))
                    .collect();
                let mut value = json!({
                    "subject": outcome.subject,
                    "seed": outcome.seed,
                    "steps": subject.steps,
                    "phase": subject.phase,
                    "line": subject.line,
                    "presented": presented,
                });
                if history {
                    value["history"] = json!(subject.history);
                }
                value
            }
            Err(ref e) => json!({
                "subject": outcome.subject,
                "seed": outcome.seed,
                "error": e.to_string(),
            }),
        })
        .collect();

    json!({
        "run": report.run,
        "seed": report.seed,
        "completed": report.completed(),
        "failed": report.failed(),
        "duration_ms": u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
        "subjects": subjects,
    })
}
