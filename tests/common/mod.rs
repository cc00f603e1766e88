//! Shared integration-test helpers: compiling scripts, walking worlds and
//! spawning the `lesim` binary.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Command, Output};

use lesim::phase::{Declarations, PhaseRegistry, World, WorldStep};
use lesim::variables::Variables;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Compiles `script` with the given declarations and no global variables.
#[allow(clippy::missing_panics_doc)]
pub fn compile(elements: &[&str], behaviors: &[&str], script: &str) -> PhaseRegistry {
    compile_with(elements, behaviors, Variables::new(), script)
}

/// Compiles `script` with the given declarations and global variables.
#[allow(clippy::missing_panics_doc)]
pub fn compile_with(
    elements: &[&str],
    behaviors: &[&str],
    globals: Variables,
    script: &str,
) -> PhaseRegistry {
    let declarations = Declarations::new(elements.iter().copied(), behaviors.iter().copied(), globals);
    lesim::script::compile(script, declarations).unwrap_or_else(|e| panic!("{e}"))
}

/// Seeded generator for reproducible walks.
pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A finished walk through a world.
#[derive(Debug)]
pub struct Walk {
    /// Every stimulus step, in order
    pub steps: Vec<WorldStep>,
    /// The final `End` step
    pub end: WorldStep,
}

impl Walk {
    /// Line labels of the stimulus steps.
    pub fn lines(&self) -> Vec<&str> {
        self.steps.iter().filter_map(WorldStep::line).collect()
    }

    /// Number of stimuli containing `element`.
    pub fn presentations_of(&self, element: &str) -> usize {
        self.steps
            .iter()
            .filter_map(WorldStep::stimulus)
            .filter(|s| s.contains(element))
            .count()
    }
}

/// Drives `world` until it ends, answering each stimulus with `respond`.
///
/// Panics after `max_steps` stimuli.
#[allow(clippy::missing_panics_doc)]
pub fn walk(
    world: &mut World,
    rng: &mut StdRng,
    mut respond: impl FnMut(&WorldStep) -> String,
    max_steps: usize,
) -> Walk {
    let mut steps = Vec::new();
    let mut response: Option<String> = None;
    loop {
        let step = world
            .next_stimulus(response.as_deref(), rng)
            .unwrap_or_else(|e| panic!("step {} failed: {e}", steps.len()));
        if step.is_end() {
            return Walk { steps, end: step };
        }
        assert!(steps.len() < max_steps, "world did not end within {max_steps} stimuli");
        response = Some(respond(&step));
        steps.push(step);
    }
}

/// Responds with the same behavior every time.
pub fn always(behavior: &'static str) -> impl FnMut(&WorldStep) -> String {
    move |_| behavior.to_string()
}

/// Runs the `lesim` binary with `args` and waits for it.
#[allow(clippy::missing_panics_doc)]
pub fn lesim(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lesim"))
        .args(args)
        .env_remove("LESIM_LOG_LEVEL")
        .env_remove("LESIM_SEED")
        .env_remove("LESIM_EVENTS_FILE")
        .env_remove("LESIM_MAX_STEPS")
        .output()
        .expect("failed to spawn lesim")
}

/// Path of a file under `tests/fixtures`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}
