//! Response generators.
//!
//! Learning mechanisms are outside this crate, so a subject's responses come
//! from a [`Responder`]: weighted chance or a fixed sequence. Both are enough
//! to drive every schedule a phase script can express.

use rand::RngCore;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

use crate::config::schema::ResponderConfig;
use crate::error::SimulationError;
use crate::phase::{Declarations, Stimulus};

/// Picks a subject's response to a stimulus.
pub trait Responder: Send {
    /// Returns the behavior emitted in response to `stimulus`.
    fn respond(&mut self, stimulus: &Stimulus, rng: &mut dyn RngCore) -> String;
}

/// Builds the responder described by `config`.
///
/// # Errors
///
/// Returns [`SimulationError::Responder`] when the settings cannot produce
/// any response (no behaviors, no positive weight, an empty sequence).
pub fn build(
    config: &ResponderConfig,
    declarations: &Declarations,
) -> Result<Box<dyn Responder>, SimulationError> {
    match config {
        ResponderConfig::Random { weights } if weights.is_empty() => Ok(Box::new(
            RandomResponder::uniform(declarations.behaviors())?,
        )),
        ResponderConfig::Random { weights } => Ok(Box::new(RandomResponder::new(
            weights.iter().map(|(b, w)| (b.as_str(), *w)),
        )?)),
        ResponderConfig::Sequence { responses } => {
            Ok(Box::new(SequenceResponder::new(responses.clone())?))
        }
    }
}

// ============================================================================
// Random
// ============================================================================

/// Chooses each response independently with fixed relative weights.
#[derive(Debug, Clone)]
pub struct RandomResponder {
    behaviors: Vec<String>,
    distribution: WeightedIndex<f64>,
}

impl RandomResponder {
    /// Creates a responder from `(behavior, weight)` pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty, a weight is negative or not
    /// finite, or every weight is zero.
    pub fn new<'a>(
        weights: impl IntoIterator<Item = (&'a str, f64)>,
    ) -> Result<Self, SimulationError> {
        let (behaviors, weights): (Vec<String>, Vec<f64>) = weights
            .into_iter()
            .map(|(behavior, weight)| (behavior.to_string(), weight))
            .unzip();
        let distribution = WeightedIndex::new(&weights)
            .map_err(|e| SimulationError::Responder(format!("weights {weights:?}: {e}")))?;
        Ok(Self {
            behaviors,
            distribution,
        })
    }

    /// Creates a responder choosing every behavior with equal chance.
    ///
    /// # Errors
    ///
    /// Returns an error if `behaviors` is empty.
    pub fn uniform<'a>(behaviors: impl IntoIterator<Item = &'a str>) -> Result<Self, SimulationError> {
        Self::new(behaviors.into_iter().map(|b| (b, 1.0)))
    }

    /// Behaviors this responder can emit.
    #[must_use]
    pub fn behaviors(&self) -> &[String] {
        &self.behaviors
    }
}

impl Responder for RandomResponder {
    fn respond(&mut self, _stimulus: &Stimulus, rng: &mut dyn RngCore) -> String {
        self.behaviors[self.distribution.sample(rng)].clone()
    }
}

// ============================================================================
// Sequence
// ============================================================================

/// Emits a fixed list of responses in order, starting over when it runs out.
#[derive(Debug, Clone)]
pub struct SequenceResponder {
    responses: Vec<String>,
    next: usize,
}

impl SequenceResponder {
    /// Creates a responder cycling through `responses`.
    ///
    /// # Errors
    ///
    /// Returns an error if `responses` is empty.
    pub fn new(responses: Vec<String>) -> Result<Self, SimulationError> {
        if responses.is_empty() {
            return Err(SimulationError::Responder(
                "response sequence is empty".to_string(),
            ));
        }
        Ok(Self { responses, next: 0 })
    }
}

impl Responder for SequenceResponder {
    fn respond(&mut self, _stimulus: &Stimulus, _rng: &mut dyn RngCore) -> String {
        let response = self.responses[self.next].clone();
        self.next = (self.next + 1) % self.responses.len();
        response
    }
}
