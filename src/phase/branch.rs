//! Goto lists: the destination labels of a branch and their probabilities.

use rand::Rng;

use super::runtime::Runtime;
use crate::error::{DefinitionErrorKind, PhaseError};

/// Slack allowed when probabilities are summed, so `0.1 + 0.2 + 0.7` is 1.
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// A number that is either known when the script is compiled or evaluated
/// each time it is needed.
#[derive(Debug, Clone, PartialEq)]
pub enum Quantity {
    /// Known value
    Literal(f64),
    /// Expression over variables and counters
    Expression(String),
}

impl Quantity {
    /// The value, if it is known without evaluation.
    #[must_use]
    pub const fn literal(&self) -> Option<f64> {
        match self {
            Self::Literal(x) => Some(*x),
            Self::Expression(_) => None,
        }
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(x) => write!(f, "{x}"),
            Self::Expression(e) => f.write_str(e),
        }
    }
}

/// One destination of a branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    /// Line label to go to
    pub label: String,
    /// Chance of going there when the branch is taken
    pub probability: Quantity,
}

/// Ordered destinations of one branch.
///
/// When the branch is tried, a single uniform draw in `[0, 1)` picks the
/// first destination whose cumulative probability exceeds it. If the
/// probabilities sum to less than 1 the draw can land past every destination,
/// and the branch is then not taken.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchSpec {
    destinations: Vec<Destination>,
}

impl BranchSpec {
    /// Builds a goto list, checking the literal probabilities.
    pub(crate) fn new(destinations: Vec<Destination>) -> Result<Self, DefinitionErrorKind> {
        let mut sum = 0.0;
        for (i, dest) in destinations.iter().enumerate() {
            if destinations[..i].iter().any(|d| d.label == dest.label) {
                return Err(DefinitionErrorKind::DuplicateDestination(dest.label.clone()));
            }
            if let Some(p) = dest.probability.literal() {
                if !(0.0..=1.0).contains(&p) {
                    return Err(DefinitionErrorKind::InvalidProbability(p.to_string()));
                }
                sum += p;
            }
        }
        if sum > 1.0 + PROBABILITY_TOLERANCE {
            return Err(DefinitionErrorKind::ProbabilitySum(sum));
        }
        Ok(Self { destinations })
    }

    /// Destinations in script order.
    #[must_use]
    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    /// Returns `true` if the branch is always taken once its predicate holds:
    /// all probabilities are literal and add up to 1.
    #[must_use]
    pub fn is_certain(&self) -> bool {
        let mut sum = 0.0;
        for dest in &self.destinations {
            match dest.probability.literal() {
                Some(p) => sum += p,
                None => return false,
            }
        }
        (sum - 1.0).abs() <= PROBABILITY_TOLERANCE
    }

    /// Picks the destination, or `None` if the draw falls in the unallocated
    /// probability mass.
    pub(crate) fn resolve(
        &self,
        rt: &mut Runtime<'_>,
        lineno: usize,
    ) -> Result<Option<&str>, PhaseError> {
        if let [only] = self.destinations.as_slice() {
            if only
                .probability
                .literal()
                .is_some_and(|p| (p - 1.0).abs() <= PROBABILITY_TOLERANCE)
            {
                return Ok(Some(&only.label));
            }
        }

        let mut probabilities = Vec::with_capacity(self.destinations.len());
        let mut sum = 0.0;
        for dest in &self.destinations {
            let p = match &dest.probability {
                Quantity::Literal(p) => *p,
                Quantity::Expression(expression) => {
                    let value = rt.number(expression, lineno)?;
                    match value {
                        Some(p) if (0.0..=1.0).contains(&p) => p,
                        _ => {
                            return Err(PhaseError::InvalidProbability {
                                lineno,
                                expression: expression.clone(),
                                value: value.map_or_else(|| "a boolean".to_string(), |v| v.to_string()),
                            });
                        }
                    }
                }
            };
            sum += p;
            probabilities.push(p);
        }
        if sum > 1.0 + PROBABILITY_TOLERANCE {
            return Err(PhaseError::ProbabilitySum { lineno, sum });
        }

        let draw: f64 = rt.rng.random();
        let mut cumulative = 0.0;
        for (dest, p) in self.destinations.iter().zip(probabilities) {
            cumulative += p;
            if draw < cumulative {
                return Ok(Some(&dest.label));
            }
        }
        Ok(None)
    }
}
