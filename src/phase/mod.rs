//! Phase definitions and the stimulus-response state machine.
//!
//! A phase is a table of labeled lines. Each line presents a stimulus (or
//! performs a bookkeeping action, for "help lines") and then picks the next
//! line from an if/elif chain of branches that test the subject's response,
//! event counters, variables, or chance.
//!
//! [`PhaseDefinition`]s are parsed once and shared. Every subject gets its
//! own [`PhaseInstance`] per phase, and walks a [`World`] of them.

pub mod action;
pub mod branch;
pub mod condition;
pub mod counter;
pub mod definition;
pub mod instance;
pub mod line;
pub(crate) mod runtime;
pub mod stop;
pub mod world;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::variables::Variables;

pub use action::Action;
pub use branch::{BranchSpec, Destination, Quantity};
pub use condition::{Condition, Predicate, looks_like_predicate};
pub use counter::{CountScope, EventCounter};
pub use definition::{PhaseBuilder, PhaseDefinition, PhaseRegistry, RegistryBuilder};
pub use instance::{PhaseInstance, PhaseStep, Presentation};
pub use line::{Line, StimulusSpec};
pub use stop::StopCondition;
pub use world::{World, WorldStep};

/// Names declared by an experiment and shared by all of its phases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declarations {
    stimulus_elements: IndexSet<String>,
    behaviors: IndexSet<String>,
    globals: Variables,
}

impl Declarations {
    /// Creates the declarations of an experiment.
    #[must_use]
    pub fn new<S, B>(stimulus_elements: S, behaviors: B, globals: Variables) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        Self {
            stimulus_elements: stimulus_elements.into_iter().map(Into::into).collect(),
            behaviors: behaviors.into_iter().map(Into::into).collect(),
            globals,
        }
    }

    #[must_use]
    pub fn is_stimulus_element(&self, name: &str) -> bool {
        self.stimulus_elements.contains(name)
    }

    #[must_use]
    pub fn is_behavior(&self, name: &str) -> bool {
        self.behaviors.contains(name)
    }

    /// Declared stimulus elements, in declaration order.
    pub fn stimulus_elements(&self) -> impl Iterator<Item = &str> {
        self.stimulus_elements.iter().map(String::as_str)
    }

    /// Declared behaviors, in declaration order.
    pub fn behaviors(&self) -> impl Iterator<Item = &str> {
        self.behaviors.iter().map(String::as_str)
    }

    /// Global variables.
    #[must_use]
    pub const fn globals(&self) -> &Variables {
        &self.globals
    }
}

/// A presented stimulus: stimulus elements with their intensities, in the
/// order the phase line lists them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Stimulus {
    elements: IndexMap<String, f64>,
}

impl Stimulus {
    /// Element names, in presentation order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.elements.keys().map(String::as_str).collect()
    }

    /// Intensity of `element`, if it is part of the stimulus.
    #[must_use]
    pub fn intensity(&self, element: &str) -> Option<f64> {
        self.elements.get(element).copied()
    }

    #[must_use]
    pub fn contains(&self, element: &str) -> bool {
        self.elements.contains_key(element)
    }

    /// Elements with intensities, in presentation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.elements.iter().map(|(k, v)| (k.as_str(), *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub(crate) fn insert(&mut self, element: impl Into<String>, intensity: f64) {
        self.elements.insert(element.into(), intensity);
    }
}

impl std::fmt::Display for Stimulus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (name, intensity)) in self.elements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if (*intensity - 1.0).abs() < f64::EPSILON {
                f.write_str(name)?;
            } else {
                write!(f, "{name}[{intensity}]")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Token helpers shared by the line grammar
// ============================================================================

/// Splits `text` on `separator`, ignoring separators nested in `()` or `[]`.
/// Pieces are trimmed.
pub(crate) fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            c if c == separator && depth == 0 => {
                pieces.push(text[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(text[start..].trim());
    pieces
}

/// Returns `true` if every `(` in `text` is closed by a later `)`.
pub(crate) fn parentheses_balanced(text: &str) -> bool {
    let mut depth = 0i32;
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Strips one pair of matching single or double quotes.
pub(crate) fn unquote(text: &str) -> &str {
    let text = text.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    text
}

/// Closest candidate within a Damerau-Levenshtein distance of 3.
pub(crate) fn suggest<'a, I>(input: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .map(|c| (c, strsim::damerau_levenshtein(input, c)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by_key(|(_, dist)| *dist)
        .map(|(name, _)| name.to_string())
}
