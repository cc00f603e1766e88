//! Phase stop conditions.

use super::counter::CountScope;
use super::line::ParseContext;
use super::runtime::Runtime;
use crate::error::{DefinitionErrorKind, PhaseError};

/// Boolean expression ending a phase, such as `reward=23` or
/// `count(trial)>=50`.
///
/// Bare event names read the cumulative `count` tally. The condition is
/// tested before each step, once a stimulus has been presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopCondition {
    source: String,
    lineno: usize,
}

impl StopCondition {
    pub(crate) fn parse(
        source: &str,
        lineno: usize,
        ctx: &ParseContext<'_>,
    ) -> Result<Self, DefinitionErrorKind> {
        let source = source.trim();
        ctx.check_expression(source)?;
        Ok(Self {
            source: source.to_string(),
            lineno,
        })
    }

    /// Condition text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Line of the `@phase` header.
    #[must_use]
    pub const fn lineno(&self) -> usize {
        self.lineno
    }

    pub(crate) fn is_met(&self, rt: &mut Runtime<'_>) -> Result<bool, PhaseError> {
        rt.test(&self.source, CountScope::Cumulative, self.lineno)
    }
}

impl std::fmt::Display for StopCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}
