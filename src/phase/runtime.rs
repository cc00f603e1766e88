//! Mutable evaluation context lent by a phase instance to its lines.

use rand::RngCore;

use super::action::Action;
use super::counter::{CountScope, EventCounter};
use crate::error::PhaseError;
use crate::expr::{self, Environment, Value};
use crate::variables::{Scope, Variables};

/// Borrowed per-subject state needed to evaluate a phase line.
pub(crate) struct Runtime<'a> {
    pub(crate) globals: &'a Variables,
    pub(crate) locals: &'a mut Variables,
    pub(crate) counter: &'a mut EventCounter,
    pub(crate) rng: &'a mut dyn RngCore,
}

/// Variables first, then event tallies for bare event names.
struct EventScope<'a> {
    variables: Scope<'a>,
    counter: &'a EventCounter,
    scope: CountScope,
}

impl Environment for EventScope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.variables.get(name).or_else(|| {
            self.counter
                .get(name, self.scope)
                .map(|n| Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
        })
    }
}

impl Runtime<'_> {
    /// Evaluates `source` after substituting counter calls. Bare event names
    /// read the tally selected by `scope`.
    pub(crate) fn evaluate(
        &mut self,
        source: &str,
        scope: CountScope,
        lineno: usize,
    ) -> Result<Value, PhaseError> {
        let text = self.counter.substitute_calls(source);
        let env = EventScope {
            variables: Variables::join(self.globals, &*self.locals),
            counter: &*self.counter,
            scope,
        };
        expr::evaluate(&text, &env, &mut *self.rng)
            .map_err(|source| PhaseError::Evaluation { lineno, source })
    }

    /// Evaluates a condition that must produce a boolean.
    pub(crate) fn test(
        &mut self,
        source: &str,
        scope: CountScope,
        lineno: usize,
    ) -> Result<bool, PhaseError> {
        self.evaluate(source, scope, lineno)?
            .as_bool()
            .ok_or_else(|| PhaseError::NotBoolean {
                lineno,
                condition: source.to_string(),
            })
    }

    /// Evaluates a numeric quantity (probability or intensity).
    pub(crate) fn number(
        &mut self,
        source: &str,
        lineno: usize,
    ) -> Result<Option<f64>, PhaseError> {
        let value = self.evaluate(source, CountScope::Line, lineno)?;
        Ok(match value {
            Value::Bool(_) => None,
            other => Some(other.as_f64()),
        })
    }

    /// Performs an action of a phase line.
    pub(crate) fn perform(&mut self, action: &Action, lineno: usize) -> Result<(), PhaseError> {
        match action {
            Action::Assign { name, expression } => {
                let value = self.evaluate(expression, CountScope::Line, lineno)?;
                self.locals.set(name.clone(), value);
            }
            Action::CountReset(event) => self.counter.reset(event)?,
        }
        Ok(())
    }
}
