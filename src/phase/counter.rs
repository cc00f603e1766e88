//! Per-subject event counting.
//!
//! Every stimulus element, behavior and line label of a phase is an event.
//! Two tallies are kept per event: `count`, which only `count_reset(event)`
//! clears, and `count_line`, which is cleared whenever the active line
//! changes.

use std::borrow::Cow;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::{Captures, Regex};
use thiserror::Error;

use super::unquote;

/// Matches `count(e)`, `count_line(e)` and `count_line()`.
static COUNT_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(count_line|count)\(\s*([^()]*?)\s*\)").expect("valid regex")
});

/// An event name that the counter was not constructed with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown event '{0}'.")]
pub struct UnknownEvent(pub String);

/// Which tally a bare event name or call refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountScope {
    /// `count(e)`: since phase start or the last `count_reset(e)`
    Cumulative,
    /// `count_line(e)`: since the current line was entered
    Line,
}

/// A `count(...)` or `count_line(...)` call found in expression text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountCall<'a> {
    /// Which tally is read
    pub scope: CountScope,
    /// Event argument, quotes removed; `None` for an empty argument list
    pub event: Option<&'a str>,
}

/// Returns every counter call in `expr`, in order.
#[must_use]
pub fn count_calls(expr: &str) -> Vec<CountCall<'_>> {
    COUNT_CALL
        .captures_iter(expr)
        .map(|caps| call_of(&caps))
        .collect()
}

/// Replaces every counter call in `expr` with `0`.
///
/// Used to syntax-check expressions before any counts exist.
#[must_use]
pub fn blank_calls(expr: &str) -> Cow<'_, str> {
    COUNT_CALL.replace_all(expr, "0")
}

fn call_of<'a>(caps: &Captures<'a>) -> CountCall<'a> {
    let scope = if caps.get(1).map(|m| m.as_str()) == Some("count") {
        CountScope::Cumulative
    } else {
        CountScope::Line
    };
    let event = caps
        .get(2)
        .map(|m| unquote(m.as_str()))
        .filter(|e| !e.is_empty());
    CountCall { scope, event }
}

/// Event tallies for one phase instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCounter {
    count: IndexMap<String, u64>,
    count_line: IndexMap<String, u64>,
    line_label: Option<String>,
}

impl EventCounter {
    /// Creates a counter for the given events, all at zero.
    #[must_use]
    pub fn new<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let count: IndexMap<String, u64> = events.into_iter().map(|e| (e.into(), 0)).collect();
        let count_line = count.clone();
        Self {
            count,
            count_line,
            line_label: None,
        }
    }

    /// Returns `true` if `event` is counted.
    #[must_use]
    pub fn knows(&self, event: &str) -> bool {
        self.count.contains_key(event)
    }

    /// Adds one to the cumulative tally of `event`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownEvent`] if `event` was not declared.
    pub fn increment(&mut self, event: &str) -> Result<(), UnknownEvent> {
        let slot = self
            .count
            .get_mut(event)
            .ok_or_else(|| UnknownEvent(event.to_string()))?;
        *slot += 1;
        Ok(())
    }

    /// Adds one to the per-line tally of `event`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownEvent`] if `event` was not declared.
    pub fn increment_line(&mut self, event: &str) -> Result<(), UnknownEvent> {
        let slot = self
            .count_line
            .get_mut(event)
            .ok_or_else(|| UnknownEvent(event.to_string()))?;
        *slot += 1;
        Ok(())
    }

    /// Increments both tallies of `event`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownEvent`] if `event` was not declared.
    pub fn record(&mut self, event: &str) -> Result<(), UnknownEvent> {
        self.increment(event)?;
        self.increment_line(event)
    }

    /// Clears the cumulative tally of `event`. The per-line tally is kept.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownEvent`] if `event` was not declared.
    pub fn reset(&mut self, event: &str) -> Result<(), UnknownEvent> {
        let slot = self
            .count
            .get_mut(event)
            .ok_or_else(|| UnknownEvent(event.to_string()))?;
        *slot = 0;
        Ok(())
    }

    /// Clears every per-line tally.
    pub fn reset_line(&mut self) {
        self.count_line.values_mut().for_each(|v| *v = 0);
    }

    /// Makes `label` the line counted against, clearing the per-line tallies
    /// if it differs from the current one. Returns `true` on a change.
    pub fn enter_line(&mut self, label: &str) -> bool {
        if self.line_label.as_deref() == Some(label) {
            return false;
        }
        self.reset_line();
        self.line_label = Some(label.to_string());
        true
    }

    /// Label of the line counted against.
    #[must_use]
    pub fn line_label(&self) -> Option<&str> {
        self.line_label.as_deref()
    }

    /// Cumulative tally of `event`.
    #[must_use]
    pub fn count(&self, event: &str) -> Option<u64> {
        self.count.get(event).copied()
    }

    /// Per-line tally of `event`.
    #[must_use]
    pub fn count_line(&self, event: &str) -> Option<u64> {
        self.count_line.get(event).copied()
    }

    /// How many times the current line has been visited since it was entered.
    #[must_use]
    pub fn current_line_count(&self) -> u64 {
        self.line_label
            .as_deref()
            .and_then(|label| self.count_line(label))
            .unwrap_or(0)
    }

    /// Tally of `event` in the given scope.
    #[must_use]
    pub fn get(&self, event: &str, scope: CountScope) -> Option<u64> {
        match scope {
            CountScope::Cumulative => self.count(event),
            CountScope::Line => self.count_line(event),
        }
    }

    /// Rewrites every `count(e)`, `count_line(e)` and `count_line()` in
    /// `expr` with the current tally.
    ///
    /// Calls naming an unknown event, and `count()` without an argument, are
    /// left untouched so the evaluator reports them.
    #[must_use]
    pub fn substitute_calls<'e>(&self, expr: &'e str) -> Cow<'e, str> {
        COUNT_CALL.replace_all(expr, |caps: &Captures<'_>| {
            let call = call_of(caps);
            let value = match (call.scope, call.event) {
                (CountScope::Line, None) => Some(self.current_line_count()),
                (scope, Some(event)) => self.get(event, scope),
                (CountScope::Cumulative, None) => None,
            };
            value.map_or_else(|| caps[0].to_string(), |v| v.to_string())
        })
    }
}
