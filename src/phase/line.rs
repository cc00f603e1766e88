//! Phase lines.
//!
//! ```text
//! LABEL  STIMULUS-OR-ACTION  |  BRANCH  |  BRANCH  ...
//! ```
//!
//! The head is either a stimulus (one or more elements, each with an optional
//! intensity) or a single action, which makes the line a help line: it is
//! passed through without presenting anything to the subject.

use indexmap::IndexSet;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::action::{Action, parse_action};
use super::branch::Quantity;
use super::condition::{Condition, Predicate, parse_condition};
use super::counter::{CountScope, blank_calls, count_calls};
use super::runtime::Runtime;
use super::{Declarations, Stimulus, parentheses_balanced, split_top_level, unquote};
use crate::error::{DefinitionErrorKind, PhaseError};
use crate::expr::{Expression, Value};

// ============================================================================
// Parse context
// ============================================================================

/// Names visible while a phase's lines are parsed.
pub(crate) struct ParseContext<'a> {
    pub(crate) declarations: &'a Declarations,
    pub(crate) labels: &'a IndexSet<String>,
}

impl<'a> ParseContext<'a> {
    pub(crate) const fn new(declarations: &'a Declarations, labels: &'a IndexSet<String>) -> Self {
        Self {
            declarations,
            labels,
        }
    }

    /// Returns `true` if `name` is counted: a stimulus element, a behavior
    /// or a line label of the phase.
    pub(crate) fn is_event(&self, name: &str) -> bool {
        self.declarations.is_stimulus_element(name)
            || self.declarations.is_behavior(name)
            || self.labels.contains(name)
    }

    /// Syntax-checks an expression. Counter calls must name known events and
    /// are replaced by `0` before parsing.
    pub(crate) fn check_expression(&self, text: &str) -> Result<Expression, DefinitionErrorKind> {
        for call in count_calls(text) {
            let function = match call.scope {
                CountScope::Cumulative => "count",
                CountScope::Line => "count_line",
            };
            match call.event {
                Some(event) if self.is_event(event) => {}
                // count_line() reads the current line
                None if function == "count_line" => {}
                event => {
                    return Err(DefinitionErrorKind::UnknownCountEvent {
                        function: function.to_string(),
                        event: event.unwrap_or_default().to_string(),
                    });
                }
            }
        }
        Expression::parse(&blank_calls(text)).map_err(DefinitionErrorKind::InvalidExpression)
    }

    /// Value of `text` if it depends on global variables alone.
    fn constant(&self, text: &str) -> Result<Option<Value>, DefinitionErrorKind> {
        let expr = self.check_expression(text)?;
        let globals = self.declarations.globals();
        if !count_calls(text).is_empty()
            || expr.has_calls()
            || !expr.identifiers().iter().all(|name| globals.contains(name))
        {
            return Ok(None);
        }
        // Constant expressions never draw from the generator.
        let mut rng = StdRng::seed_from_u64(0);
        expr.evaluate(globals, &mut rng)
            .map(Some)
            .map_err(DefinitionErrorKind::InvalidExpression)
    }

    /// A probability or intensity: literal when it can be computed now,
    /// otherwise kept for evaluation at run time. A constant boolean is
    /// rejected with `invalid`.
    pub(crate) fn quantity(
        &self,
        text: &str,
        invalid: impl FnOnce() -> DefinitionErrorKind,
    ) -> Result<Quantity, DefinitionErrorKind> {
        match self.constant(text)? {
            Some(Value::Bool(_)) => Err(invalid()),
            Some(value) => Ok(Quantity::Literal(value.as_f64())),
            None => Ok(Quantity::Expression(text.to_string())),
        }
    }
}

// ============================================================================
// Stimulus heads
// ============================================================================

/// The stimulus a line presents, before intensities are evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusSpec {
    elements: Vec<(String, Quantity)>,
}

impl StimulusSpec {
    /// Elements and their intensities, in script order.
    #[must_use]
    pub fn elements(&self) -> &[(String, Quantity)] {
        &self.elements
    }

    /// Element names, in script order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().map(|(name, _)| name.as_str())
    }

    fn resolve(&self, rt: &mut Runtime<'_>, lineno: usize) -> Result<Stimulus, PhaseError> {
        let mut stimulus = Stimulus::default();
        for (element, intensity) in &self.elements {
            let value = match intensity {
                Quantity::Literal(x) => *x,
                Quantity::Expression(expression) => {
                    rt.number(expression, lineno)?
                        .ok_or_else(|| PhaseError::InvalidIntensity {
                            lineno,
                            element: element.clone(),
                            expression: expression.clone(),
                        })?
                }
            };
            stimulus.insert(element.clone(), value);
        }
        Ok(stimulus)
    }
}

// ============================================================================
// Line
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Head {
    Stimulus(StimulusSpec),
    Help(Option<Action>),
}

/// One labeled row of a phase.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    label: String,
    lineno: usize,
    source: String,
    head: Head,
    conditions: Vec<Condition>,
}

impl Line {
    /// Parses the text that follows `label` on a phase line.
    pub(crate) fn parse(
        label: &str,
        lineno: usize,
        text: &str,
        ctx: &ParseContext<'_>,
    ) -> Result<Self, DefinitionErrorKind> {
        let (head, tail) = text
            .split_once('|')
            .ok_or(DefinitionErrorKind::MissingSeparator)?;
        if tail.trim().is_empty() {
            return Err(DefinitionErrorKind::NoConditions(label.to_string()));
        }

        let head = parse_head(head.trim(), ctx)?;
        let conditions = split_top_level(tail, '|')
            .into_iter()
            .map(|branch| parse_condition(branch, ctx))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some((_, init)) = conditions.split_last() {
            if let Some(blocking) = init.iter().find(|c| c.always_taken()) {
                return Err(DefinitionErrorKind::UnreachableBranch(
                    blocking.source().to_string(),
                ));
            }
        }
        if matches!(head, Head::Help(_))
            && conditions
                .iter()
                .any(|c| matches!(c.predicate(), Some(Predicate::Response(_))))
        {
            return Err(DefinitionErrorKind::ResponseOnHelpLine);
        }

        Ok(Self {
            label: label.to_string(),
            lineno,
            source: text.trim().to_string(),
            head,
            conditions,
        })
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Script line this row was defined on.
    #[must_use]
    pub const fn lineno(&self) -> usize {
        self.lineno
    }

    /// Text after the label, as written.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub const fn is_help_line(&self) -> bool {
        matches!(self.head, Head::Help(_))
    }

    /// Stimulus presented by this line, `None` for help lines.
    #[must_use]
    pub const fn stimulus(&self) -> Option<&StimulusSpec> {
        match &self.head {
            Head::Stimulus(spec) => Some(spec),
            Head::Help(_) => None,
        }
    }

    /// Action performed by a help line.
    #[must_use]
    pub const fn action(&self) -> Option<&Action> {
        match &self.head {
            Head::Help(action) => action.as_ref(),
            Head::Stimulus(_) => None,
        }
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Every action on the line, help action first.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.action()
            .into_iter()
            .chain(self.conditions.iter().flat_map(Condition::actions))
    }

    /// Tries the branches in order and returns the label of the first one
    /// taken.
    pub(crate) fn next_label(
        &self,
        response: Option<&str>,
        rt: &mut Runtime<'_>,
    ) -> Result<&str, PhaseError> {
        for condition in &self.conditions {
            if let Some(label) = condition.resolve(response, rt, self.lineno)? {
                return Ok(label);
            }
        }
        let conditions = self
            .conditions
            .iter()
            .map(Condition::source)
            .collect::<Vec<_>>()
            .join(" | ");
        Err(PhaseError::NoConditionMet {
            lineno: self.lineno,
            conditions,
            response: response.unwrap_or_default().to_string(),
        })
    }

    /// Runs the help action, if any.
    pub(crate) fn perform(&self, rt: &mut Runtime<'_>) -> Result<(), PhaseError> {
        match self.action() {
            Some(action) => rt.perform(action, self.lineno),
            None => Ok(()),
        }
    }

    /// Evaluates the stimulus intensities. Help lines yield `None`.
    pub(crate) fn resolve_stimulus(
        &self,
        rt: &mut Runtime<'_>,
    ) -> Result<Option<Stimulus>, PhaseError> {
        self.stimulus()
            .map(|spec| spec.resolve(rt, self.lineno))
            .transpose()
    }
}

fn parse_head(head: &str, ctx: &ParseContext<'_>) -> Result<Head, DefinitionErrorKind> {
    if head.is_empty() {
        return Ok(Head::Help(None));
    }

    let inner = head
        .strip_prefix('(')
        .and_then(|h| h.strip_suffix(')'))
        .filter(|h| parentheses_balanced(h))
        .unwrap_or(head);
    let tokens = split_top_level(inner, ',');

    if let [token] = tokens.as_slice() {
        let (name, _) = split_element(token);
        if !ctx.declarations.is_stimulus_element(name) {
            return parse_action(token, ctx)?
                .map(|action| Head::Help(Some(action)))
                .ok_or_else(|| DefinitionErrorKind::UnknownStimulusOrAction((*token).to_string()));
        }
    }

    let mut elements: Vec<(String, Quantity)> = Vec::with_capacity(tokens.len());
    for token in tokens {
        let (name, intensity) = split_element(token);
        if !ctx.declarations.is_stimulus_element(name) {
            return Err(DefinitionErrorKind::ExpectedStimulusElement(token.to_string()));
        }
        if elements.iter().any(|(e, _)| e == name) {
            return Err(DefinitionErrorKind::DuplicateStimulusElement(name.to_string()));
        }
        let intensity = match intensity {
            None => Quantity::Literal(1.0),
            Some(text) => {
                let invalid = || DefinitionErrorKind::InvalidIntensity {
                    element: name.to_string(),
                    intensity: text.to_string(),
                };
                if text.is_empty() {
                    return Err(invalid());
                }
                ctx.quantity(text, invalid)?
            }
        };
        elements.push((name.to_string(), intensity));
    }
    Ok(Head::Stimulus(StimulusSpec { elements }))
}

/// Splits `name[intensity]` or `name:intensity`. The name is unquoted.
fn split_element(token: &str) -> (&str, Option<&str>) {
    if let Some((name, rest)) = token.split_once('[') {
        if let Some(intensity) = rest.strip_suffix(']') {
            return (unquote(name), Some(intensity.trim()));
        }
    }
    if let Some((name, intensity)) = token.split_once(':') {
        return (unquote(name), Some(intensity.trim()));
    }
    (unquote(token), None)
}
