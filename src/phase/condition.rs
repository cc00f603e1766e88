//! Branches of a phase line.
//!
//! A branch is a comma-separated list of tokens:
//!
//! ```text
//! [actions,] [predicate: [actions,]] destination[, destination...]
//! ```
//!
//! Actions before the predicate always run when the branch is tried. Actions
//! after it run only when the branch is taken. Destinations come last.

use super::action::{Action, parse_action};
use super::branch::{BranchSpec, Destination, Quantity};
use super::counter::CountScope;
use super::line::ParseContext;
use super::runtime::Runtime;
use super::{Declarations, parentheses_balanced, split_top_level, suggest};
use crate::error::{DefinitionErrorKind, PhaseError};
use crate::variables::is_identifier;

/// What a branch tests before it is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// The subject's response equals this behavior
    Response(String),
    /// Boolean expression; bare event names read `count_line`
    Expression(String),
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Response(behavior) => f.write_str(behavior),
            Self::Expression(expr) => f.write_str(expr),
        }
    }
}

/// Decides whether the text before a `:` is a predicate rather than the name
/// of a variable being assigned.
///
/// Behavior names are predicates; so is anything that is not a bare
/// identifier (`b1=3`, `count_line()>=2`, `25`).
#[must_use]
pub fn looks_like_predicate(lhs: &str, declarations: &Declarations) -> bool {
    let lhs = lhs.trim();
    declarations.is_behavior(lhs) || !is_identifier(lhs)
}

/// One branch of a phase line.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    unconditional_actions: Vec<Action>,
    predicate: Option<Predicate>,
    conditional_actions: Vec<Action>,
    goto: BranchSpec,
}

impl Condition {
    /// The branch text as written.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Actions run every time the branch is tried.
    #[must_use]
    pub fn unconditional_actions(&self) -> &[Action] {
        &self.unconditional_actions
    }

    #[must_use]
    pub const fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Actions run only when the branch is taken.
    #[must_use]
    pub fn conditional_actions(&self) -> &[Action] {
        &self.conditional_actions
    }

    #[must_use]
    pub const fn goto(&self) -> &BranchSpec {
        &self.goto
    }

    /// Every action of the branch, unconditional ones first.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.unconditional_actions
            .iter()
            .chain(&self.conditional_actions)
    }

    /// Returns `true` if trying this branch always takes it.
    #[must_use]
    pub fn always_taken(&self) -> bool {
        self.predicate.is_none() && self.goto.is_certain()
    }

    /// Tries the branch. Returns the destination label if it is taken.
    pub(crate) fn resolve(
        &self,
        response: Option<&str>,
        rt: &mut Runtime<'_>,
        lineno: usize,
    ) -> Result<Option<&str>, PhaseError> {
        for action in &self.unconditional_actions {
            rt.perform(action, lineno)?;
        }

        let holds = match &self.predicate {
            None => true,
            Some(Predicate::Response(behavior)) => response == Some(behavior.as_str()),
            Some(Predicate::Expression(expr)) => rt.test(expr, CountScope::Line, lineno)?,
        };
        if !holds {
            return Ok(None);
        }

        let Some(label) = self.goto.resolve(rt, lineno)? else {
            return Ok(None);
        };
        for action in &self.conditional_actions {
            rt.perform(action, lineno)?;
        }
        Ok(Some(label))
    }
}

/// Parses one `|`-separated branch.
pub(crate) fn parse_condition(
    branch: &str,
    ctx: &ParseContext<'_>,
) -> Result<Condition, DefinitionErrorKind> {
    let branch = branch.trim();
    let mut unconditional_actions = Vec::new();
    let mut predicate = None;
    let mut conditional_actions = Vec::new();
    let mut destinations: Vec<Destination> = Vec::new();
    let mut has_bare_label = false;

    for raw in split_top_level(branch, ',') {
        let mut token = raw;

        if let Some((lhs, rhs)) = raw.split_once(':') {
            if looks_like_predicate(lhs, ctx.declarations) {
                if predicate.is_some() {
                    return Err(DefinitionErrorKind::MultiplePredicates(branch.to_string()));
                }
                if !destinations.is_empty() {
                    return Err(DefinitionErrorKind::ConditionAfterLabel(branch.to_string()));
                }
                token = rhs.trim();
                if let Some((second, _)) = token.split_once(':') {
                    if looks_like_predicate(second, ctx.declarations) {
                        return Err(DefinitionErrorKind::MultiplePredicates(branch.to_string()));
                    }
                }
                predicate = Some(parse_predicate(lhs.trim(), ctx)?);
            }
        }
        if token.is_empty() {
            continue;
        }

        if let Some((dest, bare)) = parse_destination(token, ctx)? {
            has_bare_label |= bare;
            destinations.push(dest);
            continue;
        }
        if !destinations.is_empty() {
            return Err(DefinitionErrorKind::ActionAfterLabel(token.to_string()));
        }
        let action = parse_action(token, ctx)?.ok_or_else(|| unknown_label(token, ctx))?;
        if predicate.is_some() {
            conditional_actions.push(action);
        } else {
            unconditional_actions.push(action);
        }
    }

    if destinations.is_empty() {
        return Err(DefinitionErrorKind::MissingDestination(branch.to_string()));
    }
    if has_bare_label && destinations.len() > 1 {
        return Err(DefinitionErrorKind::BareLabelNotAlone(branch.to_string()));
    }

    Ok(Condition {
        source: branch.to_string(),
        unconditional_actions,
        predicate,
        conditional_actions,
        goto: BranchSpec::new(destinations)?,
    })
}

fn parse_predicate(lhs: &str, ctx: &ParseContext<'_>) -> Result<Predicate, DefinitionErrorKind> {
    if ctx.declarations.is_behavior(lhs) {
        return Ok(Predicate::Response(lhs.to_string()));
    }
    // `25:US` is shorthand for `count_line()=25:US`
    if !lhs.is_empty() && lhs.chars().all(|c| c.is_ascii_digit()) {
        return Ok(Predicate::Expression(format!("count_line()={lhs}")));
    }
    ctx.check_expression(lhs)?;
    Ok(Predicate::Expression(lhs.to_string()))
}

/// Parses `LABEL` or `LABEL(probability)`. The flag is `true` for a bare
/// label. Returns `None` for tokens that are not destinations.
fn parse_destination(
    token: &str,
    ctx: &ParseContext<'_>,
) -> Result<Option<(Destination, bool)>, DefinitionErrorKind> {
    if ctx.labels.contains(token) {
        let dest = Destination {
            label: token.to_string(),
            probability: Quantity::Literal(1.0),
        };
        return Ok(Some((dest, true)));
    }

    let Some((name, rest)) = token.split_once('(') else {
        return Ok(None);
    };
    let name = name.trim();
    if name == "count_reset" || !is_identifier(name) {
        return Ok(None);
    }
    if !ctx.labels.contains(name) {
        return Err(unknown_label(name, ctx));
    }

    let probability = rest
        .strip_suffix(')')
        .filter(|inner| parentheses_balanced(inner))
        .ok_or_else(|| DefinitionErrorKind::MalformedParentheses(token.to_string()))?
        .trim();
    if probability.is_empty() {
        return Err(DefinitionErrorKind::InvalidProbability(token.to_string()));
    }
    let invalid = || DefinitionErrorKind::InvalidProbability(probability.to_string());
    let probability = match ctx.quantity(probability, invalid)? {
        Quantity::Literal(p) if !(0.0..=1.0).contains(&p) => return Err(invalid()),
        quantity => quantity,
    };

    let dest = Destination {
        label: name.to_string(),
        probability,
    };
    Ok(Some((dest, false)))
}

fn unknown_label(token: &str, ctx: &ParseContext<'_>) -> DefinitionErrorKind {
    DefinitionErrorKind::UnknownLineLabel {
        label: token.to_string(),
        suggestion: suggest(token, ctx.labels.iter().map(String::as_str)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Value;
    use crate::variables::Variables;
    use indexmap::IndexSet;

    fn declarations() -> Declarations {
        let mut globals = Variables::new();
        globals.set("p", Value::Float(0.25));
        Declarations::new(["e1", "e2"], ["b1", "b2"], globals)
    }

    fn labels() -> IndexSet<String> {
        ["L1", "L2", "L3"].into_iter().map(String::from).collect()
    }

    fn parse(branch: &str) -> Result<Condition, DefinitionErrorKind> {
        let decl = declarations();
        let labels = labels();
        let ctx = ParseContext::new(&decl, &labels);
        parse_condition(branch, &ctx)
    }

    #[test]
    fn test_looks_like_predicate() {
        let decl = declarations();
        assert!(looks_like_predicate("b1", &decl));
        assert!(looks_like_predicate("b1=3", &decl));
        assert!(looks_like_predicate("count_line()>=2", &decl));
        assert!(looks_like_predicate("25", &decl));
        assert!(!looks_like_predicate("x", &decl));
        assert!(!looks_like_predicate("e1", &decl));
    }

    #[test]
    fn test_bare_label() {
        let cond = parse("L2").unwrap();
        assert!(cond.predicate().is_none());
        assert!(cond.always_taken());
        assert_eq!(cond.goto().destinations()[0].label, "L2");
    }

    #[test]
    fn test_response_predicate() {
        let cond = parse("b1: L2").unwrap();
        assert_eq!(cond.predicate(), Some(&Predicate::Response("b1".into())));
        assert!(!cond.always_taken());
    }

    #[test]
    fn test_integer_shorthand() {
        let cond = parse("25:L3").unwrap();
        assert_eq!(
            cond.predicate(),
            Some(&Predicate::Expression("count_line()=25".into()))
        );
    }

    #[test]
    fn test_expression_predicate_with_actions() {
        let cond = parse("x:0, b1=3: y:1, L1(0.5), L2(p)").unwrap();
        assert_eq!(cond.unconditional_actions().len(), 1);
        assert_eq!(cond.conditional_actions().len(), 1);
        assert_eq!(
            cond.predicate(),
            Some(&Predicate::Expression("b1=3".into()))
        );
        let dests = cond.goto().destinations();
        assert_eq!(dests[0].probability, Quantity::Literal(0.5));
        assert_eq!(dests[1].probability, Quantity::Literal(0.25));
    }

    #[test]
    fn test_lazy_probability() {
        let cond = parse("L1(x/2)").unwrap();
        assert_eq!(
            cond.goto().destinations()[0].probability,
            Quantity::Expression("x/2".into())
        );
        assert!(!cond.always_taken());
    }

    #[test]
    fn test_probabilistic_destinations() {
        let cond = parse("b1: L1(0.2), L2(0.3)").unwrap();
        assert_eq!(cond.goto().destinations().len(), 2);
        assert!(!cond.goto().is_certain());
    }

    #[test]
    fn test_second_predicate_in_same_token() {
        for branch in ["b1: b2: L1", "count_line()>1: count(b1)>2: L1", "b1: x:1, b2: L1"] {
            assert!(
                matches!(parse(branch), Err(DefinitionErrorKind::MultiplePredicates(_))),
                "{branch}"
            );
        }
        // a conditional assignment after the predicate is not a second predicate
        assert!(parse("b1: x:1, L1").is_ok());
    }

    #[test]
    fn test_branch_errors() {
        assert!(matches!(
            parse("b1: b2: L1"),
            Err(DefinitionErrorKind::MultiplePredicates(_))
        ));
        assert!(matches!(
            parse("L1(0.5), b1: L2(0.5)"),
            Err(DefinitionErrorKind::ConditionAfterLabel(_))
        ));
        assert!(matches!(
            parse("L1(0.5), x:1"),
            Err(DefinitionErrorKind::ActionAfterLabel(_))
        ));
        assert!(matches!(
            parse("b1: x:1"),
            Err(DefinitionErrorKind::MissingDestination(_))
        ));
        assert!(matches!(
            parse("L1, L2(0.5)"),
            Err(DefinitionErrorKind::BareLabelNotAlone(_))
        ));
        assert!(matches!(
            parse("L1(0.5"),
            Err(DefinitionErrorKind::MalformedParentheses(_))
        ));
        assert!(matches!(
            parse("L1(0.5), L1(0.2)"),
            Err(DefinitionErrorKind::DuplicateDestination(_))
        ));
        assert!(matches!(
            parse("L1(0.7), L2(0.7)"),
            Err(DefinitionErrorKind::ProbabilitySum(_))
        ));
        assert!(matches!(
            parse("L1(2)"),
            Err(DefinitionErrorKind::InvalidProbability(_))
        ));
    }

    #[test]
    fn test_unknown_label_suggests() {
        let err = parse("b1: L4").unwrap_err();
        assert_eq!(
            err,
            DefinitionErrorKind::UnknownLineLabel {
                label: "L4".into(),
                suggestion: Some("L1".into()),
            }
        );
    }

    #[test]
    fn test_empty_branch() {
        assert!(matches!(
            parse(""),
            Err(DefinitionErrorKind::MissingDestination(_))
        ));
    }
}
