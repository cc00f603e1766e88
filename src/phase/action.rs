//! Actions performed by phase lines: local variable assignment and counter
//! resets.

use super::line::ParseContext;
use super::unquote;
use crate::error::DefinitionErrorKind;
use crate::variables::{is_identifier, is_keyword};

/// A side effect run when a help line is visited or a branch is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `name:expression` or `name=expression`
    Assign {
        /// Local variable being assigned
        name: String,
        /// Expression text, evaluated at run time
        expression: String,
    },
    /// `count_reset(event)`
    CountReset(String),
}

impl Action {
    /// Name of the local variable this action assigns, if any.
    #[must_use]
    pub fn assigned_variable(&self) -> Option<&str> {
        match self {
            Self::Assign { name, .. } => Some(name),
            Self::CountReset(_) => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assign { name, expression } => write!(f, "{name}:{expression}"),
            Self::CountReset(event) => write!(f, "count_reset({event})"),
        }
    }
}

/// Parses `token` as an action.
///
/// Returns `Ok(None)` when the token does not have the shape of an action, so
/// the caller can report it in its own terms. A token that is shaped like an
/// action but breaks a rule is an error.
pub(crate) fn parse_action(
    token: &str,
    ctx: &ParseContext<'_>,
) -> Result<Option<Action>, DefinitionErrorKind> {
    let token = token.trim();

    if let Some(rest) = token
        .strip_prefix("count_reset")
        .map(str::trim_start)
        .filter(|rest| rest.starts_with('('))
    {
        let inner = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .filter(|inner| !inner.contains(['(', ')']))
            .ok_or_else(|| DefinitionErrorKind::MalformedParentheses(token.to_string()))?;
        let event = unquote(inner);
        if !ctx.is_event(event) {
            return Err(DefinitionErrorKind::UnknownCountResetEvent(event.to_string()));
        }
        return Ok(Some(Action::CountReset(event.to_string())));
    }

    let Some((name, expression)) = split_assignment(token) else {
        return Ok(None);
    };
    if !is_identifier(name) {
        return Ok(None);
    }
    check_variable_name(name, ctx)?;
    ctx.check_expression(expression)?;
    Ok(Some(Action::Assign {
        name: name.to_string(),
        expression: expression.to_string(),
    }))
}

/// Splits `x:expr` or `x=expr` (but not `x==expr`, `x<=expr`, ...).
fn split_assignment(token: &str) -> Option<(&str, &str)> {
    if let Some((name, expression)) = token.split_once(':') {
        return Some((name.trim(), expression.trim()));
    }
    let idx = token.find('=')?;
    let before = token[..idx].chars().last();
    let after = token[idx + 1..].chars().next();
    if matches!(before, Some('!' | '<' | '>' | '=')) || after == Some('=') {
        return None;
    }
    Some((token[..idx].trim(), token[idx + 1..].trim()))
}

fn check_variable_name(name: &str, ctx: &ParseContext<'_>) -> Result<(), DefinitionErrorKind> {
    let invalid = |reason: &str| {
        Err(DefinitionErrorKind::InvalidVariableName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if ctx.declarations.globals().contains(name) {
        return Err(DefinitionErrorKind::ModifiesGlobalVariable(name.to_string()));
    }
    if is_keyword(name) {
        return invalid("is a reserved word");
    }
    if ctx.declarations.is_stimulus_element(name) {
        return invalid("is the name of a stimulus element");
    }
    if ctx.declarations.is_behavior(name) {
        return invalid("is the name of a behavior");
    }
    if ctx.labels.contains(name) {
        return invalid("is the label of a phase line");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Value;
    use crate::phase::Declarations;
    use crate::variables::Variables;
    use indexmap::IndexSet;

    fn declarations() -> Declarations {
        let mut globals = Variables::new();
        globals.set("g", Value::Int(1));
        Declarations::new(["e1", "e2"], ["b1", "b2"], globals)
    }

    fn labels() -> IndexSet<String> {
        ["L1", "L2"].into_iter().map(String::from).collect()
    }

    #[test]
    fn test_parse_assignments() {
        let decl = declarations();
        let labels = labels();
        let ctx = ParseContext::new(&decl, &labels);

        assert_eq!(
            parse_action("x:0", &ctx).unwrap(),
            Some(Action::Assign {
                name: "x".into(),
                expression: "0".into()
            })
        );
        assert_eq!(
            parse_action("x = x + 1", &ctx).unwrap(),
            Some(Action::Assign {
                name: "x".into(),
                expression: "x + 1".into()
            })
        );
    }

    #[test]
    fn test_parse_count_reset() {
        let decl = declarations();
        let labels = labels();
        let ctx = ParseContext::new(&decl, &labels);

        assert_eq!(
            parse_action("count_reset(b1)", &ctx).unwrap(),
            Some(Action::CountReset("b1".into()))
        );
        assert_eq!(
            parse_action("count_reset('L2')", &ctx).unwrap(),
            Some(Action::CountReset("L2".into()))
        );
        assert_eq!(
            parse_action("count_reset(e99)", &ctx).unwrap_err(),
            DefinitionErrorKind::UnknownCountResetEvent("e99".into())
        );
    }

    #[test]
    fn test_non_actions() {
        let decl = declarations();
        let labels = labels();
        let ctx = ParseContext::new(&decl, &labels);

        assert_eq!(parse_action("L1", &ctx).unwrap(), None);
        assert_eq!(parse_action("b1==3", &ctx).unwrap(), None);
        assert_eq!(parse_action("x<=3", &ctx).unwrap(), None);
        assert_eq!(parse_action("count_line()=3", &ctx).unwrap(), None);
    }

    #[test]
    fn test_assignment_name_rules() {
        let decl = declarations();
        let labels = labels();
        let ctx = ParseContext::new(&decl, &labels);

        assert_eq!(
            parse_action("g:2", &ctx).unwrap_err(),
            DefinitionErrorKind::ModifiesGlobalVariable("g".into())
        );
        assert!(matches!(
            parse_action("e1:2", &ctx),
            Err(DefinitionErrorKind::InvalidVariableName { .. })
        ));
        assert!(matches!(
            parse_action("L1:2", &ctx),
            Err(DefinitionErrorKind::InvalidVariableName { .. })
        ));
        assert!(matches!(
            parse_action("rand:2", &ctx),
            Err(DefinitionErrorKind::InvalidVariableName { .. })
        ));
    }

    #[test]
    fn test_assignment_expression_is_checked() {
        let decl = declarations();
        let labels = labels();
        let ctx = ParseContext::new(&decl, &labels);

        assert!(matches!(
            parse_action("x:1+/2", &ctx),
            Err(DefinitionErrorKind::InvalidExpression(_))
        ));
        assert!(matches!(
            parse_action("x:count(nope)", &ctx),
            Err(DefinitionErrorKind::UnknownCountEvent { .. })
        ));
    }

    #[test]
    fn test_display() {
        let action = Action::Assign {
            name: "x".into(),
            expression: "x+1".into(),
        };
        assert_eq!(action.to_string(), "x:x+1");
        assert_eq!(Action::CountReset("b1".into()).to_string(), "count_reset(b1)");
    }
}
