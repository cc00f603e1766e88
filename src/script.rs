//! Phase script compiler.
//!
//! A script is a sequence of `@phase` blocks:
//!
//! ```text
//! @phase fixed_ratio stop:reward=23
//! LEVER   lever  | count_line(R)=4: REWARD | LEVER
//! REWARD  reward | LEVER
//!
//! @phase extinction(fixed_ratio) stop:lever=50
//! REWARD  lever  | LEVER                # replaces the inherited REWARD line
//! ```
//!
//! `#` starts a comment. Blank lines are ignored. Line numbers in errors are
//! 1-based positions in the script text.

use crate::error::{DefinitionError, DefinitionErrorKind};
use crate::phase::{Declarations, PhaseBuilder, PhaseRegistry, RegistryBuilder};

/// Keyword opening a phase block. Matched case-insensitively.
pub const PHASE_KEYWORD: &str = "@phase";

/// A parsed `@phase` header.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Header<'a> {
    label: &'a str,
    parent: Option<&'a str>,
    stop: &'a str,
}

/// Compiles a phase script into a registry.
///
/// # Errors
///
/// Returns the first definition error found. No registry is produced if any
/// phase fails to compile.
pub fn compile(script: &str, declarations: Declarations) -> Result<PhaseRegistry, DefinitionError> {
    let mut registry = RegistryBuilder::new(declarations);
    let mut current: Option<PhaseBuilder> = None;

    for (index, raw) in script.lines().enumerate() {
        let lineno = index + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = phase_keyword(line) {
            if let Some(builder) = current.take() {
                registry.define(builder)?;
            }
            let header =
                parse_header(rest).map_err(|kind| DefinitionError::new(lineno, kind))?;
            current = Some(registry.begin(header.label, header.parent, lineno, header.stop)?);
            continue;
        }

        match current.as_mut() {
            Some(builder) => builder.add_line(lineno, line)?,
            None => {
                return Err(DefinitionError::new(
                    lineno,
                    DefinitionErrorKind::LineOutsidePhase,
                ));
            }
        }
    }

    if let Some(builder) = current {
        registry.define(builder)?;
    }
    let registry = registry.finish();
    tracing::debug!(phases = registry.len(), "phase script compiled");
    Ok(registry)
}

fn strip_comment(line: &str) -> &str {
    line.split_once('#').map_or(line, |(code, _)| code)
}

/// Returns the text after `@phase` if `line` opens a phase block.
fn phase_keyword(line: &str) -> Option<&str> {
    let (keyword, rest) = line
        .split_once(char::is_whitespace)
        .unwrap_or((line, ""));
    keyword
        .eq_ignore_ascii_case(PHASE_KEYWORD)
        .then(|| rest.trim())
}

fn parse_header(rest: &str) -> Result<Header<'_>, DefinitionErrorKind> {
    if rest.is_empty() {
        return Err(DefinitionErrorKind::PhaseHeader);
    }
    let (label_part, stop_part) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(l, s)| (l, s.trim()));

    let stop = stop_part
        .split_once(':')
        .filter(|(keyword, _)| keyword.trim() == "stop")
        .map(|(_, condition)| condition.trim())
        .filter(|condition| !condition.is_empty())
        .ok_or(DefinitionErrorKind::StopConditionForm)?;

    let (label, parent) = match label_part.split_once('(') {
        Some((label, parent)) if parent.ends_with(')') => {
            (label, Some(parent.trim_end_matches(')').trim()))
        }
        _ => (label_part, None),
    };

    Ok(Header {
        label,
        parent,
        stop,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::Variables;

    fn declarations() -> Declarations {
        Declarations::new(["lever", "reward"], ["R", "R0"], Variables::new())
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("train stop:reward=3").unwrap(),
            Header {
                label: "train",
                parent: None,
                stop: "reward=3",
            }
        );
        assert_eq!(
            parse_header("ext(train)   stop :  lever = 5").unwrap(),
            Header {
                label: "ext",
                parent: Some("train"),
                stop: "lever = 5",
            }
        );
    }

    #[test]
    fn test_header_errors() {
        assert_eq!(parse_header(""), Err(DefinitionErrorKind::PhaseHeader));
        assert_eq!(
            parse_header("train"),
            Err(DefinitionErrorKind::StopConditionForm)
        );
        assert_eq!(
            parse_header("train halt:x=1"),
            Err(DefinitionErrorKind::StopConditionForm)
        );
        assert_eq!(
            parse_header("train stop:"),
            Err(DefinitionErrorKind::StopConditionForm)
        );
    }

    #[test]
    fn test_compile_with_comments_and_case() {
        let script = "\
# fixed ratio schedule
@PHASE train stop:reward=2   # two rewards

LEVER  lever  | count_line(R)=2: REWARD | LEVER
REWARD reward | LEVER
";
        let registry = compile(script, declarations()).unwrap();
        let train = registry.get("train").unwrap();
        assert_eq!(train.lineno(), 2);
        assert_eq!(train.line("LEVER").unwrap().lineno(), 4);
        assert_eq!(train.line("REWARD").unwrap().lineno(), 5);
    }

    #[test]
    fn test_line_outside_phase() {
        let err = compile("\nLEVER lever | LEVER\n", declarations()).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::new(2, DefinitionErrorKind::LineOutsidePhase)
        );
    }

    #[test]
    fn test_error_line_numbers() {
        let script = "\
@phase a stop:reward=1
A lever | A
@phase a stop:reward=1
A lever | A
";
        let err = compile(script, declarations()).unwrap_err();
        assert_eq!(err.to_string(), "Error on line 3: Redefinition of phase 'a'.");

        let script = "\
@phase b(nope) stop:reward=1
A lever | A
";
        let err = compile(script, declarations()).unwrap_err();
        assert_eq!(err.to_string(), "Error on line 1: Invalid phase label 'nope'.");

        let script = "\
@phase a stop:reward=1
A lever | B
";
        let err = compile(script, declarations()).unwrap_err();
        assert_eq!(err.lineno, 2);
    }

    #[test]
    fn test_empty_phase_reported_at_header() {
        let script = "@phase a stop:reward=1\n@phase b stop:reward=1\nA lever | A\n";
        let err = compile(script, declarations()).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::new(1, DefinitionErrorKind::EmptyPhase("a".into()))
        );
    }

    #[test]
    fn test_inheritance() {
        let script = "\
@phase train stop:reward=2
LEVER  lever  | R: REWARD | LEVER
REWARD reward | LEVER

@phase ext(train) stop:lever=3
REWARD lever | LEVER
";
        let registry = compile(script, declarations()).unwrap();
        let ext = registry.get("ext").unwrap();
        assert_eq!(ext.parent(), Some("train"));
        assert_eq!(ext.line("REWARD").unwrap().lineno(), 6);
        assert_eq!(ext.line("LEVER").unwrap().lineno(), 2);
        assert_eq!(registry.labels().collect::<Vec<_>>(), ["train", "ext"]);
    }
}
