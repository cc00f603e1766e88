mod common;

use common::{compile, rng};
use lesim::error::{DefinitionError, DefinitionErrorKind, PhaseError};
use lesim::expr::ExprError;
use lesim::phase::{Declarations, PhaseRegistry, World};
use lesim::variables::Variables;

fn try_compile(script: &str) -> Result<PhaseRegistry, DefinitionError> {
    let declarations = Declarations::new(
        ["lever", "reward", "light"],
        ["R", "R0"],
        Variables::new(),
    );
    lesim::script::compile(script, declarations)
}

fn error(script: &str) -> DefinitionError {
    try_compile(script).expect_err("script should not compile")
}

// ============================================================================
// Definition errors
// ============================================================================

#[test]
fn errors_carry_script_line_numbers() {
    let script = "\
# comment
@phase p stop:reward=1

LEVER lever | R: REWARD | LEVER
REWARD reward LEVER
";
    let err = error(script);
    assert_eq!(err.lineno, 5);
    assert_eq!(err.kind, DefinitionErrorKind::MissingSeparator);
    assert_eq!(err.to_string(), "Error on line 5: Missing separator '|' on phase line.");
}

#[test]
fn header_errors() {
    assert_eq!(error("@phase\nA lever | A\n").kind, DefinitionErrorKind::PhaseHeader);
    assert_eq!(
        error("@phase p\nA lever | A\n").kind,
        DefinitionErrorKind::StopConditionForm
    );
    assert_eq!(
        error("@phase p(q) stop:lever=1\nA lever | A\n").kind,
        DefinitionErrorKind::UnknownParentPhase("q".into())
    );
    let err = error("@phase p stop:lever=1\nA lever | A\n@phase p stop:lever=2\nA lever | A\n");
    assert_eq!(err.lineno, 3);
    assert_eq!(err.kind, DefinitionErrorKind::PhaseRedefinition("p".into()));
}

#[test]
fn line_label_errors() {
    let err = error("@phase p stop:lever=1\nA lever | A\nA light | A\n");
    assert_eq!(err.lineno, 3);
    assert_eq!(err.kind, DefinitionErrorKind::DuplicateLabel("A".into()));

    assert_eq!(
        error("@phase p stop:lever=1\nlever lever | lever\n").kind,
        DefinitionErrorKind::LabelIsStimulusElement("lever".into())
    );
    assert_eq!(
        error("@phase p stop:lever=1\nR lever | R\n").kind,
        DefinitionErrorKind::LabelIsBehavior("R".into())
    );
}

#[test]
fn stimulus_head_errors() {
    assert_eq!(
        error("@phase p stop:lever=1\nA tone | A\n").kind,
        DefinitionErrorKind::UnknownStimulusOrAction("tone".into())
    );
    assert_eq!(
        error("@phase p stop:lever=1\nA lever, tone | A\n").kind,
        DefinitionErrorKind::ExpectedStimulusElement("tone".into())
    );
    assert_eq!(
        error("@phase p stop:lever=1\nA lever, lever | A\n").kind,
        DefinitionErrorKind::DuplicateStimulusElement("lever".into())
    );
}

#[test]
fn destination_errors() {
    let err = error("@phase p stop:lever=1\nLEVER lever | R: REWRD | LEVER\nREWARD reward | LEVER\n");
    assert_eq!(err.lineno, 2);
    assert_eq!(
        err.to_string(),
        "Error on line 2: Invalid line label 'REWRD'. Did you mean 'REWARD'?"
    );

    assert_eq!(
        error("@phase p stop:lever=1\nA lever | A(0.5), B(0.75)\nB light | A\n").kind,
        DefinitionErrorKind::ProbabilitySum(1.25)
    );
    assert_eq!(
        error("@phase p stop:lever=1\nA lever | A(1.5)\n").kind,
        DefinitionErrorKind::InvalidProbability("1.5".into())
    );
}

#[test]
fn unreachable_branch_is_rejected() {
    let err = error("@phase p stop:lever=1\nA lever | A | R: B\nB light | A\n");
    assert_eq!(err.lineno, 2);
    assert!(matches!(err.kind, DefinitionErrorKind::UnreachableBranch(_)));
}

#[test]
fn help_line_cannot_test_response() {
    let err = error("@phase p stop:lever=1\nH x:1 | R: A | A\nA lever | H\n");
    assert_eq!(err.lineno, 2);
    assert_eq!(err.kind, DefinitionErrorKind::ResponseOnHelpLine);
}

#[test]
fn unknown_count_events_are_rejected() {
    assert_eq!(
        error("@phase p stop:lever=1\nA lever | count(tone)=2: A | A\n").kind,
        DefinitionErrorKind::UnknownCountEvent {
            function: "count".into(),
            event: "tone".into(),
        }
    );
    assert_eq!(
        error("@phase p stop:lever=1\nA count_reset(tone) | B\nB lever | A\n").kind,
        DefinitionErrorKind::UnknownCountResetEvent("tone".into())
    );
}

#[test]
fn first_error_wins_and_no_registry_is_built() {
    let script = "\
@phase good stop:lever=1
A lever | A
@phase bad stop:lever=1
A lever |
@phase worse stop:lever=1
A tone | A
";
    let err = error(script);
    assert_eq!(err.lineno, 4);
}

#[test]
fn empty_phase_and_stray_lines() {
    assert_eq!(
        error("@phase p stop:lever=1\n").kind,
        DefinitionErrorKind::EmptyPhase("p".into())
    );
    assert_eq!(
        error("A lever | A\n").kind,
        DefinitionErrorKind::LineOutsidePhase
    );
}

// ============================================================================
// Run-time errors
// ============================================================================

fn world(script: &str, phases: &[&str]) -> World {
    let registry = compile(&["lever", "reward", "light"], &["R", "R0"], script);
    World::new(&registry, phases).unwrap()
}

#[test]
fn unknown_response() {
    let mut world = world("@phase p stop:lever=3\nA lever | A\n", &["p"]);
    let mut rng = rng(1);
    world.next_stimulus(None, &mut rng).unwrap();
    assert_eq!(
        world.next_stimulus(Some("jump"), &mut rng).unwrap_err(),
        PhaseError::UnknownResponse("jump".into())
    );
}

#[test]
fn response_before_first_stimulus() {
    let mut world = world("@phase p stop:lever=3\nA lever | A\n", &["p"]);
    assert_eq!(
        world.next_stimulus(Some("R"), &mut rng(1)).unwrap_err(),
        PhaseError::ResponseBeforeFirstStimulus("p".into())
    );
}

#[test]
fn probability_expression_out_of_range() {
    let mut world = world(
        "\
@phase p stop:lever=5
SET x:2       | A
A   lever     | B(x) | A
B   reward    | A
",
        &["p"],
    );
    let mut rng = rng(1);
    world.next_stimulus(None, &mut rng).unwrap();
    let err = world.next_stimulus(Some("R"), &mut rng).unwrap_err();
    assert!(
        matches!(err, PhaseError::InvalidProbability { lineno: 3, .. }),
        "{err}"
    );
}

#[test]
fn non_boolean_condition() {
    let mut world = world(
        "\
@phase p stop:lever=5
SET x:1     | A
A   lever   | x+1: B | A
B   reward  | A
",
        &["p"],
    );
    let mut rng = rng(1);
    world.next_stimulus(None, &mut rng).unwrap();
    let err = world.next_stimulus(Some("R"), &mut rng).unwrap_err();
    assert_eq!(
        err,
        PhaseError::NotBoolean {
            lineno: 3,
            condition: "x+1".into(),
        }
    );
}

#[test]
fn unknown_variable_at_run_time() {
    let mut world = world("@phase p stop:lever=5\nA lever | y=1: A | A\n", &["p"]);
    let mut rng = rng(1);
    world.next_stimulus(None, &mut rng).unwrap();
    let err = world.next_stimulus(Some("R"), &mut rng).unwrap_err();
    assert_eq!(
        err,
        PhaseError::Evaluation {
            lineno: 2,
            source: ExprError::UnknownVariable("y".into()),
        }
    );
}

#[test]
fn help_line_cycle() {
    let mut world = world("@phase p stop:lever=1\nA x:1 | B\nB x:2 | A\n", &["p"]);
    let err = world.next_stimulus(None, &mut rng(1)).unwrap_err();
    assert!(matches!(err, PhaseError::HelpLineCycle { lineno: 2, .. }), "{err}");
    assert!(!err.is_internal());
}

#[test]
fn unknown_phase_in_world() {
    let registry = compile(&["lever"], &["R"], "@phase train stop:lever=1\nA lever | A\n");
    let err = World::new(&registry, &["trian"]).unwrap_err();
    assert_eq!(err.to_string(), "Unknown phase 'trian'. Did you mean 'train'?");
    assert_eq!(
        World::new(&registry, &[] as &[&str]).unwrap_err(),
        PhaseError::EmptyWorld
    );
}

#[test]
fn failed_subject_does_not_affect_a_fresh_world() {
    let script = "@phase p stop:lever=2\nA lever | A\n";
    let mut broken = world(script, &["p"]);
    assert!(broken.next_stimulus(Some("R"), &mut rng(1)).is_err());

    let mut fresh = world(script, &["p"]);
    let mut rng = rng(1);
    assert_eq!(fresh.next_stimulus(None, &mut rng).unwrap().line(), Some("A"));
}
