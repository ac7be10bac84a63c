//! Integration tests for the ir-verifier crate
//!
//! Verifies captured compilation traces end to end: encoding, segmentation,
//! matching and report rendering.

use indoc::indoc;
use ir_rules::{
    Encoding, RoutineRules, StructuralRule,
    node::{CALL, COUNTED_LOOP, MEMBAR, STATIC_CALL_OF_METHOD, STORE, STORE_OF_FIELD},
};
use ir_verifier::{FailureKind, IrVerifier, Segmenter, VerifyError};

const ADD_CLEAN: &str = include_str!("../../../tests/trace_samples/add_clean.log");
const ADD_CALL: &str = include_str!("../../../tests/trace_samples/add_call.log");
const RECOMPILE_OSR: &str = include_str!("../../../tests/trace_samples/recompile_osr.log");
const RUN_STDOUT: &str = include_str!("../../../tests/trace_samples/run_stdout.txt");

const ADD_STDOUT: &str = indoc! {"
    ##### IR rule encoding - consumed by ir-verifier #####
    # <routine>,<comma separated active rule indices or -1>
    add,0
    idle,-1
    ----- END -----
"};

fn sum_verifier(rule: StructuralRule) -> IrVerifier {
    IrVerifier::new(
        "Sum",
        &[
            RoutineRules::new("add", vec![rule]),
            RoutineRules::new("idle", vec![StructuralRule::new().fail_on([STORE])]),
        ],
    )
}

#[test]
fn test_no_forbidden_call_passes() {
    let report = sum_verifier(StructuralRule::new().fail_on(["Call"]))
        .verify_output(ADD_STDOUT, ADD_CLEAN)
        .unwrap();
    assert!(report.is_ok(), "{report}");
}

#[test]
fn test_forbidden_call_fails_with_one_occurrence() {
    let report = sum_verifier(StructuralRule::new().fail_on(["Call"]))
        .verify_output(ADD_STDOUT, ADD_CALL)
        .unwrap();

    assert_eq!(report.failure_count(), 1);
    let failure = report.failures().next().unwrap();
    assert_eq!(failure.routine, "add");
    assert_eq!(failure.rule_index, 0);
    let FailureKind::ForbiddenPatternFound { hits } = &failure.kind else {
        panic!("unexpected failure {failure:?}");
    };
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].occurrences, vec!["Call"]);
}

#[test]
fn test_placeholder_evidence_is_the_dump_line() {
    let report = sum_verifier(StructuralRule::new().fail_on([CALL]))
        .verify_output(ADD_STDOUT, ADD_CALL)
        .unwrap();

    let text = report.to_string();
    assert!(text.contains("routine 'add':"), "{text}");
    assert!(text.contains("rule 1: rule(fail_on = [\"CALL\"])"), "{text}");
    assert!(text.contains("CallStaticJava  === 5 6 7 8 1"), "{text}");
}

#[test]
fn test_same_named_routine_of_other_class_is_ignored() {
    let helper = indoc! {"
            340   44       4       SumHelper::add (6 bytes)
        AFTER: print_ideal
         20  CallStaticJava  === 5 6 7 8 1 (10 11 ) [[ 21 22 ]] # Static  SumHelper::log void ( int )
    "};
    let trace = format!("{ADD_CLEAN}{helper}");

    let report = sum_verifier(StructuralRule::new().fail_on([CALL]))
        .verify_output(ADD_STDOUT, &trace)
        .unwrap();
    assert!(report.is_ok(), "{report}");
}

#[test]
fn test_static_call_of_method() {
    let verifier = sum_verifier(
        StructuralRule::new().counts([STATIC_CALL_OF_METHOD, "checkedAdd", "0"]),
    );
    assert!(verifier.verify_output(ADD_STDOUT, ADD_CLEAN).unwrap().is_ok());

    let report = verifier.verify_output(ADD_STDOUT, ADD_CALL).unwrap();
    let Some(FailureKind::CountMismatch { actual, .. }) =
        report.failures().next().map(|failure| &failure.kind)
    else {
        panic!("expected a count mismatch: {report}");
    };
    assert_eq!(*actual, 1);
}

#[test]
fn test_recompiled_routine_uses_last_normal_body() {
    let mut encoding = Encoding::new();
    encoding
        .insert("bump", ir_rules::RuleApplicability::Active(vec![0, 1, 2]))
        .unwrap();

    let segments = Segmenter::new("Counter", &encoding).segment(RECOMPILE_OSR);
    assert_eq!(segments.len(), 1);
    let bump = segments.get("bump").unwrap();
    assert_eq!(bump.text.matches("StoreI").count(), 1);
    assert!(!bump.text.contains("CountedLoop"));
    assert!(!bump.text.contains("MemBar"));

    let verifier = IrVerifier::new(
        "Counter",
        &[RoutineRules::new(
            "bump",
            vec![
                StructuralRule::new().counts([STORE_OF_FIELD, "count", "1"]),
                StructuralRule::new().fail_on([COUNTED_LOOP, MEMBAR]),
                StructuralRule::new().counts([STORE_OF_FIELD, "limit", "0"]),
            ],
        )],
    );
    let report = verifier.verify(&encoding, RECOMPILE_OSR).unwrap();
    assert!(report.is_ok(), "{report}");
}

#[test]
fn test_other_classes_and_untracked_routines_are_skipped() {
    let encoding = Encoding::parse(indoc! {"
        ##### IR rule encoding - consumed by ir-verifier #####
        bump,-1
        hashCode,0
        ----- END -----
    "})
    .unwrap();

    let segments = Segmenter::new("Counter", &encoding).segment(RECOMPILE_OSR);
    assert!(segments.get("untracked").is_none());
    assert!(segments.get("hashCode").is_none());
    assert!(segments.get("bump").is_some());
}

#[test]
fn test_active_routine_without_compilation_is_fatal() {
    let verifier = IrVerifier::new(
        "Sum",
        &[
            RoutineRules::new("add", vec![StructuralRule::new().fail_on([CALL])]),
            RoutineRules::new(
                "unroll",
                vec![
                    StructuralRule::new().counts([COUNTED_LOOP, "1"]),
                    StructuralRule::new().counts([COUNTED_LOOP, ">= 2"]),
                    StructuralRule::new().fail_on(["Allocate"]),
                ],
            ),
            RoutineRules::new("idle", vec![StructuralRule::new().fail_on([STORE])]),
        ],
    );

    let err = verifier.verify_output(RUN_STDOUT, ADD_CLEAN).unwrap_err();
    assert_eq!(
        err,
        VerifyError::MissingSegment {
            routine: "unroll".into(),
            rules: vec![1, 2]
        }
    );
}

#[test]
fn test_missing_encoding_is_fatal() {
    let err = sum_verifier(StructuralRule::new().fail_on([CALL]))
        .verify_output("add(40, 2) = 42\n", ADD_CLEAN)
        .unwrap_err();
    assert!(matches!(err, VerifyError::Encoding(_)));
}
