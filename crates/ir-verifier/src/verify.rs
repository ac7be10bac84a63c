// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Verification of a captured run against the declared rules
//!
//! Provides [`IrVerifier`], a pure function of (encoding, trace, rules) to a
//! [`VerificationReport`]. It holds no state between calls.

use std::collections::HashMap;

use ir_rules::{Encoding, FormatError, ParsedRule, RoutineRules};
use tracing::debug;

use crate::{
    error::{VerifyError, VerifyResult},
    matcher::match_rule,
    report::{MatchFailure, VerificationReport},
    segment::Segmenter,
};

struct DeclaredRule {
    description: String,
    parsed: ParsedRule,
}

/// Verifier for the structural rules of one class under test
pub struct IrVerifier {
    class_prefix: String,
    rules: HashMap<String, Vec<DeclaredRule>>,
    /// Format errors found while parsing the declarations
    format_errors: Vec<FormatError>,
}

impl IrVerifier {
    /// Parse every rule up front. Format errors do not fail construction;
    /// they are carried into every report.
    pub fn new<'r>(
        class_prefix: impl Into<String>,
        routines: impl IntoIterator<Item = &'r RoutineRules>,
    ) -> Self {
        let mut rules = HashMap::new();
        let mut format_errors = Vec::new();

        for routine in routines {
            let declared = routine
                .rules
                .iter()
                .enumerate()
                .map(|(index, rule)| {
                    let (parsed, errors) = rule.parse();
                    let origin = format!("routine '{}' rule {}", routine.routine, index + 1);
                    format_errors.extend(
                        errors
                            .into_iter()
                            .map(|kind| FormatError::new(origin.clone(), kind)),
                    );
                    DeclaredRule {
                        description: rule.to_string(),
                        parsed,
                    }
                })
                .collect();
            rules.insert(routine.routine.clone(), declared);
        }

        Self {
            class_prefix: class_prefix.into(),
            rules,
            format_errors,
        }
    }

    /// Check every routine with active rules against its segment of `trace`.
    ///
    /// # Errors
    ///
    /// Internal inconsistencies: a routine with active rules that was never
    /// compiled, or an encoding that does not match the declarations.
    pub fn verify(&self, encoding: &Encoding, trace: &str) -> VerifyResult<VerificationReport> {
        let mut report = VerificationReport::new();
        report.extend_format_errors(self.format_errors.iter().cloned());

        let segments = Segmenter::new(&self.class_prefix, encoding).segment(trace);
        debug!(segments = segments.len(), "segmented compilation trace");

        for (routine, active) in encoding.active() {
            let declared = self
                .rules
                .get(routine)
                .filter(|declared| !declared.is_empty())
                .ok_or_else(|| VerifyError::UnknownRoutine(routine.to_string()))?;
            let segment = segments
                .get(routine)
                .ok_or_else(|| VerifyError::MissingSegment {
                    routine: routine.to_string(),
                    rules: active.to_vec(),
                })?;

            for &index in active {
                let rule = declared
                    .get(index)
                    .ok_or_else(|| VerifyError::UnknownRuleIndex {
                        routine: routine.to_string(),
                        index,
                        declared: declared.len(),
                    })?;
                report.extend(match_rule(&rule.parsed, segment.text).into_iter().map(
                    |kind| MatchFailure {
                        routine: routine.to_string(),
                        rule_index: index,
                        description: rule.description.clone(),
                        kind,
                    },
                ));
            }
            debug!(routine, rules = active.len(), "verified routine");
        }

        Ok(report)
    }

    /// Parse the encoding out of captured stdout and verify.
    pub fn verify_output(&self, stdout: &str, trace: &str) -> VerifyResult<VerificationReport> {
        let encoding = Encoding::parse(stdout)?;
        self.verify(&encoding, trace)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use ir_rules::{RuleApplicability, StructuralRule};

    use super::*;

    const TRACE: &str = indoc! {"
            1   4   Sum::add (6 bytes)
         20  StoreI  === 5 7 30 29  [[ 16 ]]  @Sum+12 *, name=total, idx=4;
    "};

    fn verifier() -> IrVerifier {
        IrVerifier::new(
            "Sum",
            &[RoutineRules::new(
                "add",
                vec![
                    StructuralRule::new().fail_on(["Store"]),
                    StructuralRule::new().counts(["Store", "1"]),
                ],
            )],
        )
    }

    fn encoding(routine: &str, indices: Vec<usize>) -> Encoding {
        let mut encoding = Encoding::new();
        encoding
            .insert(routine, RuleApplicability::Active(indices))
            .unwrap();
        encoding
    }

    #[test]
    fn test_only_active_rules_are_checked() {
        let report = verifier().verify(&encoding("add", vec![1]), TRACE).unwrap();
        assert!(report.is_ok(), "{report}");

        let report = verifier().verify(&encoding("add", vec![0, 1]), TRACE).unwrap();
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failures().next().unwrap().rule_index, 0);
    }

    #[test]
    fn test_missing_segment_is_fatal() {
        let err = verifier()
            .verify(&encoding("add", vec![0]), "no compilations here\n")
            .unwrap_err();
        assert_eq!(
            err,
            VerifyError::MissingSegment {
                routine: "add".into(),
                rules: vec![0]
            }
        );
    }

    #[test]
    fn test_inactive_routine_needs_no_segment() {
        let mut encoding = Encoding::new();
        encoding.insert("add", RuleApplicability::NoneActive).unwrap();
        let report = verifier().verify(&encoding, "").unwrap();
        assert!(report.is_ok());
    }

    #[test]
    fn test_encoding_must_match_declarations() {
        let err = verifier()
            .verify(&encoding("add", vec![5]), TRACE)
            .unwrap_err();
        assert!(matches!(err, VerifyError::UnknownRuleIndex { index: 5, declared: 2, .. }));

        let err = verifier()
            .verify(&encoding("sub", vec![0]), TRACE)
            .unwrap_err();
        assert_eq!(err, VerifyError::UnknownRoutine("sub".into()));
    }

    #[test]
    fn test_declaration_errors_reach_the_report() {
        let verifier = IrVerifier::new(
            "Sum",
            &[RoutineRules::new("add", vec![StructuralRule::new()])],
        );
        let report = verifier.verify(&Encoding::new(), TRACE).unwrap();
        assert!(!report.is_ok());
        assert_eq!(report.format_errors().len(), 1);
        assert_eq!(report.failure_count(), 0);
    }
}
