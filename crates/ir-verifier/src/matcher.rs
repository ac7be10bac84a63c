// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Forbidden and count checks against one compilation segment

use ir_rules::{CountCheck, ForbiddenCheck, ParsedRule};
use regex::Regex;

use crate::report::{FailureKind, PatternHits};

fn occurrences(regex: &Regex, text: &str) -> Vec<String> {
    regex
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// Report every forbidden pattern that occurs in `text`.
pub fn check_forbidden(check: &ForbiddenCheck, text: &str) -> Option<FailureKind> {
    if !check.combined.is_match(text) {
        return None;
    }

    let hits: Vec<_> = check
        .patterns
        .iter()
        .filter_map(|(pattern, regex)| {
            let occurrences = occurrences(regex, text);
            (!occurrences.is_empty()).then(|| PatternHits {
                pattern: pattern.description.clone(),
                occurrences,
            })
        })
        .collect();

    (!hits.is_empty()).then_some(FailureKind::ForbiddenPatternFound { hits })
}

pub fn check_count(check: &CountCheck, text: &str) -> Option<FailureKind> {
    let occurrences = occurrences(&check.regex, text);
    let actual = occurrences.len() as u64;
    if check.comparison.holds(&actual) {
        return None;
    }
    Some(FailureKind::CountMismatch {
        pattern: check.pattern.description.clone(),
        comparison: check.comparison,
        actual,
        occurrences,
    })
}

/// All failures of one rule: forbidden patterns first, then counts in
/// declaration order.
pub fn match_rule(rule: &ParsedRule, text: &str) -> Vec<FailureKind> {
    let forbidden = rule
        .forbidden
        .as_ref()
        .and_then(|check| check_forbidden(check, text));
    forbidden
        .into_iter()
        .chain(rule.counts.iter().filter_map(|check| check_count(check, text)))
        .collect()
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use ir_rules::{StructuralRule, node::STORE_OF_FIELD};

    use super::*;

    const SEGMENT: &str = indoc! {"
        AFTER: print_ideal
         31  StoreI  === 5 7 30 29  [[ 16 ]]  @Counter+12 *, name=count, idx=4;
         33  MemBarRelease  === 5 1 7 1 1  [[ 34 35 ]]
    "};

    fn failures(rule: StructuralRule) -> Vec<FailureKind> {
        let (parsed, errors) = rule.parse();
        assert!(errors.is_empty(), "{errors:?}");
        match_rule(&parsed, SEGMENT)
    }

    #[test]
    fn test_forbidden_store_reports_one_occurrence() {
        let failures = failures(StructuralRule::new().fail_on(["Store"]));
        assert_eq!(
            failures,
            vec![FailureKind::ForbiddenPatternFound {
                hits: vec![PatternHits {
                    pattern: "Store".into(),
                    occurrences: vec!["Store".into()],
                }]
            }]
        );
    }

    #[test]
    fn test_only_matching_patterns_are_reported() {
        let failures = failures(StructuralRule::new().fail_on(["Load", "MemBar\\w+", "Store"]));
        let [FailureKind::ForbiddenPatternFound { hits }] = failures.as_slice() else {
            panic!("unexpected failures {failures:?}");
        };
        let patterns: Vec<_> = hits.iter().map(|hit| hit.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["MemBar\\w+", "Store"]);
        assert_eq!(hits[0].occurrences, vec!["MemBarRelease"]);
    }

    #[test]
    fn test_count_at_least_one_passes() {
        assert!(failures(StructuralRule::new().counts(["Store", ">=1"])).is_empty());
    }

    #[test]
    fn test_count_zero_reports_expected_and_actual() {
        let failures = failures(StructuralRule::new().counts(["Store", "0"]));
        let [FailureKind::CountMismatch { comparison, actual, occurrences, .. }] =
            failures.as_slice()
        else {
            panic!("unexpected failures {failures:?}");
        };
        assert_eq!(comparison.expected, 0);
        assert_eq!(*actual, 1);
        assert_eq!(occurrences, &vec!["Store".to_string()]);
    }

    #[test]
    fn test_placeholder_occurrence_is_the_whole_line() {
        let failures = failures(StructuralRule::new().fail_on([STORE_OF_FIELD, "count"]));
        let [FailureKind::ForbiddenPatternFound { hits }] = failures.as_slice() else {
            panic!("unexpected failures {failures:?}");
        };
        assert!(hits[0].occurrences[0].starts_with("31  StoreI"));
    }

    #[test]
    fn test_every_count_pair_is_checked() {
        let failures = failures(StructuralRule::new().counts(["Store", "2", "MemBar", "< 1", "Load", "0"]));
        assert_eq!(failures.len(), 2);
    }
}
