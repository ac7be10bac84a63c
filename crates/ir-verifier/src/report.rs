// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Aggregated verification report

use std::fmt;

use ir_rules::{Comparison, FormatError, FormatErrors};

/// Literal occurrences of one forbidden pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternHits {
    pub pattern: String,
    pub occurrences: Vec<String>,
}

/// Why a rule failed
#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    /// One entry per forbidden pattern that matched
    ForbiddenPatternFound { hits: Vec<PatternHits> },
    CountMismatch {
        pattern: String,
        comparison: Comparison<u64>,
        actual: u64,
        occurrences: Vec<String>,
    },
}

/// One failing check of one rule
#[derive(Debug, Clone, PartialEq)]
pub struct MatchFailure {
    pub routine: String,
    /// 0-based declaration index
    pub rule_index: usize,
    pub description: String,
    pub kind: FailureKind,
}

/// Failures of one routine, in rule order
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineFailures {
    pub routine: String,
    pub failures: Vec<MatchFailure>,
}

/// Every rule violation and rule format error of a verification pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationReport {
    routines: Vec<RoutineFailures>,
    format_errors: FormatErrors,
}

impl VerificationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if nothing failed
    pub fn is_ok(&self) -> bool {
        self.routines.is_empty() && self.format_errors.is_empty()
    }

    /// Failures grouped by routine, in the order routines were verified
    pub fn routines(&self) -> &[RoutineFailures] {
        &self.routines
    }

    pub fn failures(&self) -> impl Iterator<Item = &MatchFailure> {
        self.routines.iter().flat_map(|group| group.failures.iter())
    }

    pub fn failure_count(&self) -> usize {
        self.routines.iter().map(|group| group.failures.len()).sum()
    }

    pub fn format_errors(&self) -> &FormatErrors {
        &self.format_errors
    }

    pub fn push(&mut self, failure: MatchFailure) {
        match self
            .routines
            .iter_mut()
            .find(|group| group.routine == failure.routine)
        {
            Some(group) => group.failures.push(failure),
            None => self.routines.push(RoutineFailures {
                routine: failure.routine.clone(),
                failures: vec![failure],
            }),
        }
    }

    pub fn extend_format_errors(&mut self, errors: impl IntoIterator<Item = FormatError>) {
        self.format_errors.extend(errors);
    }
}

impl Extend<MatchFailure> for VerificationReport {
    fn extend<T: IntoIterator<Item = MatchFailure>>(&mut self, iter: T) {
        for failure in iter {
            self.push(failure);
        }
    }
}

fn write_occurrences(f: &mut fmt::Formatter<'_>, occurrences: &[String]) -> fmt::Result {
    for occurrence in occurrences {
        writeln!(f, "        {occurrence}")?;
    }
    Ok(())
}

fn nodes(count: u64) -> String {
    match count {
        0 => "no nodes matched".to_string(),
        1 => "1 node".to_string(),
        n => format!("{n} nodes"),
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ForbiddenPatternFound { hits } => {
                for hit in hits {
                    writeln!(
                        f,
                        "    - forbidden pattern {} matched {}:",
                        hit.pattern,
                        nodes(hit.occurrences.len() as u64)
                    )?;
                    write_occurrences(f, &hit.occurrences)?;
                }
                Ok(())
            }
            FailureKind::CountMismatch {
                pattern,
                comparison,
                actual,
                occurrences,
            } => {
                writeln!(
                    f,
                    "    - count of {pattern}: expected {comparison}, found {}",
                    nodes(*actual)
                )?;
                write_occurrences(f, occurrences)
            }
        }
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return writeln!(f, "IR verification passed");
        }

        if !self.format_errors.is_empty() {
            writeln!(f, "{}", self.format_errors)?;
        }

        if !self.routines.is_empty() {
            writeln!(
                f,
                "IR verification failed: {} failure(s) in {} routine(s)",
                self.failure_count(),
                self.routines.len()
            )?;
        }
        for group in &self.routines {
            writeln!(f, "\nroutine '{}':", group.routine)?;
            let mut last_rule = None;
            for failure in &group.failures {
                if last_rule != Some(failure.rule_index) {
                    writeln!(f, "  rule {}: {}", failure.rule_index + 1, failure.description)?;
                    last_rule = Some(failure.rule_index);
                }
                write!(f, "{}", failure.kind)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ir_rules::{Comparison, FormatErrorKind};

    use super::*;

    fn count_failure(routine: &str, rule_index: usize, actual: u64) -> MatchFailure {
        MatchFailure {
            routine: routine.into(),
            rule_index,
            description: r#"rule(counts = ["Load", ">= 1"])"#.into(),
            kind: FailureKind::CountMismatch {
                pattern: "Load".into(),
                comparison: Comparison::parse(">= 1").unwrap(),
                actual,
                occurrences: vec![],
            },
        }
    }

    #[test]
    fn test_empty_report_is_ok() {
        let report = VerificationReport::new();
        assert!(report.is_ok());
        assert_eq!(report.to_string(), "IR verification passed\n");
    }

    #[test]
    fn test_failures_are_grouped_by_routine() {
        let mut report = VerificationReport::new();
        report.extend([
            count_failure("a", 0, 0),
            count_failure("b", 1, 0),
            count_failure("a", 2, 0),
        ]);

        assert!(!report.is_ok());
        assert_eq!(report.failure_count(), 3);
        assert_eq!(report.routines().len(), 2);
        assert_eq!(report.routines()[0].routine, "a");
        assert_eq!(report.routines()[0].failures.len(), 2);
    }

    #[test]
    fn test_rendering_uses_one_based_rules() {
        let mut report = VerificationReport::new();
        report.push(count_failure("sum", 0, 0));
        let text = report.to_string();
        assert!(text.contains("routine 'sum':"), "{text}");
        assert!(text.contains("rule 1: rule(counts"), "{text}");
        assert!(text.contains("expected >= 1, found no nodes matched"), "{text}");
    }

    #[test]
    fn test_forbidden_hits_render_occurrences() {
        let kind = FailureKind::ForbiddenPatternFound {
            hits: vec![PatternHits {
                pattern: "Call".into(),
                occurrences: vec!["Call".into(), "Call".into()],
            }],
        };
        let text = kind.to_string();
        assert!(text.contains("forbidden pattern Call matched 2 nodes:"), "{text}");
        assert_eq!(text.matches("        Call\n").count(), 2);
    }

    #[test]
    fn test_format_errors_fail_the_report() {
        let mut report = VerificationReport::new();
        report.extend_format_errors([FormatError::new("routine 'sum' rule 1", FormatErrorKind::EmptyRule)]);
        assert!(!report.is_ok());
        assert!(report.to_string().contains("routine 'sum' rule 1: rule declares neither"));
    }
}
