// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Structural rule declarations
//!
//! A [`StructuralRule`] is what a test author writes: flat string lists, the
//! same shape as the declarations they replace. [`StructuralRule::parse`]
//! turns it into a [`ParsedRule`] with compiled regexes, reporting every
//! format error it finds instead of stopping at the first one.
//!
//! # Conditions
//!
//! | Clause | Terms | Active iff |
//! |--------|-------|------------|
//! | `apply_if` | exactly one flag/value pair | the pair matches |
//! | `apply_if_and` | two or more pairs | every pair matches |
//! | `apply_if_not` | one or more pairs | no pair matches |
//! | `apply_if_or` | two or more pairs | at least one pair matches |
//!
//! At most one clause may be set on a rule.

use std::fmt;

use regex::Regex;

use crate::{
    comparator::Comparison,
    error::{ConditionError, FormatErrorKind},
    flags::FlagSource,
    node::{NodePattern, expand_at, expand_patterns},
};

/// A declared assertion about the optimized IR of one routine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuralRule {
    /// Patterns that must not occur
    pub fail_on: Vec<String>,
    /// Flat `pattern [literal] count-expression` list
    pub counts: Vec<String>,
    pub apply_if: Vec<String>,
    pub apply_if_not: Vec<String>,
    pub apply_if_and: Vec<String>,
    pub apply_if_or: Vec<String>,
}

fn owned<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl StructuralRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on<I: IntoIterator<Item = S>, S: Into<String>>(mut self, patterns: I) -> Self {
        self.fail_on = owned(patterns);
        self
    }

    pub fn counts<I: IntoIterator<Item = S>, S: Into<String>>(mut self, counts: I) -> Self {
        self.counts = owned(counts);
        self
    }

    pub fn apply_if<I: IntoIterator<Item = S>, S: Into<String>>(mut self, terms: I) -> Self {
        self.apply_if = owned(terms);
        self
    }

    pub fn apply_if_not<I: IntoIterator<Item = S>, S: Into<String>>(mut self, terms: I) -> Self {
        self.apply_if_not = owned(terms);
        self
    }

    pub fn apply_if_and<I: IntoIterator<Item = S>, S: Into<String>>(mut self, terms: I) -> Self {
        self.apply_if_and = owned(terms);
        self
    }

    pub fn apply_if_or<I: IntoIterator<Item = S>, S: Into<String>>(mut self, terms: I) -> Self {
        self.apply_if_or = owned(terms);
        self
    }

    /// Validate and extract the condition clause, if any.
    pub fn condition(&self) -> Result<Option<Condition>, FormatErrorKind> {
        let clauses = [
            ("apply_if", &self.apply_if, ConditionKind::AllOf),
            ("apply_if_not", &self.apply_if_not, ConditionKind::NoneOf),
            ("apply_if_and", &self.apply_if_and, ConditionKind::AllOf),
            ("apply_if_or", &self.apply_if_or, ConditionKind::AnyOf),
        ];
        let declared: Vec<_> = clauses
            .iter()
            .filter(|(_, terms, _)| !terms.is_empty())
            .collect();

        let &(clause, terms, kind) = match declared.as_slice() {
            [] => return Ok(None),
            [one] => *one,
            many => {
                return Err(FormatErrorKind::ConflictingConditions(
                    many.iter().map(|(clause, _, _)| *clause).collect(),
                ));
            }
        };

        let (expected, arity_ok) = match clause {
            "apply_if" => ("exactly one flag/value pair", terms.len() == 2),
            "apply_if_not" => (
                "one or more flag/value pairs",
                !terms.is_empty() && terms.len() % 2 == 0,
            ),
            _ => (
                "two or more flag/value pairs",
                terms.len() > 2 && terms.len() % 2 == 0,
            ),
        };
        if !arity_ok {
            return Err(FormatErrorKind::ConditionArity {
                clause,
                expected,
                found: terms.len(),
            });
        }

        let terms = terms
            .chunks(2)
            .map(|pair| {
                let (flag, value) = (pair[0].trim(), pair[1].trim());
                if flag.is_empty() || value.is_empty() {
                    Err(FormatErrorKind::EmptyConditionTerm { clause })
                } else {
                    Ok(FlagTerm {
                        flag: flag.to_string(),
                        expected: value.to_string(),
                    })
                }
            })
            .collect::<Result<_, _>>()?;

        Ok(Some(Condition { kind, terms }))
    }

    /// Parse the rule, collecting every format error.
    ///
    /// The returned [`ParsedRule`] contains whatever could be parsed; pairs
    /// with format errors are left out so the remaining ones can still be
    /// checked.
    pub fn parse(&self) -> (ParsedRule, Vec<FormatErrorKind>) {
        let mut errors = Vec::new();

        if self.fail_on.is_empty() && self.counts.is_empty() {
            errors.push(FormatErrorKind::EmptyRule);
        }

        let condition = self.condition().unwrap_or_else(|e| {
            errors.push(e);
            None
        });

        let forbidden = if self.fail_on.is_empty() {
            None
        } else {
            let (patterns, expand_errors) = expand_patterns(&self.fail_on);
            errors.extend(expand_errors);
            ForbiddenCheck::compile(patterns, &mut errors)
        };

        let counts = parse_counts(&self.counts, &mut errors);

        (
            ParsedRule {
                condition,
                forbidden,
                counts,
            },
            errors,
        )
    }

    /// All format errors of this rule
    pub fn validate(&self) -> Vec<FormatErrorKind> {
        self.parse().1
    }
}

impl fmt::Display for StructuralRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            ("fail_on", &self.fail_on),
            ("counts", &self.counts),
            ("apply_if", &self.apply_if),
            ("apply_if_not", &self.apply_if_not),
            ("apply_if_and", &self.apply_if_and),
            ("apply_if_or", &self.apply_if_or),
        ];
        f.write_str("rule(")?;
        let mut first = true;
        for (name, values) in fields.iter().filter(|(_, values)| !values.is_empty()) {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{name} = {values:?}")?;
        }
        f.write_str(")")
    }
}

/// Compile a regex, recording a format error on failure.
fn compile_pattern(pattern: &NodePattern, errors: &mut Vec<FormatErrorKind>) -> Option<Regex> {
    Regex::new(&pattern.regex)
        .map_err(|e| {
            errors.push(FormatErrorKind::InvalidRegex {
                pattern: pattern.description.clone(),
                reason: e.to_string(),
            })
        })
        .ok()
}

fn parse_counts(tokens: &[String], errors: &mut Vec<FormatErrorKind>) -> Vec<CountCheck> {
    let mut checks = Vec::new();
    let mut at = 0;

    while at < tokens.len() {
        let (pattern, consumed) = match expand_at(tokens, at) {
            Ok(expanded) => expanded,
            Err(error) => {
                errors.push(error);
                break;
            }
        };
        at += consumed;

        let Some(expression) = tokens.get(at) else {
            errors.push(FormatErrorKind::MissingCountExpression {
                pattern: pattern.description,
            });
            break;
        };
        at += 1;

        let comparison = match Comparison::<i64>::parse(expression) {
            Ok(comparison) if comparison.expected < 0 => {
                errors.push(FormatErrorKind::NegativeCount {
                    pattern: pattern.description,
                    value: comparison.expected,
                });
                continue;
            }
            Ok(comparison) => Comparison {
                comparator: comparison.comparator,
                expected: comparison.expected as u64,
            },
            Err(reason) => {
                errors.push(FormatErrorKind::InvalidCount {
                    pattern: pattern.description,
                    reason,
                });
                continue;
            }
        };

        if let Some(regex) = compile_pattern(&pattern, errors) {
            checks.push(CountCheck {
                pattern,
                regex,
                comparison,
            });
        }
    }

    checks
}

/// How the terms of a condition combine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    AllOf,
    NoneOf,
    AnyOf,
}

/// One `flag`/`expected` pair of a condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagTerm {
    pub flag: String,
    pub expected: String,
}

impl FlagTerm {
    pub fn evaluate(&self, flags: &(impl FlagSource + ?Sized)) -> Result<bool, ConditionError> {
        flags.flag_matches(&self.flag, &self.expected)
    }
}

/// A validated condition clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub terms: Vec<FlagTerm>,
}

impl Condition {
    /// Decide whether the rule is active under the given flags.
    pub fn evaluate(&self, flags: &(impl FlagSource + ?Sized)) -> Result<bool, ConditionError> {
        match self.kind {
            ConditionKind::AllOf => {
                for term in &self.terms {
                    if !term.evaluate(flags)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ConditionKind::NoneOf => self.none_match(flags),
            // "at least one matches" is the negation of "none matches"
            ConditionKind::AnyOf => self.none_match(flags).map(|none| !none),
        }
    }

    fn none_match(&self, flags: &(impl FlagSource + ?Sized)) -> Result<bool, ConditionError> {
        for term in &self.terms {
            if term.evaluate(flags)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Forbidden patterns, compiled individually and as one alternation
#[derive(Debug, Clone)]
pub struct ForbiddenCheck {
    pub patterns: Vec<(NodePattern, Regex)>,
    /// `(?:p1)|(?:p2)|...`, compiled once for the fast negative path
    pub combined: Regex,
}

impl ForbiddenCheck {
    fn compile(patterns: Vec<NodePattern>, errors: &mut Vec<FormatErrorKind>) -> Option<Self> {
        let compiled: Vec<_> = patterns
            .into_iter()
            .filter_map(|pattern| compile_pattern(&pattern, errors).map(|regex| (pattern, regex)))
            .collect();
        if compiled.is_empty() {
            return None;
        }

        let alternation = compiled
            .iter()
            .map(|(pattern, _)| format!("(?:{})", pattern.regex))
            .collect::<Vec<_>>()
            .join("|");
        let combined = Regex::new(&alternation)
            .map_err(|e| {
                errors.push(FormatErrorKind::InvalidRegex {
                    pattern: alternation.clone(),
                    reason: e.to_string(),
                })
            })
            .ok()?;

        Some(Self {
            patterns: compiled,
            combined,
        })
    }
}

/// One `pattern` / `count-expression` pair
#[derive(Debug, Clone)]
pub struct CountCheck {
    pub pattern: NodePattern,
    pub regex: Regex,
    pub comparison: Comparison<u64>,
}

/// A rule after parsing: everything the matcher and encoder need
#[derive(Debug, Clone)]
pub struct ParsedRule {
    pub condition: Option<Condition>,
    pub forbidden: Option<ForbiddenCheck>,
    pub counts: Vec<CountCheck>,
}

/// The structural rules declared on one routine, in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineRules {
    pub routine: String,
    pub rules: Vec<StructuralRule>,
}

impl RoutineRules {
    pub fn new(routine: impl Into<String>, rules: Vec<StructuralRule>) -> Self {
        Self {
            routine: routine.into(),
            rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ConditionKind, FlagSnapshot, FormatErrorKind, StructuralRule,
        comparator::Comparator,
        node::{ALLOC_OF, CALL},
    };

    fn flags(value: i64) -> FlagSnapshot {
        FlagSnapshot::new().with("F", value).with("UseFast", true)
    }

    #[test]
    fn test_rule_without_condition_has_none() {
        let rule = StructuralRule::new().fail_on([CALL]);
        assert_eq!(rule.condition(), Ok(None));
    }

    #[test]
    fn test_apply_if_active_iff_equal() {
        let rule = StructuralRule::new().fail_on([CALL]).apply_if(["F", "50"]);
        let condition = rule.condition().unwrap().unwrap();
        assert_eq!(condition.kind, ConditionKind::AllOf);
        assert!(condition.evaluate(&flags(50)).unwrap());
        assert!(!condition.evaluate(&flags(49)).unwrap());
    }

    #[test]
    fn test_apply_if_not_active_iff_not_equal() {
        let rule = StructuralRule::new().fail_on([CALL]).apply_if_not(["F", "50"]);
        let condition = rule.condition().unwrap().unwrap();
        assert!(!condition.evaluate(&flags(50)).unwrap());
        assert!(condition.evaluate(&flags(51)).unwrap());
    }

    #[test]
    fn test_apply_if_or_matches_any_term() {
        let rule = StructuralRule::new()
            .fail_on([CALL])
            .apply_if_or(["F", "49", "F", "51"]);
        let condition = rule.condition().unwrap().unwrap();
        assert!(condition.evaluate(&flags(49)).unwrap());
        assert!(condition.evaluate(&flags(51)).unwrap());
        assert!(!condition.evaluate(&flags(50)).unwrap());
    }

    #[test]
    fn test_apply_if_and_requires_every_term() {
        let rule = StructuralRule::new()
            .fail_on([CALL])
            .apply_if_and(["F", ">= 10", "UseFast", "true"]);
        let condition = rule.condition().unwrap().unwrap();
        assert!(condition.evaluate(&flags(10)).unwrap());
        assert!(!condition.evaluate(&flags(9)).unwrap());
    }

    #[test]
    fn test_two_clause_kinds_is_format_error() {
        let rule = StructuralRule::new()
            .fail_on([CALL])
            .apply_if(["F", "1"])
            .apply_if_not(["F", "2"]);
        assert_eq!(
            rule.condition(),
            Err(FormatErrorKind::ConflictingConditions(vec![
                "apply_if",
                "apply_if_not"
            ]))
        );
    }

    #[test]
    fn test_and_or_need_more_than_one_pair() {
        let rule = StructuralRule::new().fail_on([CALL]).apply_if_or(["F", "1"]);
        assert!(matches!(
            rule.condition(),
            Err(FormatErrorKind::ConditionArity { clause: "apply_if_or", found: 2, .. })
        ));
        let rule = StructuralRule::new()
            .fail_on([CALL])
            .apply_if_and(["F", "1", "G"]);
        assert!(matches!(
            rule.condition(),
            Err(FormatErrorKind::ConditionArity { clause: "apply_if_and", found: 3, .. })
        ));
    }

    #[test]
    fn test_empty_rule_is_format_error() {
        assert_eq!(StructuralRule::new().validate(), vec![FormatErrorKind::EmptyRule]);
    }

    #[test]
    fn test_count_errors_do_not_stop_remaining_pairs() {
        let rule = StructuralRule::new().counts(["Store", "abc", "Load", "-1", "Call", ">= 1", "Add"]);
        let (parsed, errors) = rule.parse();

        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(matches!(errors[0], FormatErrorKind::InvalidCount { .. }));
        assert!(matches!(errors[1], FormatErrorKind::NegativeCount { value: -1, .. }));
        assert!(matches!(errors[2], FormatErrorKind::MissingCountExpression { .. }));

        assert_eq!(parsed.counts.len(), 1);
        assert_eq!(parsed.counts[0].pattern.description, "Call");
        assert_eq!(parsed.counts[0].comparison.comparator, Comparator::Ge);
        assert_eq!(parsed.counts[0].comparison.expected, 1);
    }

    #[test]
    fn test_composite_count_pattern() {
        let rule = StructuralRule::new().counts([ALLOC_OF, "MyBox", "2"]);
        let (parsed, errors) = rule.parse();
        assert!(errors.is_empty());
        assert_eq!(parsed.counts[0].pattern.description, "ALLOC_OF \"MyBox\"");
        assert_eq!(parsed.counts[0].comparison.expected, 2);
    }

    #[test]
    fn test_invalid_regex_is_format_error() {
        let rule = StructuralRule::new().fail_on(["Store(", CALL]);
        let (parsed, errors) = rule.parse();
        assert!(matches!(errors[0], FormatErrorKind::InvalidRegex { .. }));
        assert_eq!(parsed.forbidden.unwrap().patterns.len(), 1);
    }

    #[test]
    fn test_display_lists_declared_fields() {
        let rule = StructuralRule::new().fail_on(["Call"]).apply_if(["F", "1"]);
        assert_eq!(
            rule.to_string(),
            r#"rule(fail_on = ["Call"], apply_if = ["F", "1"])"#
        );
    }
}
