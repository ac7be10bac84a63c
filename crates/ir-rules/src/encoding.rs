// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Rule encoding
//!
//! Which rules apply to which routine depends on the flags of the instrumented
//! run, but the rules are checked afterwards, outside of it. The instrumented
//! run therefore prints the active rule indices as a marker-delimited block
//! that the verifier later scans its captured output for:
//!
//! ```text
//! ##### IR rule encoding - consumed by ir-verifier #####
//! # <routine>,<comma separated active rule indices or -1>
//! sum,0,2
//! loop_body,-1
//! ----- END -----
//! ```
//!
//! Indices are 0-based in declaration order. `-1` means no rule applies.

use std::{fmt, io};

use tracing::debug;

use crate::{
    error::{ConditionError, EncodingError, FormatError, FormatErrors},
    flags::FlagSource,
    rule::RoutineRules,
};

pub const ENCODING_START: &str = "##### IR rule encoding - consumed by ir-verifier #####";
pub const ENCODING_FORMAT: &str = "# <routine>,<comma separated active rule indices or -1>";
pub const ENCODING_END: &str = "----- END -----";

const NONE_ACTIVE: &str = "-1";

/// Active rules of one routine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleApplicability {
    /// Indices of the active rules, ascending
    Active(Vec<usize>),
    NoneActive,
}

impl RuleApplicability {
    fn from_indices(indices: Vec<usize>) -> Self {
        if indices.is_empty() {
            RuleApplicability::NoneActive
        } else {
            RuleApplicability::Active(indices)
        }
    }

    pub fn indices(&self) -> &[usize] {
        match self {
            RuleApplicability::Active(indices) => indices,
            RuleApplicability::NoneActive => &[],
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RuleApplicability::Active(_))
    }
}

impl fmt::Display for RuleApplicability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleApplicability::NoneActive => f.write_str(NONE_ACTIVE),
            RuleApplicability::Active(indices) => {
                let mut first = true;
                for index in indices {
                    if !first {
                        f.write_str(",")?;
                    }
                    first = false;
                    write!(f, "{index}")?;
                }
                Ok(())
            }
        }
    }
}

/// Ordered map from routine name to its active rules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoding {
    entries: Vec<(String, RuleApplicability)>,
}

impl Encoding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a routine. Routines appear at most once.
    pub fn insert(
        &mut self,
        routine: impl Into<String>,
        applicability: RuleApplicability,
    ) -> Result<(), EncodingError> {
        let routine = routine.into();
        if self.get(&routine).is_some() {
            return Err(EncodingError::DuplicateRoutine(routine));
        }
        self.entries.push((routine, applicability));
        Ok(())
    }

    pub fn get(&self, routine: &str) -> Option<&RuleApplicability> {
        self.entries
            .iter()
            .find(|(name, _)| name == routine)
            .map(|(_, applicability)| applicability)
    }

    /// Active rule indices of a routine; empty if unknown or none active.
    pub fn active_rules(&self, routine: &str) -> &[usize] {
        self.get(routine)
            .map(RuleApplicability::indices)
            .unwrap_or(&[])
    }

    pub fn contains(&self, routine: &str) -> bool {
        self.get(routine).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RuleApplicability)> {
        self.entries
            .iter()
            .map(|(routine, applicability)| (routine.as_str(), applicability))
    }

    /// Routines with at least one active rule
    pub fn active(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.iter()
            .filter(|(_, applicability)| applicability.is_active())
            .map(|(routine, applicability)| (routine, applicability.indices()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the marker-delimited block.
    pub fn write_to<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{self}")?;
        out.flush()
    }

    /// Scan `text` for the encoding block and parse it.
    ///
    /// Everything before the start marker and after the end marker is
    /// ignored, so `text` may be the whole captured stdout of a run.
    pub fn parse(text: &str) -> Result<Self, EncodingError> {
        let mut lines = text.lines().enumerate();

        lines
            .by_ref()
            .find(|(_, line)| line.trim() == ENCODING_START)
            .ok_or(EncodingError::MissingStart)?;

        let mut encoding = Encoding::new();
        for (number, line) in lines {
            let line = line.trim();
            if line == ENCODING_END {
                return Ok(encoding);
            }
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let malformed = || EncodingError::MalformedLine {
                line: number + 1,
                text: line.to_string(),
            };
            let (routine, indices) = line.split_once(',').ok_or_else(malformed)?;
            let routine = routine.trim();
            if routine.is_empty() {
                return Err(malformed());
            }

            let applicability = if indices.trim() == NONE_ACTIVE {
                RuleApplicability::NoneActive
            } else {
                let indices = indices
                    .split(',')
                    .map(|index| index.trim().parse::<usize>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| malformed())?;
                RuleApplicability::Active(indices)
            };
            encoding.insert(routine, applicability)?;
        }

        Err(EncodingError::MissingEnd)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{ENCODING_START}")?;
        writeln!(f, "{ENCODING_FORMAT}")?;
        for (routine, applicability) in self.iter() {
            writeln!(f, "{routine},{applicability}")?;
        }
        writeln!(f, "{ENCODING_END}")
    }
}

/// Computes rule applicability from the live flag state
pub struct RuleEncoder<'f, F: FlagSource + ?Sized> {
    flags: &'f F,
}

impl<'f, F: FlagSource + ?Sized> RuleEncoder<'f, F> {
    pub fn new(flags: &'f F) -> Self {
        Self { flags }
    }

    /// Active rules of one routine.
    ///
    /// Format errors in conditions are pushed to `errors` and the rule counts
    /// as inactive. An unknown flag aborts.
    pub fn applicability(
        &self,
        routine: &RoutineRules,
        errors: &mut FormatErrors,
    ) -> Result<RuleApplicability, EncodingError> {
        let mut active = Vec::new();

        for (index, rule) in routine.rules.iter().enumerate() {
            let origin = || format!("routine '{}' rule {}", routine.routine, index + 1);
            let condition = match rule.condition() {
                Ok(condition) => condition,
                Err(kind) => {
                    errors.push(FormatError::new(origin(), kind));
                    continue;
                }
            };

            let is_active = match condition.map(|c| c.evaluate(self.flags)) {
                None => true,
                Some(Ok(is_active)) => is_active,
                Some(Err(ConditionError::UnknownFlag(flag))) => {
                    return Err(EncodingError::UnknownFlag {
                        routine: routine.routine.clone(),
                        rule: index + 1,
                        flag,
                    });
                }
                Some(Err(ConditionError::Format(kind))) => {
                    errors.push(FormatError::new(origin(), kind));
                    false
                }
            };
            if is_active {
                active.push(index);
            }
        }

        Ok(RuleApplicability::from_indices(active))
    }

    /// Encode every routine that declares rules.
    ///
    /// Routines rejected by `eligible` (filtered out, or not compiled in this
    /// run) are encoded as [`RuleApplicability::NoneActive`] without
    /// evaluating their conditions.
    pub fn encode<'r>(
        &self,
        routines: impl IntoIterator<Item = &'r RoutineRules>,
        eligible: impl Fn(&str) -> bool,
    ) -> Result<Encoding, EncodingError> {
        let mut encoding = Encoding::new();
        let mut errors = FormatErrors::default();

        for routine in routines {
            if routine.rules.is_empty() {
                continue;
            }
            let applicability = if eligible(&routine.routine) {
                self.applicability(routine, &mut errors)?
            } else {
                RuleApplicability::NoneActive
            };
            debug!(routine = %routine.routine, rules = %applicability, "rule applicability");
            encoding.insert(routine.routine.clone(), applicability)?;
        }

        errors.into_result()?;
        Ok(encoding)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{FlagSnapshot, FormatErrorKind, StructuralRule};

    fn routine(rules: Vec<StructuralRule>) -> RoutineRules {
        RoutineRules::new("sum", rules)
    }

    #[test]
    fn test_unconditional_and_conditional_rules() {
        let flags = FlagSnapshot::new().with("F", 50);
        let rules = routine(vec![
            StructuralRule::new().fail_on(["Call"]),
            StructuralRule::new().fail_on(["Call"]).apply_if(["F", "49"]),
            StructuralRule::new().fail_on(["Call"]).apply_if_not(["F", "49"]),
        ]);

        let mut errors = FormatErrors::default();
        let applicability = RuleEncoder::new(&flags)
            .applicability(&rules, &mut errors)
            .unwrap();
        assert!(errors.is_empty());
        assert_eq!(applicability, RuleApplicability::Active(vec![0, 2]));
    }

    #[test]
    fn test_no_active_rule_is_sentinel() {
        let flags = FlagSnapshot::new().with("F", 50);
        let rules = routine(vec![StructuralRule::new().fail_on(["Call"]).apply_if(["F", "1"])]);
        let encoding = RuleEncoder::new(&flags).encode([&rules], |_| true).unwrap();
        assert_eq!(encoding.get("sum"), Some(&RuleApplicability::NoneActive));
        assert_eq!(encoding.active().count(), 0);
    }

    #[test]
    fn test_unknown_flag_is_fatal() {
        let flags = FlagSnapshot::new();
        let rules = routine(vec![StructuralRule::new().fail_on(["Call"]).apply_if(["Nope", "1"])]);
        let err = RuleEncoder::new(&flags).encode([&rules], |_| true).unwrap_err();
        assert_eq!(
            err,
            EncodingError::UnknownFlag {
                routine: "sum".into(),
                rule: 1,
                flag: "Nope".into()
            }
        );
    }

    #[test]
    fn test_format_errors_are_accumulated() {
        let flags = FlagSnapshot::new().with("F", 50).with("B", true);
        let first = routine(vec![StructuralRule::new().fail_on(["Call"]).apply_if(["F", "!5"])]);
        let second = RoutineRules::new(
            "other",
            vec![StructuralRule::new().fail_on(["Call"]).apply_if(["B", "maybe"])],
        );

        let Err(EncodingError::Format(errors)) =
            RuleEncoder::new(&flags).encode([&first, &second], |_| true)
        else {
            panic!("expected format errors");
        };
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.errors()[0].origin, "routine 'sum' rule 1");
        assert!(matches!(
            errors.errors()[1].kind,
            FormatErrorKind::InvalidFlagValue { .. }
        ));
    }

    #[test]
    fn test_ineligible_routines_are_not_evaluated() {
        let flags = FlagSnapshot::new();
        // would be an unknown flag if evaluated
        let rules = routine(vec![StructuralRule::new().fail_on(["Call"]).apply_if(["Nope", "1"])]);
        let encoding = RuleEncoder::new(&flags).encode([&rules], |_| false).unwrap();
        assert_eq!(encoding.get("sum"), Some(&RuleApplicability::NoneActive));
    }

    #[test]
    fn test_routines_without_rules_are_omitted() {
        let flags = FlagSnapshot::new();
        let encoding = RuleEncoder::new(&flags)
            .encode([&routine(vec![])], |_| true)
            .unwrap();
        assert!(encoding.is_empty());
    }

    #[test]
    fn test_parse_ignores_surrounding_output() {
        let stdout = indoc! {"
            Picked up JAVA_TOOL_OPTIONS
            ##### IR rule encoding - consumed by ir-verifier #####
            # <routine>,<comma separated active rule indices or -1>
            sum,0,2
            loop_body,-1
            ----- END -----
            sum = 42
        "};
        let encoding = Encoding::parse(stdout).unwrap();
        assert_eq!(encoding.len(), 2);
        assert_eq!(encoding.active_rules("sum"), &[0, 2]);
        assert_eq!(encoding.active_rules("loop_body"), &[] as &[usize]);
        assert!(!encoding.contains("other"));
    }

    #[test]
    fn test_written_block_parses_back() {
        let mut encoding = Encoding::new();
        encoding
            .insert("sum", RuleApplicability::Active(vec![1]))
            .unwrap();
        encoding.insert("idle", RuleApplicability::NoneActive).unwrap();

        let mut out = Vec::new();
        encoding.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("sum,1\nidle,-1\n"));
        assert_eq!(Encoding::parse(&text).unwrap(), encoding);
    }

    #[test]
    fn test_missing_markers() {
        assert_eq!(Encoding::parse("sum,0\n"), Err(EncodingError::MissingStart));
        let text = format!("{ENCODING_START}\nsum,0\n");
        assert_eq!(Encoding::parse(&text), Err(EncodingError::MissingEnd));
    }

    #[test]
    fn test_malformed_lines() {
        for bad in ["sum", ",0", "sum,x", "sum,0,,1"] {
            let text = format!("{ENCODING_START}\n{bad}\n{ENCODING_END}\n");
            assert!(
                matches!(
                    Encoding::parse(&text),
                    Err(EncodingError::MalformedLine { line: 2, .. })
                ),
                "line {bad:?}"
            );
        }
    }

    #[test]
    fn test_duplicate_routine() {
        let text = format!("{ENCODING_START}\nsum,0\nsum,1\n{ENCODING_END}\n");
        assert_eq!(
            Encoding::parse(&text),
            Err(EncodingError::DuplicateRoutine("sum".into()))
        );
    }
}
