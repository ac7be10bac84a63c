// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Runtime flag model
//!
//! Rule conditions are evaluated against the flag state of the runtime under
//! test. [`FlagSource`] is the lookup contract (implemented by the live
//! runtime control and by [`FlagSnapshot`]); flags come in four type families
//! and a lookup tries them in order: integer, boolean, floating, string.

use std::{collections::BTreeMap, fmt};

use crate::{
    comparator::Comparison,
    error::{ConditionError, FormatErrorKind},
};

/// Typed value of a runtime flag
#[derive(Debug, Clone, PartialEq)]
pub enum FlagValue {
    Int(i64),
    Bool(bool),
    Float(f64),
    Str(String),
}

impl FlagValue {
    /// Parse a command-line style value: integers, floats, `true`/`false`,
    /// anything else is a string.
    pub fn infer(value: &str) -> Self {
        if let Ok(int) = value.parse::<i64>() {
            FlagValue::Int(int)
        } else if let Ok(float) = value.parse::<f64>() {
            FlagValue::Float(float)
        } else if let Some(boolean) = parse_bool(value) {
            FlagValue::Bool(boolean)
        } else {
            FlagValue::Str(value.to_string())
        }
    }

    /// Check this value against an expected expression.
    ///
    /// Numeric flags accept a comparator prefix; boolean flags require exact
    /// equality after parsing `true`/`false`; string flags require exact
    /// textual equality.
    pub fn matches(&self, flag: &str, expected: &str) -> Result<bool, FormatErrorKind> {
        let invalid = |reason: String| FormatErrorKind::InvalidFlagValue {
            flag: flag.to_string(),
            value: expected.to_string(),
            reason,
        };

        match self {
            FlagValue::Int(actual) => Comparison::<i64>::parse(expected)
                .map(|comparison| comparison.holds(actual))
                .map_err(|e| invalid(e.to_string())),
            FlagValue::Float(actual) => Comparison::<f64>::parse(expected)
                .map(|comparison| comparison.holds(actual))
                .map_err(|e| invalid(e.to_string())),
            FlagValue::Bool(actual) => parse_bool(expected.trim())
                .map(|expected| expected == *actual)
                .ok_or_else(|| invalid("expected 'true' or 'false'".to_string())),
            FlagValue::Str(actual) => Ok(actual == expected),
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Int(v) => write!(f, "{v}"),
            FlagValue::Bool(v) => write!(f, "{v}"),
            FlagValue::Float(v) => write!(f, "{v}"),
            FlagValue::Str(v) => f.write_str(v),
        }
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        FlagValue::Int(value)
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Bool(value)
    }
}

impl From<f64> for FlagValue {
    fn from(value: f64) -> Self {
        FlagValue::Float(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        FlagValue::Str(value.to_string())
    }
}

impl From<String> for FlagValue {
    fn from(value: String) -> Self {
        FlagValue::Str(value)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Read access to runtime flags, one method per type family.
pub trait FlagSource {
    fn int_flag(&self, name: &str) -> Option<i64>;
    fn bool_flag(&self, name: &str) -> Option<bool>;
    fn float_flag(&self, name: &str) -> Option<f64>;
    fn string_flag(&self, name: &str) -> Option<String>;

    /// Look a flag up in every family, integer first.
    fn flag(&self, name: &str) -> Option<FlagValue> {
        self.int_flag(name)
            .map(FlagValue::Int)
            .or_else(|| self.bool_flag(name).map(FlagValue::Bool))
            .or_else(|| self.float_flag(name).map(FlagValue::Float))
            .or_else(|| self.string_flag(name).map(FlagValue::Str))
    }

    /// Check a flag against an expected expression.
    ///
    /// An unknown flag is a [`ConditionError::UnknownFlag`], never `false`.
    fn flag_matches(&self, name: &str, expected: &str) -> Result<bool, ConditionError> {
        let value = self
            .flag(name)
            .ok_or_else(|| ConditionError::UnknownFlag(name.to_string()))?;
        Ok(value.matches(name, expected)?)
    }
}

/// Read-only in-memory flag state
///
/// Used as the flag view of simulated runtimes and to evaluate rules without a
/// live runtime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagSnapshot {
    values: BTreeMap<String, FlagValue>,
}

impl FlagSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FlagValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FlagValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FlagValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Apply one runtime option: `+Name`, `-Name` or `Name=value`, with an
    /// optional `-XX:` prefix. Returns false if the option is not a flag
    /// setting (it is left untouched).
    pub fn apply_option(&mut self, option: &str) -> bool {
        let option = option.trim();
        let option = option.strip_prefix("-XX:").unwrap_or(option);

        if let Some((name, value)) = option.split_once('=') {
            if name.is_empty() {
                return false;
            }
            self.insert(name, FlagValue::infer(value));
            true
        } else if let Some(name) = option.strip_prefix('+').filter(|n| !n.is_empty()) {
            self.insert(name, true);
            true
        } else if let Some(name) = option.strip_prefix('-').filter(|n| !n.is_empty()) {
            self.insert(name, false);
            true
        } else {
            false
        }
    }

    /// Copy the named flags out of another source (e.g. a live runtime).
    pub fn capture<'a>(
        source: &(impl FlagSource + ?Sized),
        names: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let values = names
            .into_iter()
            .filter_map(|name| source.flag(name).map(|value| (name.to_string(), value)))
            .collect();
        Self { values }
    }
}

impl FlagSource for FlagSnapshot {
    fn int_flag(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(FlagValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    fn bool_flag(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(FlagValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    fn float_flag(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(FlagValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    fn string_flag(&self, name: &str) -> Option<String> {
        match self.values.get(name) {
            Some(FlagValue::Str(v)) => Some(v.clone()),
            _ => None,
        }
    }
}
