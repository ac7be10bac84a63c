// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for rule declarations, comparisons and the rule encoding.

use std::fmt;

use thiserror::Error;

/// Error while parsing a comparison expression such as `"<=50"`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComparatorError {
    /// The expression is empty (or only whitespace).
    #[error("empty comparison value")]
    Empty,
    /// The comparator prefix is malformed or has no value after it.
    #[error("invalid value format '{0}'")]
    InvalidValueFormat(String),
    /// The comparator is fine but the literal is not a number.
    #[error("invalid number '{literal}' in '{input}'")]
    InvalidNumber { input: String, literal: String },
}

/// What is wrong with a declaration. Always wrapped in a [`FormatError`]
/// carrying the location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatErrorKind {
    #[error("rule declares neither fail_on nor counts")]
    EmptyRule,

    #[error("rule declares more than one condition clause: {}", .0.join(", "))]
    ConflictingConditions(Vec<&'static str>),

    #[error("{clause} expects {expected}, found {found} term(s)")]
    ConditionArity {
        clause: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("{clause} has an empty flag name or value")]
    EmptyConditionTerm { clause: &'static str },

    #[error("placeholder {placeholder} must be followed by a literal")]
    MissingCompositeLiteral { placeholder: String },

    #[error("pattern {pattern} has no count expression")]
    MissingCountExpression { pattern: String },

    #[error("invalid count for pattern {pattern}: {reason}")]
    InvalidCount {
        pattern: String,
        reason: ComparatorError,
    },

    #[error("negative count {value} for pattern {pattern}")]
    NegativeCount { pattern: String, value: i64 },

    #[error("invalid regex for pattern {pattern}: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("invalid value '{value}' for flag {flag}: {reason}")]
    InvalidFlagValue {
        flag: String,
        value: String,
        reason: String,
    },
}

/// A static format error: a self-inconsistent declaration, located by a
/// human readable origin such as `routine 'foo' rule 2`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{origin}: {kind}")]
pub struct FormatError {
    pub origin: String,
    pub kind: FormatErrorKind,
}

impl FormatError {
    pub fn new(origin: impl Into<String>, kind: FormatErrorKind) -> Self {
        Self {
            origin: origin.into(),
            kind,
        }
    }
}

/// All format errors found in one pass. Format errors are collected rather
/// than raised one at a time so a single run reports every mistake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatErrors {
    errors: Vec<FormatError>,
}

impl FormatErrors {
    /// Returns true if no format error was recorded
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns the list of format errors
    pub fn errors(&self) -> &[FormatError] {
        &self.errors
    }

    /// Consumes the aggregate and returns the errors
    pub fn into_errors(self) -> Vec<FormatError> {
        self.errors
    }

    pub fn push(&mut self, error: FormatError) {
        self.errors.push(error);
    }

    /// Record every kind under the same origin.
    pub fn extend_at(
        &mut self,
        origin: &str,
        kinds: impl IntoIterator<Item = FormatErrorKind>,
    ) {
        self.errors
            .extend(kinds.into_iter().map(|kind| FormatError::new(origin, kind)));
    }

    /// `Ok(())` if empty, the aggregate otherwise.
    pub fn into_result(self) -> Result<(), FormatErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Extend<FormatError> for FormatErrors {
    fn extend<T: IntoIterator<Item = FormatError>>(&mut self, iter: T) {
        self.errors.extend(iter);
    }
}

impl fmt::Display for FormatErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} format error(s):", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FormatErrors {}

/// Error while evaluating a rule condition against live flags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// The flag is unknown in every type family. This is a configuration
    /// error, never a `false` result.
    #[error("unknown flag '{0}'")]
    UnknownFlag(String),
    #[error(transparent)]
    Format(#[from] FormatErrorKind),
}

/// Errors produced while computing, writing or reading the rule encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("routine '{routine}' rule {rule}: unknown flag '{flag}'")]
    UnknownFlag {
        routine: String,
        rule: usize,
        flag: String,
    },

    #[error(transparent)]
    Format(#[from] FormatErrors),

    #[error("rule encoding start marker not found")]
    MissingStart,

    #[error("rule encoding end marker not found")]
    MissingEnd,

    #[error("malformed rule encoding line {line}: '{text}'")]
    MalformedLine { line: usize, text: String },

    #[error("routine '{0}' appears twice in the rule encoding")]
    DuplicateRoutine(String),
}
