// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Comparison expressions
//!
//! Count expressions and numeric flag conditions are written as an optional
//! relational prefix followed by a literal:
//!
//! | Expression | Meaning |
//! |------------|---------|
//! | `50`, `=50`, `= 50` | equal to 50 |
//! | `!=50` | not equal to 50 |
//! | `<50`, `<=50` | less than (or equal to) 50 |
//! | `>50`, `>=50` | greater than (or equal to) 50 |
//!
//! Whitespace around the operator and the literal is insignificant.

use std::{fmt, str::FromStr};

use crate::error::ComparatorError;

/// Relational predicate over an (actual, expected) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
    Eq,
}

impl Comparator {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Ne => "!=",
            Comparator::Eq => "=",
        }
    }

    /// Evaluate `actual <op> expected`.
    pub fn test<T: PartialOrd + ?Sized>(self, actual: &T, expected: &T) -> bool {
        match self {
            Comparator::Lt => actual < expected,
            Comparator::Le => actual <= expected,
            Comparator::Gt => actual > expected,
            Comparator::Ge => actual >= expected,
            Comparator::Ne => actual != expected,
            Comparator::Eq => actual == expected,
        }
    }

    /// Split an expression into its comparator and the trimmed literal.
    ///
    /// # Errors
    ///
    /// - [`ComparatorError::Empty`] for an empty expression
    /// - [`ComparatorError::InvalidValueFormat`] for `!` not followed by `=`,
    ///   or an operator with no literal after it
    pub fn parse(input: &str) -> Result<(Comparator, &str), ComparatorError> {
        let trimmed = input.trim();
        let (comparator, rest) = match trimmed.as_bytes() {
            [] => return Err(ComparatorError::Empty),
            [b'<', b'=', ..] => (Comparator::Le, &trimmed[2..]),
            [b'<', ..] => (Comparator::Lt, &trimmed[1..]),
            [b'>', b'=', ..] => (Comparator::Ge, &trimmed[2..]),
            [b'>', ..] => (Comparator::Gt, &trimmed[1..]),
            [b'!', b'=', ..] => (Comparator::Ne, &trimmed[2..]),
            [b'!', ..] => return Err(ComparatorError::InvalidValueFormat(input.to_string())),
            [b'=', ..] => (Comparator::Eq, &trimmed[1..]),
            _ => (Comparator::Eq, trimmed),
        };

        let literal = rest.trim();
        if literal.is_empty() {
            return Err(ComparatorError::InvalidValueFormat(input.to_string()));
        }
        Ok((comparator, literal))
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A parsed comparison: comparator plus typed expected value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison<T> {
    pub comparator: Comparator,
    pub expected: T,
}

impl<T: FromStr> Comparison<T> {
    /// Parse an expression and convert its literal to `T`.
    ///
    /// A literal that does not parse as `T` yields
    /// [`ComparatorError::InvalidNumber`], distinct from a malformed operator.
    pub fn parse(input: &str) -> Result<Self, ComparatorError> {
        let (comparator, literal) = Comparator::parse(input)?;
        let expected = literal
            .parse::<T>()
            .map_err(|_| ComparatorError::InvalidNumber {
                input: input.to_string(),
                literal: literal.to_string(),
            })?;
        Ok(Self {
            comparator,
            expected,
        })
    }
}

impl<T: PartialOrd> Comparison<T> {
    pub fn holds(&self, actual: &T) -> bool {
        self.comparator.test(actual, &self.expected)
    }
}

impl<T: fmt::Display> fmt::Display for Comparison<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.comparator, self.expected)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Comparator, ComparatorError, Comparison};

    #[test]
    fn test_equality_spellings_are_equivalent() {
        for input in ["50", "=50", "= 50", " =  50"] {
            let (comparator, literal) = Comparator::parse(input).unwrap();
            assert_eq!(comparator, Comparator::Eq, "input {input:?}");
            assert_eq!(literal, "50", "input {input:?}");
        }
    }

    #[test]
    fn test_two_char_operators() {
        assert_eq!(Comparator::parse("<=50").unwrap(), (Comparator::Le, "50"));
        assert_eq!(Comparator::parse("<= 50").unwrap(), (Comparator::Le, "50"));
        assert_eq!(Comparator::parse(">=7").unwrap(), (Comparator::Ge, "7"));
        assert_eq!(Comparator::parse("!= 3").unwrap(), (Comparator::Ne, "3"));
        assert_eq!(Comparator::parse("<1").unwrap(), (Comparator::Lt, "1"));
        assert_eq!(Comparator::parse(" > 1 ").unwrap(), (Comparator::Gt, "1"));
    }

    #[test]
    fn test_bang_without_equals_is_format_error() {
        assert!(matches!(
            Comparator::parse("!5"),
            Err(ComparatorError::InvalidValueFormat(_))
        ));
    }

    #[test]
    fn test_empty_input_is_format_error() {
        assert_eq!(Comparator::parse(""), Err(ComparatorError::Empty));
        assert_eq!(Comparator::parse("   "), Err(ComparatorError::Empty));
    }

    #[test]
    fn test_operator_without_literal() {
        assert!(matches!(
            Comparator::parse("<="),
            Err(ComparatorError::InvalidValueFormat(_))
        ));
    }

    #[test]
    fn test_number_error_is_distinct_from_format_error() {
        let err = Comparison::<i64>::parse(">= abc").unwrap_err();
        assert!(matches!(err, ComparatorError::InvalidNumber { ref literal, .. } if literal == "abc"));
    }

    #[test]
    fn test_comparison_holds() {
        let at_most = Comparison::<i64>::parse("<=50").unwrap();
        assert!(at_most.holds(&50));
        assert!(at_most.holds(&-1));
        assert!(!at_most.holds(&51));

        let not_five = Comparison::<f64>::parse("!=5.0").unwrap();
        assert!(not_five.holds(&5.5));
        assert!(!not_five.holds(&5.0));
    }

    #[test]
    fn test_display_round_trips_symbol() {
        let comparison = Comparison::<u64>::parse(">= 2").unwrap();
        assert_eq!(comparison.to_string(), ">= 2");
    }
}
