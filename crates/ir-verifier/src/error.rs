// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fatal verification errors

use ir_rules::EncodingError;
use thiserror::Error;

/// Result type for verification
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Internal consistency errors. These abort verification; rule violations are
/// reported through [`crate::VerificationReport`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("no compilation of routine '{routine}' found in the trace (active rules {rules:?})")]
    MissingSegment { routine: String, rules: Vec<usize> },

    #[error("routine '{routine}' has no rule index {index}, it declares {declared} rule(s)")]
    UnknownRuleIndex {
        routine: String,
        index: usize,
        declared: usize,
    },

    #[error("routine '{0}' has active rules in the encoding but none declared")]
    UnknownRoutine(String),
}
