// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Structural IR rules
//!
//! Declarations of what the optimized IR of a routine must or must not
//! contain, and the encoding that tells the verifier which of them apply to a
//! given run.
//!
//! # Overview
//!
//! ```text
//! StructuralRule (declared per routine)
//!      ↓ condition evaluated against FlagSource
//! RuleEncoder → Encoding block on stdout
//!      ↓ parsed back by ir-verifier
//! ParsedRule (compiled regexes) → matcher
//! ```
//!
//! # Rule fields
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `fail_on` | none of the patterns may occur |
//! | `counts` | `pattern count-expression` pairs, e.g. `"Store", ">= 1"` |
//! | `apply_if*` | flag condition, see [`rule`] |
//!
//! Patterns are either IR node placeholders (see [`node`]) or raw regexes.

mod comparator;
mod encoding;
mod error;
mod flags;
pub mod node;
pub mod rule;

pub use comparator::{Comparator, Comparison};
pub use encoding::{
    ENCODING_END, ENCODING_FORMAT, ENCODING_START, Encoding, RuleApplicability, RuleEncoder,
};
pub use error::{
    ComparatorError, ConditionError, EncodingError, FormatError, FormatErrorKind, FormatErrors,
};
pub use flags::{FlagSnapshot, FlagSource, FlagValue};
pub use node::{IrNode, NodePattern};
pub use rule::{
    Condition, ConditionKind, CountCheck, FlagTerm, ForbiddenCheck, ParsedRule, RoutineRules,
    StructuralRule,
};

/// Result type for encoding operations
pub type EncodingResult<T> = Result<T, EncodingError>;
