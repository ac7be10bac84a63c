// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! IR verifier
//!
//! Checks the structural rules of a class under test against the compilation
//! trace of an instrumented run. Runs after the run, outside of it, and is a
//! pure function of its inputs.
//!
//! # Pipeline
//!
//! ```text
//! captured stdout ──→ Encoding (active rules per routine)
//!                          ↓
//! compilation trace ──→ Segmenter (last normal compile per routine)
//!                          ↓
//!                     matcher (forbidden / count checks)
//!                          ↓
//!                     VerificationReport
//! ```
//!
//! # Failure classes
//!
//! | Class | Surfaced as |
//! |-------|-------------|
//! | Malformed rule declaration | [`VerificationReport::format_errors`] |
//! | Rule violation | [`VerificationReport::failures`] |
//! | Missing segment, bad encoding | [`VerifyError`] (aborts) |

mod error;
mod matcher;
mod report;
mod segment;
mod verify;

pub use error::{VerifyError, VerifyResult};
pub use matcher::{check_count, check_forbidden, match_rule};
pub use report::{FailureKind, MatchFailure, PatternHits, RoutineFailures, VerificationReport};
pub use segment::{CompilationSegment, Segmenter, Segments};
pub use verify::IrVerifier;
