// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Control interface of the runtime under test

use ir_rules::FlagSource;

use crate::tier::Tier;

/// Flag reads and compilation control of the runtime under test
///
/// Passed explicitly to every component that needs it. Implementations must
/// be shareable with the compile workers of multi-target drivers.
pub trait RuntimeControl: FlagSource + Send + Sync {
    /// Ask the compiler to compile `routine` at `tier`. The request may be
    /// dropped silently; callers detect this through [`Self::is_queued`].
    fn enqueue_compilation(&self, routine: &str, tier: Tier);

    /// Tier of the currently installed compiled code, if any
    fn compiled_tier(&self, routine: &str) -> Option<Tier>;

    fn is_compilable(&self, routine: &str, tier: Tier) -> bool;

    /// Whether a compilation of `routine` is pending
    fn is_queued(&self, routine: &str) -> bool;

    /// Discard compiled code of `routine`
    fn deoptimize(&self, routine: &str);

    /// Highest tier this runtime build has a compiler for
    fn highest_available_tier(&self) -> Tier;

    /// Called after every invocation of a routine body
    fn note_invocation(&self, routine: &str);
}
