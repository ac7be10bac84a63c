// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Compilation tiers and tier resolution
//!
//! A routine requests a tier; before warmup the request is resolved against
//! the runtime's flags into either a concrete tier to compile at or a skip:
//!
//! | Condition | Result |
//! |-----------|--------|
//! | `UseCompiler=false` | skip |
//! | `Any` / `WaitForCompilation` | highest reachable tier |
//! | `TieredCompilation=false` | only the top tier is reachable |
//! | `TieredStopAtLevel=N` | tiers above N are unreachable |
//! | tier not compilable for the routine | skip |

use std::fmt;

use ir_rules::FlagSource;

use crate::runtime::RuntimeControl;

/// Optimization level, 0 (interpreted) to 4 (fully optimized)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Interpreted = 0,
    Simple = 1,
    LimitedProfile = 2,
    FullProfile = 3,
    Optimized = 4,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Interpreted,
        Tier::Simple,
        Tier::LimitedProfile,
        Tier::FullProfile,
        Tier::Optimized,
    ];

    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn from_level(level: i64) -> Option<Tier> {
        usize::try_from(level)
            .ok()
            .and_then(|level| Tier::ALL.get(level).copied())
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier {}", self.level())
    }
}

/// Tier requested by a routine declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TierRequest {
    /// Never compile
    Skip,
    /// Highest reachable tier, compiled on request
    #[default]
    Any,
    /// Highest reachable tier, reached by invoking until the runtime compiles
    /// on its own
    WaitForCompilation,
    At(Tier),
}

/// How a resolved compilation is awaited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Enqueue and poll
    Active,
    /// Invoke until compiled
    Passive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Requested,
    CompilerDisabled,
    Unreachable { tier: Tier, highest: Option<Tier> },
    NotCompilable(Tier),
    Filtered,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Requested => f.write_str("skip requested"),
            SkipReason::CompilerDisabled => f.write_str("compiler disabled"),
            SkipReason::Unreachable { tier, highest: Some(highest) } => {
                write!(f, "{tier} unreachable, highest reachable is {highest}")
            }
            SkipReason::Unreachable { tier, highest: None } => {
                write!(f, "{tier} unreachable, no compiled tier available")
            }
            SkipReason::NotCompilable(tier) => write!(f, "not compilable at {tier}"),
            SkipReason::Filtered => f.write_str("excluded by filter"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedTier {
    Skip(SkipReason),
    Compile { tier: Tier, wait: WaitMode },
}

impl ResolvedTier {
    pub fn tier(&self) -> Option<Tier> {
        match self {
            ResolvedTier::Compile { tier, .. } => Some(*tier),
            ResolvedTier::Skip(_) => None,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, ResolvedTier::Skip(_))
    }
}

/// Whether `tier` can be reached under the tiering flags.
pub fn is_reachable(flags: &(impl FlagSource + ?Sized), tier: Tier, highest: Tier) -> bool {
    if tier == Tier::Interpreted || tier > highest {
        return false;
    }
    if flags.bool_flag("TieredCompilation") == Some(false) {
        return tier == highest;
    }
    let stop_at = flags
        .int_flag("TieredStopAtLevel")
        .and_then(Tier::from_level)
        .unwrap_or(Tier::Optimized);
    tier <= stop_at
}

/// Highest compiled tier reachable under the tiering flags.
pub fn highest_reachable(flags: &(impl FlagSource + ?Sized), highest: Tier) -> Option<Tier> {
    Tier::ALL
        .into_iter()
        .rev()
        .find(|tier| is_reachable(flags, *tier, highest))
}

/// Resolve a request for `routine` against the runtime.
pub fn resolve(request: TierRequest, runtime: &dyn RuntimeControl, routine: &str) -> ResolvedTier {
    if request == TierRequest::Skip {
        return ResolvedTier::Skip(SkipReason::Requested);
    }
    if runtime.bool_flag("UseCompiler") == Some(false) {
        return ResolvedTier::Skip(SkipReason::CompilerDisabled);
    }

    let highest = runtime.highest_available_tier();
    let reachable = highest_reachable(runtime, highest);
    let (tier, wait) = match request {
        TierRequest::At(tier) if is_reachable(runtime, tier, highest) => (tier, WaitMode::Active),
        TierRequest::At(tier) => {
            return ResolvedTier::Skip(SkipReason::Unreachable {
                tier,
                highest: reachable,
            });
        }
        TierRequest::Any | TierRequest::WaitForCompilation => {
            let Some(tier) = reachable else {
                return ResolvedTier::Skip(SkipReason::Unreachable {
                    tier: highest,
                    highest: None,
                });
            };
            let wait = if request == TierRequest::WaitForCompilation {
                WaitMode::Passive
            } else {
                WaitMode::Active
            };
            (tier, wait)
        }
        TierRequest::Skip => return ResolvedTier::Skip(SkipReason::Requested),
    };

    if !runtime.is_compilable(routine, tier) {
        return ResolvedTier::Skip(SkipReason::NotCompilable(tier));
    }
    ResolvedTier::Compile { tier, wait }
}

#[cfg(test)]
mod tests {
    use ir_rules::FlagSnapshot;

    use super::*;
    use crate::SimulatedRuntime;

    fn runtime(options: &[&str]) -> SimulatedRuntime {
        SimulatedRuntime::from_options("Sum", options.iter().copied())
    }

    #[test]
    fn test_tiered_reachability() {
        let flags = FlagSnapshot::new();
        assert!(is_reachable(&flags, Tier::Simple, Tier::Optimized));
        assert!(!is_reachable(&flags, Tier::Interpreted, Tier::Optimized));
        assert!(!is_reachable(&flags, Tier::Optimized, Tier::FullProfile));
        assert_eq!(highest_reachable(&flags, Tier::Optimized), Some(Tier::Optimized));

        let capped = FlagSnapshot::new().with("TieredStopAtLevel", 1);
        assert_eq!(highest_reachable(&capped, Tier::Optimized), Some(Tier::Simple));
        assert!(!is_reachable(&capped, Tier::FullProfile, Tier::Optimized));
    }

    #[test]
    fn test_non_tiered_only_reaches_top_tier() {
        let flags = FlagSnapshot::new().with("TieredCompilation", false);
        assert!(is_reachable(&flags, Tier::Optimized, Tier::Optimized));
        for tier in [Tier::Simple, Tier::LimitedProfile, Tier::FullProfile] {
            assert!(!is_reachable(&flags, tier, Tier::Optimized), "{tier}");
        }
    }

    #[test]
    fn test_skip_request() {
        let runtime = runtime(&[]);
        assert_eq!(
            resolve(TierRequest::Skip, &runtime, "add"),
            ResolvedTier::Skip(SkipReason::Requested)
        );
    }

    #[test]
    fn test_compiler_disabled_skips_everything() {
        let runtime = runtime(&["-XX:-UseCompiler"]);
        assert_eq!(
            resolve(TierRequest::Any, &runtime, "add"),
            ResolvedTier::Skip(SkipReason::CompilerDisabled)
        );
    }

    #[test]
    fn test_any_resolves_to_highest_reachable() {
        let runtime = runtime(&["-XX:TieredStopAtLevel=3"]);
        assert_eq!(
            resolve(TierRequest::Any, &runtime, "add"),
            ResolvedTier::Compile {
                tier: Tier::FullProfile,
                wait: WaitMode::Active
            }
        );
        assert_eq!(
            resolve(TierRequest::WaitForCompilation, &runtime, "add"),
            ResolvedTier::Compile {
                tier: Tier::FullProfile,
                wait: WaitMode::Passive
            }
        );
    }

    #[test]
    fn test_unreachable_under_non_tiered_config() {
        let runtime = runtime(&["-XX:-TieredCompilation"]);
        assert_eq!(
            resolve(TierRequest::At(Tier::Simple), &runtime, "add"),
            ResolvedTier::Skip(SkipReason::Unreachable {
                tier: Tier::Simple,
                highest: Some(Tier::Optimized)
            })
        );
    }

    #[test]
    fn test_not_compilable() {
        let runtime = runtime(&[]);
        runtime.set_not_compilable("add", Some(Tier::Optimized));
        assert_eq!(
            resolve(TierRequest::At(Tier::Optimized), &runtime, "add"),
            ResolvedTier::Skip(SkipReason::NotCompilable(Tier::Optimized))
        );
        assert!(!resolve(TierRequest::At(Tier::Simple), &runtime, "add").is_skip());
    }
}
