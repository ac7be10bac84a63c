// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-process stand-in for a runtime under test
//!
//! Provides:
//! - Flags from a [`FlagSnapshot`] (or parsed from runtime options)
//! - Scripted compilation behavior per routine
//! - Counters for enqueues, invocations and deoptimizations
//! - A compilation trace in the format the segmenter reads, with IR dumps
//!   registered per routine appended to optimized compilations
//!
//! SimulatedRuntime is cheaply cloneable - clones share state.

use std::{
    collections::{HashMap, HashSet},
    fmt::Write as _,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU8, AtomicU64, Ordering},
    },
};

use ir_rules::{FlagSnapshot, FlagSource};
use tracing::debug;

use crate::{
    runtime::RuntimeControl,
    tier::{Tier, highest_reachable},
};

/// What the simulated compiler does with a compilation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileBehavior {
    /// Compile synchronously when enqueued
    #[default]
    Immediate,
    /// Silently drop the first N requests, then compile
    DropFirst(u32),
    /// Compile once the routine was invoked N times, at the requested tier
    /// or the highest reachable one
    AfterInvocations(u64),
    /// Keep the request queued forever
    Never,
    /// Compile at this tier whatever was requested
    WrongTier(Tier),
    /// The first request loses to a concurrent compile at this tier and is
    /// dropped; later requests compile normally
    CompetingTier(Tier),
}

#[derive(Default)]
struct RoutineState {
    compiled: Option<Tier>,
    queued: Option<Tier>,
    invocations: u64,
    enqueues: u32,
    dropped: u32,
    deoptimizations: u32,
}

struct Inner {
    owner: String,
    flags: FlagSnapshot,
    highest: AtomicU8,
    behaviors: Mutex<HashMap<String, CompileBehavior>>,
    not_compilable: Mutex<HashSet<(String, Option<Tier>)>>,
    routines: Mutex<HashMap<String, RoutineState>>,
    dumps: Mutex<HashMap<String, String>>,
    trace: Mutex<String>,
    compile_ids: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated runtime control
#[derive(Clone)]
pub struct SimulatedRuntime {
    inner: Arc<Inner>,
}

impl SimulatedRuntime {
    /// `owner` is the class the simulated routines belong to in the trace.
    pub fn new(owner: impl Into<String>, flags: FlagSnapshot) -> Self {
        Self {
            inner: Arc::new(Inner {
                owner: owner.into(),
                flags,
                highest: AtomicU8::new(Tier::Optimized.level()),
                behaviors: Mutex::new(HashMap::new()),
                not_compilable: Mutex::new(HashSet::new()),
                routines: Mutex::new(HashMap::new()),
                dumps: Mutex::new(HashMap::new()),
                trace: Mutex::new(String::new()),
                compile_ids: AtomicU64::new(1),
            }),
        }
    }

    /// Build the flag state from runtime options such as `-XX:+UseCompiler`.
    /// Options that are not flag settings are ignored.
    pub fn from_options<I, S>(owner: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut flags = FlagSnapshot::new();
        for option in options {
            flags.apply_option(option.as_ref());
        }
        Self::new(owner, flags)
    }

    pub fn set_highest_tier(&self, tier: Tier) {
        self.inner.highest.store(tier.level(), Ordering::SeqCst);
    }

    pub fn set_behavior(&self, routine: &str, behavior: CompileBehavior) {
        lock(&self.inner.behaviors).insert(routine.to_string(), behavior);
    }

    /// `None` makes the routine not compilable at any tier
    pub fn set_not_compilable(&self, routine: &str, tier: Option<Tier>) {
        lock(&self.inner.not_compilable).insert((routine.to_string(), tier));
    }

    /// IR dump printed after every optimized compilation of `routine`
    pub fn set_ir_dump(&self, routine: &str, dump: impl Into<String>) {
        lock(&self.inner.dumps).insert(routine.to_string(), dump.into());
    }

    pub fn enqueue_count(&self, routine: &str) -> u32 {
        self.with_state(routine, |state| state.enqueues)
    }

    pub fn invocation_count(&self, routine: &str) -> u64 {
        self.with_state(routine, |state| state.invocations)
    }

    pub fn deoptimization_count(&self, routine: &str) -> u32 {
        self.with_state(routine, |state| state.deoptimizations)
    }

    /// Compilation trace so far
    pub fn trace(&self) -> String {
        lock(&self.inner.trace).clone()
    }

    fn with_state<T>(&self, routine: &str, f: impl FnOnce(&RoutineState) -> T) -> T {
        let routines = lock(&self.inner.routines);
        match routines.get(routine) {
            Some(state) => f(state),
            None => f(&RoutineState::default()),
        }
    }

    fn behavior(&self, routine: &str) -> CompileBehavior {
        lock(&self.inner.behaviors)
            .get(routine)
            .copied()
            .unwrap_or_default()
    }

    fn highest(&self) -> Tier {
        Tier::from_level(self.inner.highest.load(Ordering::SeqCst).into())
            .unwrap_or(Tier::Optimized)
    }

    /// Install compiled code and print the compile task (and IR dump).
    fn install(&self, routine: &str, state: &mut RoutineState, tier: Tier) {
        state.compiled = Some(tier);
        state.queued = None;

        let id = self.inner.compile_ids.fetch_add(1, Ordering::SeqCst);
        let mut trace = lock(&self.inner.trace);
        let _ = writeln!(
            trace,
            "{:>8} {:>4}       {}       {}::{} (16 bytes)",
            id * 10,
            id,
            tier.level(),
            self.inner.owner,
            routine
        );
        if tier == Tier::Optimized {
            if let Some(dump) = lock(&self.inner.dumps).get(routine) {
                trace.push_str(dump);
                if !dump.ends_with('\n') {
                    trace.push('\n');
                }
            }
        }
        debug!(routine, %tier, "simulated compilation installed");
    }
}

impl FlagSource for SimulatedRuntime {
    fn int_flag(&self, name: &str) -> Option<i64> {
        self.inner.flags.int_flag(name)
    }

    fn bool_flag(&self, name: &str) -> Option<bool> {
        self.inner.flags.bool_flag(name)
    }

    fn float_flag(&self, name: &str) -> Option<f64> {
        self.inner.flags.float_flag(name)
    }

    fn string_flag(&self, name: &str) -> Option<String> {
        self.inner.flags.string_flag(name)
    }
}

impl RuntimeControl for SimulatedRuntime {
    fn enqueue_compilation(&self, routine: &str, tier: Tier) {
        let behavior = self.behavior(routine);
        let mut routines = lock(&self.inner.routines);
        let state = routines.entry(routine.to_string()).or_default();
        state.enqueues += 1;

        if !self.is_compilable(routine, tier) {
            return;
        }
        match behavior {
            CompileBehavior::Immediate => self.install(routine, state, tier),
            CompileBehavior::DropFirst(n) if state.dropped < n => state.dropped += 1,
            CompileBehavior::DropFirst(_) => self.install(routine, state, tier),
            CompileBehavior::AfterInvocations(_) | CompileBehavior::Never => {
                state.queued = Some(tier)
            }
            CompileBehavior::WrongTier(actual) => self.install(routine, state, actual),
            CompileBehavior::CompetingTier(competing) if state.dropped == 0 => {
                state.dropped += 1;
                self.install(routine, state, competing);
            }
            CompileBehavior::CompetingTier(_) => self.install(routine, state, tier),
        }
    }

    fn compiled_tier(&self, routine: &str) -> Option<Tier> {
        self.with_state(routine, |state| state.compiled)
    }

    fn is_compilable(&self, routine: &str, tier: Tier) -> bool {
        let not_compilable = lock(&self.inner.not_compilable);
        !not_compilable.contains(&(routine.to_string(), Some(tier)))
            && !not_compilable.contains(&(routine.to_string(), None))
    }

    fn is_queued(&self, routine: &str) -> bool {
        self.with_state(routine, |state| state.queued.is_some())
    }

    fn deoptimize(&self, routine: &str) {
        let mut routines = lock(&self.inner.routines);
        let state = routines.entry(routine.to_string()).or_default();
        if let Some(tier) = state.compiled.take() {
            state.deoptimizations += 1;
            let id = self.inner.compile_ids.load(Ordering::SeqCst);
            let _ = writeln!(
                lock(&self.inner.trace),
                "{:>8} {:>4}       {}       {}::{} (16 bytes)   made not entrant",
                id * 10,
                id,
                tier.level(),
                self.inner.owner,
                routine
            );
        }
    }

    fn highest_available_tier(&self) -> Tier {
        self.highest()
    }

    fn note_invocation(&self, routine: &str) {
        let behavior = self.behavior(routine);
        let mut routines = lock(&self.inner.routines);
        let state = routines.entry(routine.to_string()).or_default();
        state.invocations += 1;

        if let CompileBehavior::AfterInvocations(threshold) = behavior {
            if state.compiled.is_none() && state.invocations >= threshold {
                let tier = state
                    .queued
                    .or_else(|| highest_reachable(self, self.highest()));
                if let Some(tier) = tier.filter(|tier| self.is_compilable(routine, *tier)) {
                    self.install(routine, state, tier);
                }
            }
        }
    }
}
