// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Execution state machine
//!
//! Every catalog entry becomes a [`Test`] and runs through the same phases:
//!
//! ```text
//! NotStarted → Warmup(1..=k) → Compiling | WaitingForExternalCompilation → Verified → Done
//! NotStarted → Done                                    (skipped or filtered out)
//! ```
//!
//! | Variant | Invocation | Compiled check |
//! |---------|------------|----------------|
//! | [`PlainTest`] | generated arguments | tier only |
//! | [`CheckedTest`] | generated arguments, check per policy | tier, then the check once |
//! | [`DrivenTest`] | the driver body | tier of every target |

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    io::Write,
    mem,
    sync::Arc,
};

use ir_rules::RuleEncoder;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use tracing::{debug, info, warn};

use crate::{
    catalog::{Catalog, Entry},
    compile::{CompileRequest, compile_all, compile_and_wait, wait_for_compilation},
    config::HarnessConfig,
    error::{HarnessError, HarnessResult},
    routine::{Check, CheckAt, CheckInfo, Driver, RunMode, Routine},
    runtime::RuntimeControl,
    tier::{ResolvedTier, SkipReason, Tier, WaitMode, resolve},
    value::{ArgumentGenerator, Value},
};

/// Lifecycle phase of one routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    NotStarted,
    /// 1-based warmup iteration
    Warmup(u32),
    Compiling,
    WaitingForExternalCompilation,
    /// Compiled; post-compilation invocation and checks
    Verified,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::NotStarted => f.write_str("not started"),
            Phase::Warmup(iteration) => write!(f, "warmup iteration {iteration}"),
            Phase::Compiling => f.write_str("compilation"),
            Phase::WaitingForExternalCompilation => f.write_str("wait for compilation"),
            Phase::Verified => f.write_str("verification"),
            Phase::Done => f.write_str("done"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionRecord {
    pub phase: Phase,
    pub invocations: u64,
}

/// Per-routine records plus the phase of the test being run
#[derive(Default)]
struct Records {
    by_routine: BTreeMap<String, ExecutionRecord>,
    current: Phase,
}

impl Records {
    fn get(&self, routine: &str) -> ExecutionRecord {
        self.by_routine.get(routine).copied().unwrap_or_default()
    }

    fn enter(&mut self, routine: &str, phase: Phase) {
        let record = self.by_routine.entry(routine.to_string()).or_default();
        if mem::discriminant(&record.phase) != mem::discriminant(&phase) {
            debug!(routine, from = %record.phase, to = %phase, "phase transition");
        }
        record.phase = phase;
        self.current = phase;
    }

    fn invoke(
        &mut self,
        runtime: &dyn RuntimeControl,
        routine: &Routine,
        arguments: &[Value],
    ) -> Value {
        let result = routine.invoke(arguments);
        runtime.note_invocation(routine.name());
        self.by_routine
            .entry(routine.name().to_string())
            .or_default()
            .invocations += 1;
        result
    }
}

/// State shared by all tests of one run
pub struct ExecutionContext<'a> {
    runtime: &'a dyn RuntimeControl,
    config: &'a HarnessConfig,
    records: Records,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(runtime: &'a dyn RuntimeControl, config: &'a HarnessConfig) -> Self {
        Self {
            runtime,
            config,
            records: Records::default(),
        }
    }

    pub fn runtime(&self) -> &'a dyn RuntimeControl {
        self.runtime
    }

    pub fn config(&self) -> &'a HarnessConfig {
        self.config
    }

    pub fn record(&self, routine: &str) -> ExecutionRecord {
        self.records.get(routine)
    }

    /// Phase of the test currently running
    pub fn current_phase(&self) -> Phase {
        self.records.current
    }

    fn enter(&mut self, routine: &str, phase: Phase) {
        self.records.enter(routine, phase);
    }

    fn invoke(&mut self, routine: &Routine, arguments: &[Value]) -> Value {
        self.records.invoke(self.runtime, routine, arguments)
    }

    fn into_records(self) -> BTreeMap<String, ExecutionRecord> {
        self.records.by_routine
    }
}

/// Phase transitions shared by every test variant
pub trait TestLifecycle {
    fn name(&self) -> &str;

    /// Routines whose records this test advances
    fn routines(&self) -> Vec<String>;

    /// Skipped tests go straight to [`Phase::Done`] without touching the
    /// runtime.
    fn is_skipped(&self) -> bool;

    fn warmup_iterations(&self) -> u32;

    /// One invocation outside of verification
    fn invoke(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()>;

    /// Get the routines compiled at their resolved tiers.
    fn on_warmup_done(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()>;

    /// Invoke the compiled code and check the outcome.
    fn verify(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()>;

    /// Drive the test through every phase.
    fn run(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()> {
        let routines = self.routines();
        let enter_all = |ctx: &mut ExecutionContext<'_>, phase: Phase| {
            for routine in &routines {
                ctx.enter(routine, phase);
            }
        };

        if self.is_skipped() {
            debug!(test = self.name(), "skipped");
            enter_all(ctx, Phase::Done);
            return Ok(());
        }

        for iteration in 1..=self.warmup_iterations() {
            enter_all(ctx, Phase::Warmup(iteration));
            self.invoke(ctx)?;
        }
        self.on_warmup_done(ctx)?;

        enter_all(ctx, Phase::Verified);
        self.verify(ctx)?;
        enter_all(ctx, Phase::Done);
        Ok(())
    }
}

fn compile_routine(
    ctx: &mut ExecutionContext<'_>,
    routine: &str,
    resolved: ResolvedTier,
    mut invoke: impl FnMut(&mut ExecutionContext<'_>) -> HarnessResult<()>,
) -> HarnessResult<()> {
    let ResolvedTier::Compile { tier, wait } = resolved else {
        return Ok(());
    };
    let runtime = ctx.runtime;
    let config = ctx.config;

    match wait {
        WaitMode::Active => {
            ctx.enter(routine, Phase::Compiling);
            compile_and_wait(
                runtime,
                routine,
                tier,
                config.compilation_timeout,
                config.poll_interval,
            )
        }
        WaitMode::Passive => {
            ctx.enter(routine, Phase::WaitingForExternalCompilation);
            wait_for_compilation(
                runtime,
                routine,
                tier,
                config.wait_for_compilation_timeout,
                || invoke(ctx),
            )
        }
    }
}

fn verify_tier(
    runtime: &dyn RuntimeControl,
    routine: &str,
    resolved: ResolvedTier,
) -> HarnessResult<()> {
    let Some(expected) = resolved.tier() else {
        return Ok(());
    };
    let actual = runtime.compiled_tier(routine);
    if actual != Some(expected) {
        return Err(HarnessError::TierMismatch {
            routine: routine.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Routine without companion
pub struct PlainTest {
    routine: Arc<Routine>,
    resolved: ResolvedTier,
    warmup: u32,
    arguments: ArgumentGenerator,
}

impl PlainTest {
    pub fn new(routine: Arc<Routine>, resolved: ResolvedTier, warmup: u32, seed: u64) -> Self {
        let arguments = ArgumentGenerator::new(routine.arguments(), seed);
        Self {
            routine,
            resolved,
            warmup,
            arguments,
        }
    }
}

impl TestLifecycle for PlainTest {
    fn name(&self) -> &str {
        self.routine.name()
    }

    fn routines(&self) -> Vec<String> {
        vec![self.routine.name().to_string()]
    }

    fn is_skipped(&self) -> bool {
        self.resolved.is_skip()
    }

    fn warmup_iterations(&self) -> u32 {
        self.warmup
    }

    fn invoke(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()> {
        let values = self.arguments.next_values();
        ctx.invoke(&self.routine, &values);
        Ok(())
    }

    fn on_warmup_done(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()> {
        let routine = Arc::clone(&self.routine);
        let arguments = &mut self.arguments;
        compile_routine(ctx, routine.name(), self.resolved, |ctx| {
            let values = arguments.next_values();
            ctx.invoke(&routine, &values);
            Ok(())
        })
    }

    fn verify(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()> {
        self.invoke(ctx)?;
        verify_tier(ctx.runtime, self.routine.name(), self.resolved)
    }
}

/// Routine with a check attached
pub struct CheckedTest {
    routine: Arc<Routine>,
    check: Arc<Check>,
    resolved: ResolvedTier,
    warmup: u32,
    arguments: ArgumentGenerator,
}

impl CheckedTest {
    pub fn new(
        routine: Arc<Routine>,
        check: Arc<Check>,
        resolved: ResolvedTier,
        warmup: u32,
        seed: u64,
    ) -> Self {
        let arguments = ArgumentGenerator::new(routine.arguments(), seed);
        Self {
            routine,
            check,
            resolved,
            warmup,
            arguments,
        }
    }
}

fn run_check(
    ctx: &ExecutionContext<'_>,
    routine: &Routine,
    check: &Check,
    arguments: &[Value],
    result: Value,
) -> HarnessResult<()> {
    let phase = ctx.current_phase();
    let info = CheckInfo {
        routine: routine.name(),
        phase,
        invocations: ctx.record(routine.name()).invocations,
        arguments,
        result,
        runtime: ctx.runtime,
    };
    check
        .run(&info)
        .map_err(|source| HarnessError::CheckFailed {
            check: check.name().to_string(),
            routine: routine.name().to_string(),
            phase,
            source: Box::new(source),
        })
}

/// Invoke once, running the check if it follows every invocation.
fn invoke_checked(
    ctx: &mut ExecutionContext<'_>,
    routine: &Routine,
    check: &Check,
    arguments: &mut ArgumentGenerator,
) -> HarnessResult<()> {
    let values = arguments.next_values();
    let result = ctx.invoke(routine, &values);
    if check.at() == CheckAt::EachInvocation {
        run_check(ctx, routine, check, &values, result)?;
    }
    Ok(())
}

impl TestLifecycle for CheckedTest {
    fn name(&self) -> &str {
        self.routine.name()
    }

    fn routines(&self) -> Vec<String> {
        vec![self.routine.name().to_string()]
    }

    fn is_skipped(&self) -> bool {
        self.resolved.is_skip()
    }

    fn warmup_iterations(&self) -> u32 {
        self.warmup
    }

    fn invoke(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()> {
        invoke_checked(ctx, &self.routine, &self.check, &mut self.arguments)
    }

    fn on_warmup_done(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()> {
        let routine = Arc::clone(&self.routine);
        let check = &self.check;
        let arguments = &mut self.arguments;
        compile_routine(ctx, routine.name(), self.resolved, |ctx| {
            invoke_checked(ctx, &routine, check, arguments)
        })
    }

    fn verify(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()> {
        let values = self.arguments.next_values();
        let result = ctx.invoke(&self.routine, &values);
        verify_tier(ctx.runtime, self.routine.name(), self.resolved)?;
        run_check(ctx, &self.routine, &self.check, &values, result)
    }
}

/// What a driver body sees of the run
pub struct RunInfo<'a> {
    driver: &'a str,
    phase: Phase,
    targets: &'a [(Arc<Routine>, ResolvedTier)],
    runtime: &'a dyn RuntimeControl,
    records: &'a mut Records,
}

impl RunInfo<'_> {
    pub fn driver(&self) -> &str {
        self.driver
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_warmup(&self) -> bool {
        matches!(self.phase, Phase::Warmup(_))
    }

    pub fn runtime(&self) -> &dyn RuntimeControl {
        self.runtime
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|(routine, _)| routine.name())
    }

    /// Invoke one of the driver's targets.
    pub fn invoke(&mut self, target: &str, arguments: &[Value]) -> HarnessResult<Value> {
        let routine = self
            .targets
            .iter()
            .map(|(routine, _)| routine)
            .find(|routine| routine.name() == target)
            .ok_or_else(|| HarnessError::UnknownTarget {
                driver: self.driver.to_string(),
                target: target.to_string(),
            })?;
        Ok(self.records.invoke(self.runtime, routine, arguments))
    }

    pub fn invocations(&self, target: &str) -> u64 {
        self.records.get(target).invocations
    }

    pub fn compiled_tier(&self, target: &str) -> Option<Tier> {
        self.runtime.compiled_tier(target)
    }
}

/// Driver and the routines it invokes
pub struct DrivenTest {
    driver: Arc<Driver>,
    targets: Vec<(Arc<Routine>, ResolvedTier)>,
    warmup: u32,
}

impl DrivenTest {
    pub fn new(
        driver: Arc<Driver>,
        targets: Vec<(Arc<Routine>, ResolvedTier)>,
        default_warmup: u32,
    ) -> Self {
        let warmup = match driver.run_mode() {
            RunMode::Standalone => 0,
            RunMode::Normal => driver.warmup_iterations().unwrap_or(default_warmup),
        };
        Self {
            driver,
            targets,
            warmup,
        }
    }

    fn is_standalone(&self) -> bool {
        self.driver.run_mode() == RunMode::Standalone
    }
}

fn invoke_driver(
    ctx: &mut ExecutionContext<'_>,
    driver: &Driver,
    targets: &[(Arc<Routine>, ResolvedTier)],
) -> HarnessResult<()> {
    let phase = ctx.current_phase();
    let mut info = RunInfo {
        driver: driver.name(),
        phase,
        targets,
        runtime: ctx.runtime,
        records: &mut ctx.records,
    };
    driver
        .run(&mut info)
        .map_err(|source| HarnessError::DriverFailed {
            driver: driver.name().to_string(),
            phase,
            source: Box::new(source),
        })
}

impl TestLifecycle for DrivenTest {
    fn name(&self) -> &str {
        self.driver.name()
    }

    fn routines(&self) -> Vec<String> {
        self.targets
            .iter()
            .map(|(routine, _)| routine.name().to_string())
            .collect()
    }

    /// A driver runs as long as one of its targets is not skipped.
    fn is_skipped(&self) -> bool {
        self.targets.iter().all(|(_, resolved)| resolved.is_skip())
    }

    fn warmup_iterations(&self) -> u32 {
        self.warmup
    }

    fn invoke(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()> {
        invoke_driver(ctx, &self.driver, &self.targets)
    }

    fn on_warmup_done(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()> {
        if self.is_standalone() {
            return Ok(());
        }

        let requests: Vec<CompileRequest<'_>> = self
            .targets
            .iter()
            .filter_map(|(routine, resolved)| match resolved {
                ResolvedTier::Compile {
                    tier,
                    wait: WaitMode::Active,
                } => Some(CompileRequest {
                    routine: routine.name(),
                    tier: *tier,
                }),
                _ => None,
            })
            .collect();
        for request in &requests {
            ctx.enter(request.routine, Phase::Compiling);
        }
        compile_all(self.driver.name(), ctx.runtime, &requests, ctx.config)?;

        for (routine, resolved) in &self.targets {
            if let ResolvedTier::Compile {
                tier,
                wait: WaitMode::Passive,
            } = *resolved
            {
                ctx.enter(routine.name(), Phase::WaitingForExternalCompilation);
                let runtime = ctx.runtime;
                let timeout = ctx.config.wait_for_compilation_timeout;
                wait_for_compilation(runtime, routine.name(), tier, timeout, || {
                    invoke_driver(ctx, &self.driver, &self.targets)
                })?;
            }
        }
        Ok(())
    }

    fn verify(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()> {
        invoke_driver(ctx, &self.driver, &self.targets)?;

        for (routine, resolved) in &self.targets {
            match verify_tier(ctx.runtime, routine.name(), *resolved) {
                Err(error) if self.is_standalone() => {
                    warn!(driver = self.driver.name(), %error, "tier mismatch in standalone driver");
                }
                result => result?,
            }
        }
        Ok(())
    }
}

/// The three execution variants
pub enum Test {
    Plain(PlainTest),
    Checked(CheckedTest),
    Driven(DrivenTest),
}

impl Test {
    /// Build the test of one catalog entry. Routines missing from `resolved`
    /// count as filtered out.
    pub fn new(
        entry: &Entry,
        resolved: &HashMap<String, ResolvedTier>,
        config: &HarnessConfig,
        seed: u64,
    ) -> Self {
        let tier_of = |routine: &Routine| {
            resolved
                .get(routine.name())
                .copied()
                .unwrap_or(ResolvedTier::Skip(SkipReason::Filtered))
        };
        let warmup_of = |routine: &Routine| routine.warmup_iterations().unwrap_or(config.warmup);

        match entry {
            Entry::Plain(routine) => Test::Plain(PlainTest::new(
                Arc::clone(routine),
                tier_of(routine),
                warmup_of(routine),
                seed,
            )),
            Entry::Checked { routine, check } => Test::Checked(CheckedTest::new(
                Arc::clone(routine),
                Arc::clone(check),
                tier_of(routine),
                warmup_of(routine),
                seed,
            )),
            Entry::Driven { driver, targets } => Test::Driven(DrivenTest::new(
                Arc::clone(driver),
                targets
                    .iter()
                    .map(|routine| (Arc::clone(routine), tier_of(routine)))
                    .collect(),
                config.warmup,
            )),
        }
    }

    fn lifecycle(&self) -> &dyn TestLifecycle {
        match self {
            Test::Plain(test) => test,
            Test::Checked(test) => test,
            Test::Driven(test) => test,
        }
    }

    fn lifecycle_mut(&mut self) -> &mut dyn TestLifecycle {
        match self {
            Test::Plain(test) => test,
            Test::Checked(test) => test,
            Test::Driven(test) => test,
        }
    }
}

impl TestLifecycle for Test {
    fn name(&self) -> &str {
        self.lifecycle().name()
    }

    fn routines(&self) -> Vec<String> {
        self.lifecycle().routines()
    }

    fn is_skipped(&self) -> bool {
        self.lifecycle().is_skipped()
    }

    fn warmup_iterations(&self) -> u32 {
        self.lifecycle().warmup_iterations()
    }

    fn invoke(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()> {
        self.lifecycle_mut().invoke(ctx)
    }

    fn on_warmup_done(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()> {
        self.lifecycle_mut().on_warmup_done(ctx)
    }

    fn verify(&mut self, ctx: &mut ExecutionContext<'_>) -> HarnessResult<()> {
        self.lifecycle_mut().verify(ctx)
    }
}

/// Outcome of one instrumented run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Shuffle and argument seed, logged for reproduction
    pub seed: u64,
    /// Tests that were not skipped, in execution order
    pub order: Vec<String>,
    pub records: BTreeMap<String, ExecutionRecord>,
}

impl RunSummary {
    pub fn record(&self, routine: &str) -> Option<&ExecutionRecord> {
        self.records.get(routine)
    }
}

/// In-process instrumented run of one catalog
pub struct TestVm<'a> {
    catalog: &'a Catalog,
    runtime: &'a dyn RuntimeControl,
    config: &'a HarnessConfig,
}

impl<'a> TestVm<'a> {
    pub fn new(
        catalog: &'a Catalog,
        runtime: &'a dyn RuntimeControl,
        config: &'a HarnessConfig,
    ) -> Self {
        Self {
            catalog,
            runtime,
            config,
        }
    }

    /// Resolve the tier of every routine; filtered entries are skipped.
    pub fn resolve_tiers(&self) -> HashMap<String, ResolvedTier> {
        let mut resolved = HashMap::new();
        for entry in self.catalog.entries() {
            let selected = self.config.selects(entry.name());
            for routine in entry.routines() {
                let tier = if selected {
                    resolve(routine.tier_request(), self.runtime, routine.name())
                } else {
                    ResolvedTier::Skip(SkipReason::Filtered)
                };
                if let ResolvedTier::Skip(reason) = tier {
                    debug!(routine = routine.name(), %reason, "routine skipped");
                }
                resolved.insert(routine.name().to_string(), tier);
            }
        }
        resolved
    }

    /// Run every entry. With IR verification enabled the rule encoding is
    /// written to `out` first.
    pub fn run<W: Write>(&self, out: &mut W) -> HarnessResult<RunSummary> {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        info!(class = self.catalog.class_name(), seed, "starting run");

        let resolved = self.resolve_tiers();
        if self.config.verify_ir {
            let encoding = RuleEncoder::new(self.runtime)
                .encode(&self.catalog.rule_table(), |routine| {
                    resolved.get(routine).and_then(ResolvedTier::tier) == Some(Tier::Optimized)
                })?;
            encoding.write_to(out)?;
            out.flush()?;
        }

        let mut entries: Vec<&Entry> = self.catalog.entries().iter().collect();
        if self.config.shuffle {
            entries.shuffle(&mut StdRng::seed_from_u64(seed));
        }

        let mut ctx = ExecutionContext::new(self.runtime, self.config);
        let mut order = Vec::new();
        for (index, entry) in entries.into_iter().enumerate() {
            let mut test = Test::new(entry, &resolved, self.config, seed.wrapping_add(index as u64));
            if !test.is_skipped() {
                order.push(test.name().to_string());
            }
            test.run(&mut ctx)?;
        }

        info!(tests = order.len(), "run finished");
        Ok(RunSummary {
            seed,
            order,
            records: ctx.into_records(),
        })
    }
}
