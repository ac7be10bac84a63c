// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Routine, check and driver declarations

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use ir_rules::StructuralRule;

use crate::{
    error::HarnessResult,
    execute::{Phase, RunInfo},
    runtime::RuntimeControl,
    tier::{Tier, TierRequest},
    value::{ArgType, Argument, ArgumentSpec, Value},
};

pub type RoutineBody = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;
pub type CheckBody = Arc<dyn Fn(&CheckInfo<'_>) -> HarnessResult<()> + Send + Sync>;
pub type DriverBody = Arc<dyn Fn(&mut RunInfo<'_>) -> HarnessResult<()> + Send + Sync>;

/// A routine under test
pub struct Routine {
    name: String,
    body: RoutineBody,
    /// `None` uses the configured default
    warmup: Option<u32>,
    tier: TierRequest,
    arguments: Vec<Argument>,
    rules: Vec<StructuralRule>,
    /// Set once when a driver claims the routine
    driver: OnceLock<String>,
}

impl Routine {
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Arc::new(body),
            warmup: None,
            tier: TierRequest::default(),
            arguments: Vec::new(),
            rules: Vec::new(),
            driver: OnceLock::new(),
        }
    }

    pub fn warmup(mut self, iterations: u32) -> Self {
        self.warmup = Some(iterations);
        self
    }

    pub fn tier(mut self, request: TierRequest) -> Self {
        self.tier = request;
        self
    }

    pub fn argument(mut self, ty: ArgType, spec: ArgumentSpec) -> Self {
        self.arguments.push(Argument::new(ty, spec));
        self
    }

    pub fn rule(mut self, rule: StructuralRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn warmup_iterations(&self) -> Option<u32> {
        self.warmup
    }

    pub fn tier_request(&self) -> TierRequest {
        self.tier
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn rules(&self) -> &[StructuralRule] {
        &self.rules
    }

    /// Name of the driver that owns this routine, if any
    pub fn driver(&self) -> Option<&str> {
        self.driver.get().map(String::as_str)
    }

    pub(crate) fn claim(&self, driver: &str) -> Result<(), String> {
        self.driver.set(driver.to_string())
    }

    pub fn invoke(&self, arguments: &[Value]) -> Value {
        (self.body)(arguments)
    }
}

impl fmt::Debug for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routine")
            .field("name", &self.name)
            .field("warmup", &self.warmup)
            .field("tier", &self.tier)
            .field("rules", &self.rules.len())
            .finish_non_exhaustive()
    }
}

/// When a check runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckAt {
    /// After every invocation, warmup included
    EachInvocation,
    /// Once, after the routine was compiled
    Compiled,
}

/// What a check sees of the invocation it follows
pub struct CheckInfo<'a> {
    pub routine: &'a str,
    pub phase: Phase,
    pub invocations: u64,
    pub arguments: &'a [Value],
    pub result: Value,
    pub runtime: &'a dyn RuntimeControl,
}

impl CheckInfo<'_> {
    pub fn is_warmup(&self) -> bool {
        matches!(self.phase, Phase::Warmup(_))
    }

    pub fn compiled_tier(&self) -> Option<Tier> {
        self.runtime.compiled_tier(self.routine)
    }
}

/// Validation routine attached to one routine under test
pub struct Check {
    name: String,
    target: String,
    at: CheckAt,
    body: CheckBody,
}

impl Check {
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        at: CheckAt,
        body: impl Fn(&CheckInfo<'_>) -> HarnessResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            at,
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn at(&self) -> CheckAt {
        self.at
    }

    pub fn run(&self, info: &CheckInfo<'_>) -> HarnessResult<()> {
        (self.body)(info)
    }
}

/// How much of the lifecycle a driver leaves to the harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Warmup, compilation and tier verification of every target
    #[default]
    Normal,
    /// A single invocation; tier mismatches are only logged
    Standalone,
}

/// Routine that takes over invocation of its targets
pub struct Driver {
    name: String,
    targets: Vec<String>,
    mode: RunMode,
    warmup: Option<u32>,
    body: DriverBody,
}

impl Driver {
    pub fn new<I, S>(
        name: impl Into<String>,
        targets: I,
        body: impl Fn(&mut RunInfo<'_>) -> HarnessResult<()> + Send + Sync + 'static,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            targets: targets.into_iter().map(Into::into).collect(),
            mode: RunMode::default(),
            warmup: None,
            body: Arc::new(body),
        }
    }

    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn warmup(mut self, iterations: u32) -> Self {
        self.warmup = Some(iterations);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn run_mode(&self) -> RunMode {
        self.mode
    }

    pub fn warmup_iterations(&self) -> Option<u32> {
        self.warmup
    }

    pub fn run(&self, info: &mut RunInfo<'_>) -> HarnessResult<()> {
        (self.body)(info)
    }
}
