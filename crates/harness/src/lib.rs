// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Compiler test harness
//!
//! Drives the routines of a class under test through warmup, forced
//! compilation and verification inside an instrumented run, then checks the
//! optimized IR of each routine against its structural rules.
//!
//! # Overview
//!
//! ```text
//! CatalogBuilder ─→ Catalog
//!                      │
//!   instrumented run:  ├─→ RuleEncoder ─→ encoding block (stdout)
//!                      └─→ TestVm: Plain | Checked | Driven
//!                              NotStarted → Warmup → Compiling → Verified → Done
//!                      │
//!   afterwards:        └─→ TestFramework ─→ IrVerifier ─→ VerificationReport
//! ```
//!
//! The runtime is reached only through [`RuntimeControl`];
//! [`SimulatedRuntime`] implements it in-process.
//!
//! # Failure classes
//!
//! | Class | Handling |
//! |-------|----------|
//! | Malformed declarations | collected by [`CatalogBuilder::build`] |
//! | Timeouts, tier mismatches, check failures | fatal [`HarnessError`] |
//! | Rule violations | aggregated [`ir_verifier::VerificationReport`] |

pub mod asserts;
mod catalog;
mod compile;
mod config;
mod error;
mod execute;
mod framework;
pub mod logging;
mod routine;
mod runtime;
mod scenario;
mod simulated;
mod tier;
mod value;

pub use catalog::{Catalog, CatalogBuilder, Entry};
pub use compile::{CompileRequest, compile_all, compile_and_wait, wait_for_compilation};
pub use config::{
    ConfigError, DEFAULT_COMPILATION_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT,
    DEFAULT_WARMUP, HarnessConfig,
};
pub use error::{CatalogError, CatalogErrors, HarnessError, HarnessResult, ScenarioFailure};
pub use execute::{
    CheckedTest, DrivenTest, ExecutionContext, ExecutionRecord, Phase, PlainTest, RunInfo,
    RunSummary, Test, TestLifecycle, TestVm,
};
pub use framework::{TestFramework, VmLauncher, VmOutput};
pub use routine::{Check, CheckAt, CheckInfo, Driver, Routine, RunMode};
pub use runtime::RuntimeControl;
pub use scenario::{Scenario, check_unique};
pub use simulated::{CompileBehavior, SimulatedRuntime};
pub use tier::{
    ResolvedTier, SkipReason, Tier, TierRequest, WaitMode, highest_reachable, is_reachable,
    resolve,
};
pub use value::{ArgType, Argument, ArgumentGenerator, ArgumentSpec, Value};
