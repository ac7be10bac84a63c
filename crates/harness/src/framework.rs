// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Test author entry points
//!
//! [`TestFramework`] launches the instrumented run through a [`VmLauncher`],
//! then verifies the IR rules of the catalog against the captured output:
//!
//! ```text
//! flags ─→ VmLauncher ─→ VmOutput { stdout, trace }
//!                            ↓
//!                       IrVerifier ─→ VerificationReport
//! ```

use std::{fs, path::Path};

use ir_verifier::IrVerifier;
use tracing::{debug, info};

use crate::{
    catalog::Catalog,
    error::{HarnessError, HarnessResult, ScenarioFailure},
    scenario::{Scenario, check_unique},
};

/// Captured output of one instrumented run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VmOutput {
    /// Carries the rule encoding block
    pub stdout: String,
    /// Compilation trace with IR dumps
    pub trace: String,
    pub success: bool,
    pub status: String,
    pub stderr: String,
}

impl VmOutput {
    /// Output of a successful run
    pub fn new(stdout: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            trace: trace.into(),
            success: true,
            status: "exit status: 0".to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(status: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            status: status.into(),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// Load a successful run's output from files.
    pub fn from_files(stdout: impl AsRef<Path>, trace: impl AsRef<Path>) -> HarnessResult<Self> {
        Ok(Self::new(
            fs::read_to_string(stdout)?,
            fs::read_to_string(trace)?,
        ))
    }
}

/// Spawns the instrumented run with a flag list
pub trait VmLauncher {
    fn launch(&self, flags: &[String]) -> HarnessResult<VmOutput>;
}

impl<F> VmLauncher for F
where
    F: Fn(&[String]) -> HarnessResult<VmOutput>,
{
    fn launch(&self, flags: &[String]) -> HarnessResult<VmOutput> {
        self(flags)
    }
}

pub struct TestFramework<'a, L> {
    catalog: &'a Catalog,
    launcher: L,
    flags: Vec<String>,
    verify_ir: bool,
}

impl<'a, L: VmLauncher> TestFramework<'a, L> {
    pub fn new(catalog: &'a Catalog, launcher: L) -> Self {
        Self {
            catalog,
            launcher,
            flags: Vec::new(),
            verify_ir: true,
        }
    }

    /// Flags passed to every run, before scenario flags
    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_verify_ir(mut self, verify_ir: bool) -> Self {
        self.verify_ir = verify_ir;
        self
    }

    /// Run the catalog once with the base flags.
    pub fn run(&self) -> HarnessResult<()> {
        self.run_with_flags(&self.flags)
    }

    /// Run the catalog once per scenario. Every scenario runs; failures are
    /// reported together.
    pub fn run_with_scenarios(&self, scenarios: &[Scenario]) -> HarnessResult<()> {
        check_unique(scenarios)?;

        let mut failures = Vec::new();
        for scenario in scenarios {
            info!(scenario = scenario.index(), flags = ?scenario.flags(), "running scenario");
            let flags: Vec<String> = self
                .flags
                .iter()
                .chain(scenario.flags())
                .cloned()
                .collect();
            if let Err(error) = self.run_with_flags(&flags) {
                failures.push(ScenarioFailure {
                    index: scenario.index(),
                    flags: scenario.flags().to_vec(),
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::ScenariosFailed(failures))
        }
    }

    fn run_with_flags(&self, flags: &[String]) -> HarnessResult<()> {
        let output = self.launcher.launch(flags)?;
        if !output.success {
            return Err(HarnessError::VmFailed {
                status: output.status,
                stderr: output.stderr,
            });
        }

        let rules = self.catalog.rule_table();
        if !self.verify_ir || rules.is_empty() {
            debug!("IR verification skipped");
            return Ok(());
        }

        let verifier = IrVerifier::new(self.catalog.class_name(), &rules);
        let report = verifier.verify_output(&output.stdout, &output.trace)?;
        if !report.is_ok() {
            return Err(HarnessError::Verification(Box::new(report)));
        }
        debug!("IR verification passed");
        Ok(())
    }
}
