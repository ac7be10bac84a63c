// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for the harness crate

use std::{fmt, io, time::Duration};

use ir_rules::{EncodingError, FormatError};
use ir_verifier::{VerificationReport, VerifyError};
use thiserror::Error;

use crate::{config::ConfigError, execute::Phase, tier::Tier, value::ArgType};

/// Result type alias for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Fatal run failures. Any of these aborts the run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Catalog(#[from] CatalogErrors),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("rule encoding: {0}")]
    Encoding(#[from] EncodingError),

    #[error(
        "routine '{routine}' not compiled at {tier} after {elapsed:?} ({attempts} enqueue attempt(s))"
    )]
    CompilationTimeout {
        routine: String,
        tier: Tier,
        elapsed: Duration,
        attempts: u32,
    },

    #[error(
        "routine '{routine}' not compiled at {tier} after {elapsed:?} and {invocations} invocation(s)"
    )]
    WaitTimeout {
        routine: String,
        tier: Tier,
        elapsed: Duration,
        invocations: u64,
    },

    #[error("routine '{routine}' expected at {expected}, found {}", display_tier(.actual))]
    TierMismatch {
        routine: String,
        expected: Tier,
        actual: Option<Tier>,
    },

    #[error("driver '{driver}' timed out after {elapsed:?} waiting for {pending:?}")]
    DriverJoinTimeout {
        driver: String,
        pending: Vec<String>,
        elapsed: Duration,
    },

    #[error("driver '{driver}' lost compile workers for {pending:?}")]
    WorkerFailed { driver: String, pending: Vec<String> },

    #[error("failed to spawn compile worker for '{routine}': {reason}")]
    WorkerSpawn { routine: String, reason: String },

    #[error("check '{check}' failed for routine '{routine}' during {phase}: {source}")]
    CheckFailed {
        check: String,
        routine: String,
        phase: Phase,
        source: Box<HarnessError>,
    },

    #[error("driver '{driver}' failed during {phase}: {source}")]
    DriverFailed {
        driver: String,
        phase: Phase,
        source: Box<HarnessError>,
    },

    #[error("driver '{driver}' does not drive routine '{target}'")]
    UnknownTarget { driver: String, target: String },

    #[error("{0}")]
    Failed(String),

    #[error("routine '{routine}': expected {expected}, found {}", display_tier(.actual))]
    CompilationAssertion {
        routine: String,
        expected: String,
        actual: Option<Tier>,
    },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("instrumented run failed ({status}): {stderr}")]
    VmFailed { status: String, stderr: String },

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error("{0}")]
    Verification(Box<VerificationReport>),

    #[error("scenario index {0} is used more than once")]
    DuplicateScenario(u32),

    #[error("{} scenario(s) failed:{}", .0.len(), display_scenarios(.0))]
    ScenariosFailed(Vec<ScenarioFailure>),
}

impl HarnessError {
    /// A failure raised by a check or driver body
    pub fn failed(message: impl Into<String>) -> Self {
        HarnessError::Failed(message.into())
    }
}

fn display_tier(tier: &Option<Tier>) -> String {
    match tier {
        Some(tier) => tier.to_string(),
        None => "not compiled".to_string(),
    }
}

fn display_scenarios(failures: &[ScenarioFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("\n  - {failure}"))
        .collect()
}

/// Outcome of one failed scenario
#[derive(Debug)]
pub struct ScenarioFailure {
    pub index: u32,
    pub flags: Vec<String>,
    pub error: HarnessError,
}

impl fmt::Display for ScenarioFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scenario {} [{}]: {}",
            self.index,
            self.flags.join(" "),
            self.error
        )
    }
}

/// Self-inconsistent catalog declarations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("'{0}' is declared more than once")]
    DuplicateName(String),

    #[error("a {0} has an empty name")]
    EmptyName(&'static str),

    #[error(transparent)]
    Rule(#[from] FormatError),

    #[error("routine '{0}' declares IR rules but requests a tier below the optimizing tier")]
    RulesRequireOptimizedTier(String),

    #[error("routine '{routine}' argument {index}: {spec} is not valid for {ty}")]
    InvalidArgument {
        routine: String,
        index: usize,
        ty: ArgType,
        spec: String,
    },

    #[error("check '{check}' targets unknown routine '{target}'")]
    UnknownCheckTarget { check: String, target: String },

    #[error("routine '{0}' has more than one check")]
    DuplicateCheck(String),

    #[error("routine '{0}' is both checked and driven")]
    CheckedAndDriven(String),

    #[error("driver '{driver}' targets unknown routine '{target}'")]
    UnknownDriverTarget { driver: String, target: String },

    #[error("driver '{0}' has no targets")]
    DriverWithoutTargets(String),

    #[error("routine '{routine}' is already driven by '{driver}'")]
    AlreadyDriven { routine: String, driver: String },

    #[error("standalone driver '{0}' cannot declare a warmup")]
    StandaloneWarmup(String),

    #[error("routine '{0}' is driven and cannot declare argument specs")]
    DrivenWithArguments(String),
}

/// Every catalog error found by one build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogErrors {
    errors: Vec<CatalogError>,
}

impl CatalogErrors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[CatalogError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<CatalogError> {
        self.errors
    }

    pub fn push(&mut self, error: impl Into<CatalogError>) {
        self.errors.push(error.into());
    }
}

impl Extend<CatalogError> for CatalogErrors {
    fn extend<T: IntoIterator<Item = CatalogError>>(&mut self, iter: T) {
        self.errors.extend(iter);
    }
}

impl fmt::Display for CatalogErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} catalog error(s):", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CatalogErrors {}
