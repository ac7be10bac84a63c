// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Compilation assertions for check and driver bodies
//!
//! Assertions that demand compiled code hold vacuously when the runtime runs
//! with its compiler disabled.

use tracing::debug;

use crate::{
    error::{HarnessError, HarnessResult},
    runtime::RuntimeControl,
    tier::Tier,
};

fn compiler_disabled(runtime: &dyn RuntimeControl, routine: &str) -> bool {
    let disabled = runtime.bool_flag("UseCompiler") == Some(false);
    if disabled {
        debug!(routine, "compiler disabled, compilation assertion ignored");
    }
    disabled
}

pub fn is_compiled_at_tier(runtime: &dyn RuntimeControl, routine: &str, tier: Tier) -> bool {
    runtime.compiled_tier(routine) == Some(tier)
}

pub fn assert_compiled_at_tier(
    runtime: &dyn RuntimeControl,
    routine: &str,
    tier: Tier,
) -> HarnessResult<()> {
    if is_compiled_at_tier(runtime, routine, tier) || compiler_disabled(runtime, routine) {
        return Ok(());
    }
    Err(HarnessError::CompilationAssertion {
        routine: routine.to_string(),
        expected: tier.to_string(),
        actual: runtime.compiled_tier(routine),
    })
}

pub fn assert_compiled(runtime: &dyn RuntimeControl, routine: &str) -> HarnessResult<()> {
    if runtime.compiled_tier(routine).is_some() || compiler_disabled(runtime, routine) {
        return Ok(());
    }
    Err(HarnessError::CompilationAssertion {
        routine: routine.to_string(),
        expected: "compiled at any tier".to_string(),
        actual: None,
    })
}

pub fn assert_not_compiled(runtime: &dyn RuntimeControl, routine: &str) -> HarnessResult<()> {
    match runtime.compiled_tier(routine) {
        None => Ok(()),
        actual => Err(HarnessError::CompilationAssertion {
            routine: routine.to_string(),
            expected: "not compiled".to_string(),
            actual,
        }),
    }
}
