// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Compilation waits
//!
//! Two ways to get a routine compiled at its resolved tier:
//!
//! - **Active**: deoptimize stale code, enqueue, poll. A request the runtime
//!   dropped (not compiled at the tier and not queued) is enqueued again,
//!   including when a competing compile left the routine at another tier.
//! - **Passive**: keep invoking until the runtime compiles on its own.
//!
//! Drivers with several active targets fan the waits out over scoped worker
//! threads that share one deadline:
//!
//! ```text
//! driver ──┬─→ worker(a): compile_and_wait ──┐
//!          └─→ worker(b): compile_and_wait ──┴─→ channel ─→ join (deadline)
//! ```

use std::{
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::{
    config::HarnessConfig,
    error::{HarnessError, HarnessResult},
    runtime::RuntimeControl,
    tier::Tier,
};

/// Enqueue `routine` at `tier` and poll until it is compiled at `tier`.
pub fn compile_and_wait(
    runtime: &dyn RuntimeControl,
    routine: &str,
    tier: Tier,
    timeout: Duration,
    poll_interval: Duration,
) -> HarnessResult<()> {
    let start = Instant::now();

    match runtime.compiled_tier(routine) {
        Some(current) if current == tier => return Ok(()),
        Some(current) => {
            debug!(routine, %current, target = %tier, "deoptimizing before recompilation");
            runtime.deoptimize(routine);
        }
        None => {}
    }

    runtime.enqueue_compilation(routine, tier);
    let mut attempts = 1u32;
    debug!(routine, %tier, "compilation enqueued");

    loop {
        let queued = runtime.is_queued(routine);
        let current = runtime.compiled_tier(routine);
        if current == Some(tier) {
            return Ok(());
        }
        if !queued {
            warn!(
                routine,
                %tier,
                ?current,
                attempts,
                "compilation request dropped, enqueueing again"
            );
            runtime.enqueue_compilation(routine, tier);
            attempts += 1;
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(HarnessError::CompilationTimeout {
                routine: routine.to_string(),
                tier,
                elapsed,
                attempts,
            });
        }
        thread::sleep(poll_interval);
    }
}

/// Invoke until the runtime compiled `routine` at `tier` by itself.
pub fn wait_for_compilation(
    runtime: &dyn RuntimeControl,
    routine: &str,
    tier: Tier,
    timeout: Duration,
    mut invoke: impl FnMut() -> HarnessResult<()>,
) -> HarnessResult<()> {
    let start = Instant::now();
    let mut invocations = 0u64;

    while runtime.compiled_tier(routine) != Some(tier) {
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(HarnessError::WaitTimeout {
                routine: routine.to_string(),
                tier,
                elapsed,
                invocations,
            });
        }
        invoke()?;
        invocations += 1;
    }

    debug!(routine, %tier, invocations, "compiled by the runtime");
    Ok(())
}

/// One active compilation of a driver target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileRequest<'a> {
    pub routine: &'a str,
    pub tier: Tier,
}

/// Compile every request of `driver`, one worker thread per request.
///
/// A single request is compiled on the calling thread. Workers and the join
/// share the deadline [`HarnessConfig::join_timeout`].
pub fn compile_all(
    driver: &str,
    runtime: &dyn RuntimeControl,
    requests: &[CompileRequest<'_>],
    config: &HarnessConfig,
) -> HarnessResult<()> {
    match requests {
        [] => return Ok(()),
        [request] => {
            return compile_and_wait(
                runtime,
                request.routine,
                request.tier,
                config.compilation_timeout,
                config.poll_interval,
            );
        }
        _ => {}
    }

    let timeout = config.join_timeout();
    let poll_interval = config.poll_interval;
    let start = Instant::now();
    debug!(driver, targets = requests.len(), "compiling targets in parallel");

    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel();
        let mut handles = Vec::with_capacity(requests.len());
        let mut spawn_error = None;

        for request in requests {
            let tx = tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("compile-{}", request.routine))
                .spawn_scoped(scope, move || {
                    let result = compile_and_wait(
                        runtime,
                        request.routine,
                        request.tier,
                        timeout,
                        poll_interval,
                    );
                    let _ = tx.send((request.routine, result));
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    spawn_error = Some(HarnessError::WorkerSpawn {
                        routine: request.routine.to_string(),
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }
        drop(tx);

        let result = match spawn_error {
            Some(error) => Err(error),
            None => join(driver, requests, &rx, start, timeout),
        };

        // Joined explicitly so a panicked worker surfaces as WorkerFailed
        // instead of a panic of the whole scope.
        for handle in handles {
            let _ = handle.join();
        }
        result
    })
}

fn join(
    driver: &str,
    requests: &[CompileRequest<'_>],
    rx: &mpsc::Receiver<(&str, HarnessResult<()>)>,
    start: Instant,
    timeout: Duration,
) -> HarnessResult<()> {
    let mut pending: Vec<&str> = requests.iter().map(|request| request.routine).collect();

    while !pending.is_empty() {
        let remaining = timeout.saturating_sub(start.elapsed());
        match rx.recv_timeout(remaining) {
            Ok((routine, result)) => {
                pending.retain(|name| *name != routine);
                result?;
                debug!(driver, routine, "target compiled");
            }
            Err(RecvTimeoutError::Timeout) => {
                return Err(HarnessError::DriverJoinTimeout {
                    driver: driver.to_string(),
                    pending: pending.iter().map(|name| name.to_string()).collect(),
                    elapsed: start.elapsed(),
                });
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(HarnessError::WorkerFailed {
                    driver: driver.to_string(),
                    pending: pending.iter().map(|name| name.to_string()).collect(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{CompileBehavior, SimulatedRuntime};

    const TIMEOUT: Duration = Duration::from_millis(50);
    const POLL: Duration = Duration::from_millis(1);

    fn runtime() -> SimulatedRuntime {
        SimulatedRuntime::from_options("Sum", Vec::<String>::new())
    }

    #[test]
    fn test_immediate_compilation() {
        let runtime = runtime();
        compile_and_wait(&runtime, "add", Tier::Optimized, TIMEOUT, POLL).unwrap();
        assert_eq!(runtime.compiled_tier("add"), Some(Tier::Optimized));
        assert_eq!(runtime.enqueue_count("add"), 1);
    }

    #[test]
    fn test_dropped_requests_are_enqueued_again() {
        let runtime = runtime();
        runtime.set_behavior("add", CompileBehavior::DropFirst(3));
        compile_and_wait(&runtime, "add", Tier::Optimized, TIMEOUT, POLL).unwrap();
        assert_eq!(runtime.enqueue_count("add"), 4);
    }

    #[test]
    fn test_stale_tier_is_deoptimized_first() {
        let runtime = runtime();
        runtime.enqueue_compilation("add", Tier::Simple);
        compile_and_wait(&runtime, "add", Tier::Optimized, TIMEOUT, POLL).unwrap();
        assert_eq!(runtime.deoptimization_count("add"), 1);
        assert_eq!(runtime.compiled_tier("add"), Some(Tier::Optimized));
    }

    #[test]
    fn test_active_timeout() {
        let runtime = runtime();
        runtime.set_behavior("add", CompileBehavior::Never);
        let err = compile_and_wait(&runtime, "add", Tier::Optimized, TIMEOUT, POLL).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::CompilationTimeout { attempts: 1, elapsed, .. } if elapsed >= TIMEOUT
        ));
    }

    #[test]
    fn test_lower_tier_compile_does_not_end_the_wait() {
        let runtime = runtime();
        runtime.set_behavior("add", CompileBehavior::CompetingTier(Tier::FullProfile));
        compile_and_wait(&runtime, "add", Tier::Optimized, TIMEOUT, POLL).unwrap();
        assert_eq!(runtime.compiled_tier("add"), Some(Tier::Optimized));
        assert_eq!(runtime.enqueue_count("add"), 2);
    }

    #[test]
    fn test_wrong_tier_times_out() {
        let runtime = runtime();
        runtime.set_behavior("add", CompileBehavior::WrongTier(Tier::Simple));
        let err = compile_and_wait(&runtime, "add", Tier::Optimized, TIMEOUT, POLL).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::CompilationTimeout { attempts, .. } if attempts > 1
        ));
        assert_eq!(runtime.compiled_tier("add"), Some(Tier::Simple));
    }

    #[test]
    fn test_passive_wait_invokes_until_compiled() {
        let runtime = runtime();
        runtime.set_behavior("add", CompileBehavior::AfterInvocations(5));
        let mut calls = 0;
        wait_for_compilation(&runtime, "add", Tier::Optimized, TIMEOUT, || {
            calls += 1;
            runtime.note_invocation("add");
            Ok(())
        })
        .unwrap();
        assert_eq!(calls, 5);
    }

    #[test]
    fn test_passive_timeout() {
        let runtime = runtime();
        runtime.set_behavior("add", CompileBehavior::Never);
        let err = wait_for_compilation(&runtime, "add", Tier::Optimized, TIMEOUT, || Ok(()))
            .unwrap_err();
        assert!(matches!(err, HarnessError::WaitTimeout { invocations, .. } if invocations > 0));
    }

    #[test]
    fn test_parallel_targets_join() {
        let runtime = runtime();
        runtime.set_behavior("b", CompileBehavior::DropFirst(2));
        let config = HarnessConfig::default()
            .with_compilation_timeout(TIMEOUT)
            .with_wait_timeout(TIMEOUT)
            .with_poll_interval(POLL);
        let requests = [
            CompileRequest {
                routine: "a",
                tier: Tier::Optimized,
            },
            CompileRequest {
                routine: "b",
                tier: Tier::FullProfile,
            },
        ];

        compile_all("drive", &runtime, &requests, &config).unwrap();
        assert_eq!(runtime.compiled_tier("a"), Some(Tier::Optimized));
        assert_eq!(runtime.compiled_tier("b"), Some(Tier::FullProfile));
    }

    #[test]
    fn test_parallel_timeout_is_fatal() {
        let runtime = runtime();
        runtime.set_behavior("b", CompileBehavior::Never);
        let config = HarnessConfig::default()
            .with_compilation_timeout(TIMEOUT)
            .with_wait_timeout(TIMEOUT)
            .with_poll_interval(POLL);
        let requests = [
            CompileRequest {
                routine: "a",
                tier: Tier::Optimized,
            },
            CompileRequest {
                routine: "b",
                tier: Tier::Optimized,
            },
        ];

        let err = compile_all("drive", &runtime, &requests, &config).unwrap_err();
        match err {
            HarnessError::CompilationTimeout { routine, .. } => assert_eq!(routine, "b"),
            HarnessError::DriverJoinTimeout { pending, .. } => assert_eq!(pending, vec!["b"]),
            other => panic!("unexpected error: {other}"),
        }
    }
}
