// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Compilation trace segmentation
//!
//! The trace is one long text stream. Every compile event prints a task line
//!
//! ```text
//! <tier-info> <owner>::<routine> [@ <osr-bci>] (<size> bytes)
//! ```
//!
//! and the text up to the next task line belongs to that compilation. A `%`
//! in the tier info or an `@ <bci>` suffix marks an on-stack-replacement
//! compile; OSR bodies are never used for verification.
//!
//! The owner must name the class under test exactly, optionally qualified by
//! a package (`pkg.Sum` or `pkg/Sum`). `SumHelper` and `Sum$Inner` are other
//! classes.
//!
//! When a routine is compiled more than once the last normal compilation
//! wins. This matches what the runtime ends up executing in the common
//! "tier 3 then tier 4" case, but a routine that deoptimizes and recompiles
//! repeatedly may be verified against whichever body happened to come last.

use std::collections::HashMap;

use ir_rules::Encoding;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref COMPILE_TASK: Regex = Regex::new(
        r"(?m)^(?P<info>[^:\n]*?)[ \t]*(?P<owner>[\w$./]+)::(?P<name>[\w$<>]+)(?:[ \t]+@[ \t]+(?P<osr>\d+))?[ \t]+\((?P<size>\d+) bytes\)[ \t]*\r?$"
    )
    .expect("compile task regex");
}

/// Text of one compilation in the trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilationSegment<'t> {
    pub routine: &'t str,
    pub owner: &'t str,
    /// Everything between this task line and the next one
    pub text: &'t str,
    pub is_osr: bool,
}

/// Whether a task line owner is `class`, with or without a package.
fn is_owned_by(owner: &str, class: &str) -> bool {
    match owner.strip_suffix(class) {
        Some("") => true,
        Some(package) => package.ends_with(['.', '/']),
        None => false,
    }
}

/// Splits traces into per-routine segments for the class under test
pub struct Segmenter<'a> {
    class: &'a str,
    encoding: &'a Encoding,
}

impl<'a> Segmenter<'a> {
    pub fn new(class: &'a str, encoding: &'a Encoding) -> Self {
        Self { class, encoding }
    }

    /// Every compilation in the trace, in order, unfiltered.
    pub fn scan<'t>(trace: &'t str) -> Vec<CompilationSegment<'t>> {
        let tasks: Vec<_> = COMPILE_TASK.captures_iter(trace).collect();
        let mut segments = Vec::with_capacity(tasks.len());

        for (at, task) in tasks.iter().enumerate() {
            let (Some(line), Some(owner), Some(name)) =
                (task.get(0), task.name("owner"), task.name("name"))
            else {
                continue;
            };
            let end = tasks
                .get(at + 1)
                .and_then(|next| next.get(0))
                .map_or(trace.len(), |next| next.start());
            let is_osr = task.name("osr").is_some()
                || task.name("info").is_some_and(|info| info.as_str().contains('%'));

            segments.push(CompilationSegment {
                routine: name.as_str(),
                owner: owner.as_str(),
                text: trace[line.end()..end].trim_start_matches(['\r', '\n']),
                is_osr,
            });
        }

        segments
    }

    /// Segments of tracked routines, last normal compilation per routine.
    pub fn segment<'t>(&self, trace: &'t str) -> Segments<'t> {
        let mut by_routine = HashMap::new();

        for segment in Self::scan(trace) {
            if segment.is_osr {
                debug!(routine = segment.routine, "dropping OSR compilation");
                continue;
            }
            if !is_owned_by(segment.owner, self.class)
                || !self.encoding.contains(segment.routine)
            {
                continue;
            }
            if by_routine.insert(segment.routine, segment).is_some() {
                debug!(routine = segment.routine, "later compilation replaces earlier one");
            }
        }

        Segments { by_routine }
    }
}

/// Kept segments, keyed by routine name
#[derive(Debug, Default)]
pub struct Segments<'t> {
    by_routine: HashMap<&'t str, CompilationSegment<'t>>,
}

impl<'t> Segments<'t> {
    pub fn get(&self, routine: &str) -> Option<&CompilationSegment<'t>> {
        self.by_routine.get(routine)
    }

    pub fn len(&self) -> usize {
        self.by_routine.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_routine.is_empty()
    }
}
