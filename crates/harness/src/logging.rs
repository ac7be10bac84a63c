// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Log setup for instrumented runs
//!
//! Stdout carries the rule encoding, so logs go to stderr. The filter is read
//! from `RUST_LOG`.

use std::io;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}
