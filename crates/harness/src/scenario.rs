// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Flag scenarios
//!
//! A scenario reruns the whole catalog with extra runtime flags. Indices name
//! scenarios in reports and must be unique within one run.

use std::collections::HashSet;

use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    index: u32,
    flags: Vec<String>,
}

impl Scenario {
    pub fn new<I, S>(index: u32, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            index,
            flags: flags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }
}

/// Reject scenario sets that reuse an index.
pub fn check_unique(scenarios: &[Scenario]) -> HarnessResult<()> {
    let mut seen = HashSet::new();
    for scenario in scenarios {
        if !seen.insert(scenario.index) {
            return Err(HarnessError::DuplicateScenario(scenario.index));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_indices() {
        let scenarios = [
            Scenario::new(0, ["-XX:-UseSuperWord"]),
            Scenario::new(1, Vec::<String>::new()),
        ];
        check_unique(&scenarios).unwrap();
        assert_eq!(scenarios[0].flags(), ["-XX:-UseSuperWord"]);
    }

    #[test]
    fn test_duplicate_index() {
        let scenarios = [
            Scenario::new(3, ["-XX:+A"]),
            Scenario::new(4, ["-XX:+B"]),
            Scenario::new(3, ["-XX:+C"]),
        ];
        assert!(matches!(
            check_unique(&scenarios),
            Err(HarnessError::DuplicateScenario(3))
        ));
    }
}
