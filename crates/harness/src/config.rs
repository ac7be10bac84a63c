// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Run configuration
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `IRH_WARMUP` | 2000 | warmup invocations when a routine declares none |
//! | `IRH_TEST` | all | comma-separated routines or drivers to run |
//! | `IRH_EXCLUDE` | none | comma-separated routines or drivers to skip |
//! | `IRH_SHUFFLE` | true | randomize execution order |
//! | `IRH_SEED` | random | shuffle seed |
//! | `IRH_VERIFY_IR` | true | print the rule encoding and verify IR afterwards |
//! | `IRH_COMPILATION_TIMEOUT_MS` | 10000 | active compilation wait |
//! | `IRH_WAIT_TIMEOUT_MS` | 10000 | passive compilation wait |
//! | `IRH_POLL_INTERVAL_MS` | 1 | compilation status polling |

use std::{str::FromStr, time::Duration};

use thiserror::Error;

pub const DEFAULT_WARMUP: u32 = 2000;
pub const DEFAULT_COMPILATION_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {variable}: {reason}")]
    InvalidValue {
        variable: &'static str,
        value: String,
        reason: String,
    },
}

/// Harness settings shared by the instrumented run and the framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub warmup: u32,
    /// Only these routines or drivers run, if set
    pub include: Option<Vec<String>>,
    pub exclude: Vec<String>,
    pub shuffle: bool,
    pub seed: Option<u64>,
    pub verify_ir: bool,
    pub compilation_timeout: Duration,
    pub wait_for_compilation_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            warmup: DEFAULT_WARMUP,
            include: None,
            exclude: Vec::new(),
            shuffle: true,
            seed: None,
            verify_ir: true,
            compilation_timeout: DEFAULT_COMPILATION_TIMEOUT,
            wait_for_compilation_timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

fn parse<T>(variable: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        variable,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_millis(variable: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse::<u64>(variable, value).map(Duration::from_millis)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

impl HarnessConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|variable| std::env::var(variable).ok())
    }

    /// Read the configuration through `lookup`, unset variables keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("IRH_WARMUP") {
            config.warmup = parse("IRH_WARMUP", &value)?;
        }
        if let Some(value) = lookup("IRH_TEST") {
            config.include = Some(parse_list(&value));
        }
        if let Some(value) = lookup("IRH_EXCLUDE") {
            config.exclude = parse_list(&value);
        }
        if let Some(value) = lookup("IRH_SHUFFLE") {
            config.shuffle = parse("IRH_SHUFFLE", &value)?;
        }
        if let Some(value) = lookup("IRH_SEED") {
            config.seed = Some(parse("IRH_SEED", &value)?);
        }
        if let Some(value) = lookup("IRH_VERIFY_IR") {
            config.verify_ir = parse("IRH_VERIFY_IR", &value)?;
        }
        if let Some(value) = lookup("IRH_COMPILATION_TIMEOUT_MS") {
            config.compilation_timeout = parse_millis("IRH_COMPILATION_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("IRH_WAIT_TIMEOUT_MS") {
            config.wait_for_compilation_timeout = parse_millis("IRH_WAIT_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("IRH_POLL_INTERVAL_MS") {
            config.poll_interval = parse_millis("IRH_POLL_INTERVAL_MS", &value)?;
        }

        Ok(config)
    }

    pub fn with_warmup(mut self, warmup: u32) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_include<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.include = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_exclude<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.exclude = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_verify_ir(mut self, verify_ir: bool) -> Self {
        self.verify_ir = verify_ir;
        self
    }

    pub fn with_compilation_timeout(mut self, timeout: Duration) -> Self {
        self.compilation_timeout = timeout;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_for_compilation_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Shared deadline of a parallel driver compilation
    pub fn join_timeout(&self) -> Duration {
        self.compilation_timeout.max(self.wait_for_compilation_timeout)
    }

    /// Whether the include/exclude filters select `name`
    pub fn selects(&self, name: &str) -> bool {
        let included = self
            .include
            .as_ref()
            .is_none_or(|names| names.iter().any(|n| n == name));
        included && !self.exclude.iter().any(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.warmup, 2000);
        assert!(config.shuffle);
        assert!(config.verify_ir);
        assert_eq!(config.join_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_reads_every_variable() {
        let config = HarnessConfig::from_lookup(lookup(&[
            ("IRH_WARMUP", "10"),
            ("IRH_TEST", "add, sub,"),
            ("IRH_EXCLUDE", "sub"),
            ("IRH_SHUFFLE", "false"),
            ("IRH_SEED", "7"),
            ("IRH_VERIFY_IR", "false"),
            ("IRH_COMPILATION_TIMEOUT_MS", "50"),
            ("IRH_WAIT_TIMEOUT_MS", "80"),
            ("IRH_POLL_INTERVAL_MS", "2"),
        ]))
        .unwrap();

        assert_eq!(config.warmup, 10);
        assert_eq!(config.include, Some(vec!["add".to_string(), "sub".to_string()]));
        assert!(!config.shuffle);
        assert_eq!(config.seed, Some(7));
        assert!(!config.verify_ir);
        assert_eq!(config.join_timeout(), Duration::from_millis(80));
        assert_eq!(config.poll_interval, Duration::from_millis(2));

        assert!(config.selects("add"));
        assert!(!config.selects("sub"));
        assert!(!config.selects("mul"));
    }

    #[test]
    fn test_malformed_value() {
        let err = HarnessConfig::from_lookup(lookup(&[("IRH_WARMUP", "lots")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { variable: "IRH_WARMUP", .. }
        ));
    }
}
