// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Explicit registration of routines, checks and drivers
//!
//! [`CatalogBuilder::build`] validates every declaration and reports all
//! errors at once, then classifies each routine:
//!
//! | Variant | Companion |
//! |---------|-----------|
//! | [`Entry::Plain`] | none |
//! | [`Entry::Checked`] | a [`Check`] targets the routine |
//! | [`Entry::Driven`] | a [`Driver`] lists the routine among its targets |

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use ir_rules::{FormatError, RoutineRules};

use crate::{
    error::{CatalogError, CatalogErrors},
    routine::{Check, Driver, RunMode, Routine},
    tier::{Tier, TierRequest},
};

/// One unit of execution
#[derive(Clone)]
pub enum Entry {
    Plain(Arc<Routine>),
    Checked {
        routine: Arc<Routine>,
        check: Arc<Check>,
    },
    Driven {
        driver: Arc<Driver>,
        targets: Vec<Arc<Routine>>,
    },
}

impl Entry {
    /// Routine name, or driver name for driven entries
    pub fn name(&self) -> &str {
        match self {
            Entry::Plain(routine) | Entry::Checked { routine, .. } => routine.name(),
            Entry::Driven { driver, .. } => driver.name(),
        }
    }

    pub fn routines(&self) -> impl Iterator<Item = &Arc<Routine>> {
        let (single, targets) = match self {
            Entry::Plain(routine) | Entry::Checked { routine, .. } => (Some(routine), &[][..]),
            Entry::Driven { targets, .. } => (None, targets.as_slice()),
        };
        single.into_iter().chain(targets)
    }
}

/// Validated, classified routine set of one class under test
pub struct Catalog {
    class_name: String,
    routines: Vec<Arc<Routine>>,
    entries: Vec<Entry>,
}

impl Catalog {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn routine(&self, name: &str) -> Option<&Arc<Routine>> {
        self.routines.iter().find(|routine| routine.name() == name)
    }

    /// Declared rules of every routine, in declaration order
    pub fn rule_table(&self) -> Vec<RoutineRules> {
        self.routines
            .iter()
            .filter(|routine| !routine.rules().is_empty())
            .map(|routine| RoutineRules::new(routine.name(), routine.rules().to_vec()))
            .collect()
    }
}

/// Collects declarations for [`Catalog`]
pub struct CatalogBuilder {
    class_name: String,
    routines: Vec<Routine>,
    checks: Vec<Check>,
    drivers: Vec<Driver>,
}

impl CatalogBuilder {
    /// `class_name` is the owner prefix compilations are attributed by.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            routines: Vec::new(),
            checks: Vec::new(),
            drivers: Vec::new(),
        }
    }

    pub fn routine(mut self, routine: Routine) -> Self {
        self.routines.push(routine);
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn driver(mut self, driver: Driver) -> Self {
        self.drivers.push(driver);
        self
    }

    fn check_names(&self, errors: &mut CatalogErrors) {
        let mut seen = HashSet::new();
        let names = self
            .routines
            .iter()
            .map(|r| ("routine", r.name()))
            .chain(self.checks.iter().map(|c| ("check", c.name())))
            .chain(self.drivers.iter().map(|d| ("driver", d.name())));

        for (kind, name) in names {
            if name.is_empty() {
                errors.push(CatalogError::EmptyName(kind));
            } else if !seen.insert(name) {
                errors.push(CatalogError::DuplicateName(name.to_string()));
            }
        }
    }

    fn check_routine(routine: &Routine, errors: &mut CatalogErrors) {
        for (index, rule) in routine.rules().iter().enumerate() {
            let origin = format!("routine '{}' rule {}", routine.name(), index + 1);
            errors.extend(
                rule.validate()
                    .into_iter()
                    .map(|kind| CatalogError::Rule(FormatError::new(origin.clone(), kind))),
            );
        }

        let below_optimized =
            matches!(routine.tier_request(), TierRequest::At(tier) if tier != Tier::Optimized);
        if !routine.rules().is_empty() && below_optimized {
            errors.push(CatalogError::RulesRequireOptimizedTier(
                routine.name().to_string(),
            ));
        }

        for (index, argument) in routine.arguments().iter().enumerate() {
            if !argument.spec.supports(argument.ty) {
                errors.push(CatalogError::InvalidArgument {
                    routine: routine.name().to_string(),
                    index,
                    ty: argument.ty,
                    spec: format!("{:?}", argument.spec),
                });
            }
        }
    }

    /// Validate and classify. Every error is reported, not only the first.
    pub fn build(self) -> Result<Catalog, CatalogErrors> {
        let mut errors = CatalogErrors::default();
        self.check_names(&mut errors);
        for routine in &self.routines {
            Self::check_routine(routine, &mut errors);
        }

        let routines: Vec<Arc<Routine>> = self.routines.into_iter().map(Arc::new).collect();
        let by_name: HashMap<&str, &Arc<Routine>> = routines
            .iter()
            .map(|routine| (routine.name(), routine))
            .collect();

        // Drivers first, so checks can see which routines are driven.
        let mut driver_entries = Vec::new();
        for driver in self.drivers {
            if driver.targets().is_empty() {
                errors.push(CatalogError::DriverWithoutTargets(driver.name().to_string()));
            }
            if driver.run_mode() == RunMode::Standalone && driver.warmup_iterations().is_some() {
                errors.push(CatalogError::StandaloneWarmup(driver.name().to_string()));
            }

            let mut targets = Vec::new();
            for target in driver.targets() {
                let Some(routine) = by_name.get(target.as_str()) else {
                    errors.push(CatalogError::UnknownDriverTarget {
                        driver: driver.name().to_string(),
                        target: target.clone(),
                    });
                    continue;
                };
                if routine.claim(driver.name()).is_err() {
                    errors.push(CatalogError::AlreadyDriven {
                        routine: target.clone(),
                        driver: routine.driver().unwrap_or_default().to_string(),
                    });
                    continue;
                }
                if !routine.arguments().is_empty() {
                    errors.push(CatalogError::DrivenWithArguments(target.clone()));
                }
                targets.push(Arc::clone(routine));
            }
            driver_entries.push(Entry::Driven {
                driver: Arc::new(driver),
                targets,
            });
        }

        let mut checks: HashMap<String, Arc<Check>> = HashMap::new();
        for check in self.checks {
            let target = check.target().to_string();
            match by_name.get(target.as_str()) {
                None => errors.push(CatalogError::UnknownCheckTarget {
                    check: check.name().to_string(),
                    target,
                }),
                Some(routine) if routine.driver().is_some() => {
                    errors.push(CatalogError::CheckedAndDriven(target))
                }
                Some(_) if checks.contains_key(&target) => {
                    errors.push(CatalogError::DuplicateCheck(target))
                }
                Some(_) => {
                    checks.insert(target, Arc::new(check));
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let mut entries: Vec<Entry> = routines
            .iter()
            .filter(|routine| routine.driver().is_none())
            .map(|routine| match checks.remove(routine.name()) {
                Some(check) => Entry::Checked {
                    routine: Arc::clone(routine),
                    check,
                },
                None => Entry::Plain(Arc::clone(routine)),
            })
            .collect();
        entries.extend(driver_entries);

        Ok(Catalog {
            class_name: self.class_name,
            routines,
            entries,
        })
    }
}
