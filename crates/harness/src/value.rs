// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Routine argument and return values
//!
//! Each declared argument pairs a type with a generation spec:
//!
//! | Spec | Int | Float | Bool |
//! |------|-----|-------|------|
//! | `Default` | 0 | 0.0 | false |
//! | `Number42` / `NumberMinus42` | ±42 | ±42.0 | - |
//! | `Min` / `Max` | `i64::MIN` / `i64::MAX` | `f64::MIN` / `f64::MAX` | - |
//! | `True` / `False` | - | - | fixed |
//! | `BooleanToggle` | - | - | alternates |
//! | `RandomOnce` | drawn once | drawn once | drawn once |
//! | `RandomEach` | drawn per call | drawn per call | drawn per call |

use std::fmt;

use rand::{Rng, RngCore, SeedableRng, rngs::StdRng};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Void,
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("void"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    Int,
    Float,
    Bool,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArgType::Int => "int",
            ArgType::Float => "float",
            ArgType::Bool => "bool",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentSpec {
    Default,
    Number42,
    NumberMinus42,
    Min,
    Max,
    True,
    False,
    BooleanToggle { first: bool },
    RandomOnce,
    RandomEach,
}

impl ArgumentSpec {
    pub fn supports(self, ty: ArgType) -> bool {
        match self {
            ArgumentSpec::Default | ArgumentSpec::RandomOnce | ArgumentSpec::RandomEach => true,
            ArgumentSpec::Number42
            | ArgumentSpec::NumberMinus42
            | ArgumentSpec::Min
            | ArgumentSpec::Max => ty != ArgType::Bool,
            ArgumentSpec::True | ArgumentSpec::False | ArgumentSpec::BooleanToggle { .. } => {
                ty == ArgType::Bool
            }
        }
    }
}

/// One declared argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argument {
    pub ty: ArgType,
    pub spec: ArgumentSpec,
}

impl Argument {
    pub fn new(ty: ArgType, spec: ArgumentSpec) -> Self {
        Self { ty, spec }
    }
}

fn fixed(ty: ArgType, spec: ArgumentSpec) -> Option<Value> {
    let value = match (ty, spec) {
        (ArgType::Int, ArgumentSpec::Default) => Value::Int(0),
        (ArgType::Float, ArgumentSpec::Default) => Value::Float(0.0),
        (ArgType::Bool, ArgumentSpec::Default) => Value::Bool(false),
        (ArgType::Int, ArgumentSpec::Number42) => Value::Int(42),
        (ArgType::Float, ArgumentSpec::Number42) => Value::Float(42.0),
        (ArgType::Int, ArgumentSpec::NumberMinus42) => Value::Int(-42),
        (ArgType::Float, ArgumentSpec::NumberMinus42) => Value::Float(-42.0),
        (ArgType::Int, ArgumentSpec::Min) => Value::Int(i64::MIN),
        (ArgType::Float, ArgumentSpec::Min) => Value::Float(f64::MIN),
        (ArgType::Int, ArgumentSpec::Max) => Value::Int(i64::MAX),
        (ArgType::Float, ArgumentSpec::Max) => Value::Float(f64::MAX),
        (ArgType::Bool, ArgumentSpec::True) => Value::Bool(true),
        (ArgType::Bool, ArgumentSpec::False) => Value::Bool(false),
        (ArgType::Bool, ArgumentSpec::BooleanToggle { first }) => Value::Bool(first),
        _ => return None,
    };
    Some(value)
}

fn random(rng: &mut StdRng, ty: ArgType) -> Value {
    match ty {
        ArgType::Int => Value::Int(rng.next_u64() as i64),
        ArgType::Float => Value::Float(rng.gen_range(-1.0e6..1.0e6)),
        ArgType::Bool => Value::Bool(rng.gen_bool(0.5)),
    }
}

enum Slot {
    Fixed(Value),
    Toggle(bool),
    Random(ArgType),
}

/// Produces argument values for successive invocations of one routine
pub struct ArgumentGenerator {
    rng: StdRng,
    slots: Vec<Slot>,
}

impl ArgumentGenerator {
    /// Arguments are expected to be validated; an unsupported spec falls
    /// back to the type's default value.
    pub fn new(arguments: &[Argument], seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let slots = arguments
            .iter()
            .map(|argument| match argument.spec {
                ArgumentSpec::RandomOnce => Slot::Fixed(random(&mut rng, argument.ty)),
                ArgumentSpec::RandomEach => Slot::Random(argument.ty),
                ArgumentSpec::BooleanToggle { first } => Slot::Toggle(first),
                spec => Slot::Fixed(
                    fixed(argument.ty, spec)
                        .or_else(|| fixed(argument.ty, ArgumentSpec::Default))
                        .unwrap_or(Value::Void),
                ),
            })
            .collect();
        Self { rng, slots }
    }

    /// Values for the next invocation
    pub fn next_values(&mut self) -> Vec<Value> {
        let rng = &mut self.rng;
        self.slots
            .iter_mut()
            .map(|slot| match slot {
                Slot::Fixed(value) => *value,
                Slot::Toggle(next) => {
                    let value = Value::Bool(*next);
                    *next = !*next;
                    value
                }
                Slot::Random(ty) => random(rng, *ty),
            })
            .collect()
    }
}
