//! The effector trait, its compiled parameter forms, and the built-in effector set.
//!
//! Effectors play two roles over one surface: at model bind time a proxy instance compiles
//! each raw parameter token list into its opaque [`Param`] (no live target or sink exists
//! yet), and during `run()` a live instance applies precompiled parameters against the
//! transduction. Built-ins occupy the fixed ordinals of [`ribose_core::builtins`]; a target
//! adds its own effectors after them.

use alloc::{boxed::Box, string::String, sync::Arc, vec::Vec};
use core::any::Any;

use ribose_core::{Model, Signal, Token, builtins};

use crate::{EffectorError, Target, transductor::Transduction};

mod field_ops;
mod flow_ops;
mod input_ops;
mod output_ops;

// EFFECT FLAGS
// ================================================================================================

/// The result word of an effector invocation: a small bitset, plus a queued signal ordinal
/// packed into the upper half when [`EffectFlags::SIGNAL`] is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EffectFlags(u32);

impl EffectFlags {
    pub const NONE: EffectFlags = EffectFlags(0);
    pub const TRANSDUCER_PUSHED: EffectFlags = EffectFlags(1 << 0);
    pub const TRANSDUCER_POPPED: EffectFlags = EffectFlags(1 << 1);
    pub const INPUT_PUSHED: EffectFlags = EffectFlags(1 << 2);
    pub const COUNTER_HIT_ZERO: EffectFlags = EffectFlags(1 << 3);
    pub const PAUSE: EffectFlags = EffectFlags(1 << 4);
    pub const STOPPED: EffectFlags = EffectFlags(1 << 5);
    pub const SIGNAL: EffectFlags = EffectFlags(1 << 6);

    /// Returns a result that queues `signal` as the next input.
    pub const fn signal(signal: Signal) -> EffectFlags {
        EffectFlags(Self::SIGNAL.0 | (signal.ordinal() << 16))
    }

    pub const fn contains(&self, flag: EffectFlags) -> bool {
        self.0 & flag.0 != 0
    }

    /// Returns the queued signal, if [`Self::SIGNAL`] is set.
    pub fn queued_signal(&self) -> Option<Signal> {
        if self.contains(Self::SIGNAL) {
            Signal::from_ordinal(self.0 >> 16)
        } else {
            None
        }
    }

    /// Folds another result in. At most one effector per effect vector may return a signal;
    /// the violation is only checked in debug builds.
    pub fn merge(self, other: EffectFlags) -> EffectFlags {
        debug_assert!(
            !(self.contains(Self::SIGNAL) && other.contains(Self::SIGNAL)),
            "more than one effector in an effect vector returned a signal"
        );
        EffectFlags(self.0 | other.0)
    }
}

impl core::ops::BitOr for EffectFlags {
    type Output = EffectFlags;

    fn bitor(self, rhs: EffectFlags) -> EffectFlags {
        EffectFlags(self.0 | rhs.0)
    }
}

// COMPILED PARAMETERS
// ================================================================================================

/// The opaque compiled form of one parameter token list.
///
/// Built-in effectors compile into the closed variants below; target-supplied effectors may
/// return [`Param::Custom`] with any shared payload. Compiled once per model, shared across
/// transductors.
#[derive(Clone, Debug)]
pub enum Param {
    /// A token assembly plan: literal chunks and field splices, in order.
    Plan(Plan),
    /// Counter arming: initial value (immediate or decoded from a field) and the signal to
    /// queue when the counter reaches zero.
    Counter { initial: CounterSource, signal: Signal },
    /// A signal to queue.
    Signal(Signal),
    /// A transducer ordinal to push.
    Transducer(u32),
    /// A field selector.
    Field(FieldSpec),
    /// A target-defined payload.
    Custom(Arc<dyn Any + Send + Sync>),
}

#[derive(Clone, Debug)]
pub enum CounterSource {
    Immediate(u64),
    Field(Vec<u8>),
}

#[derive(Clone, Debug)]
pub enum FieldSpec {
    /// Every field of the running transducer (`~*`).
    All,
    /// One field, by name; the empty name is the anonymous field.
    Name(Vec<u8>),
}

/// An ordered concatenation recipe over literals and field contents.
#[derive(Clone, Debug, Default)]
pub struct Plan(pub(crate) Vec<PlanStep>);

#[derive(Clone, Debug)]
pub(crate) enum PlanStep {
    Literal(Vec<u8>),
    Field(Vec<u8>),
}

impl Plan {
    /// Compiles tokens into a plan; signal and transducer references are rejected.
    pub fn compile(tokens: &[Token]) -> Result<Plan, EffectorError> {
        let mut steps = Vec::with_capacity(tokens.len());
        for token in tokens {
            match token {
                Token::Literal(bytes) => steps.push(PlanStep::Literal(bytes.clone())),
                Token::Field(name) => steps.push(PlanStep::Field(name.clone())),
                Token::Signal(_) | Token::Transducer(_) => {
                    return Err(EffectorError::BadParameter(format!(
                        "token '{token}' has no byte content"
                    )));
                },
            }
        }
        Ok(Plan(steps))
    }
}

// PARAMETER SCOPE
// ================================================================================================

/// Name resolution available to `compile_parameter`.
///
/// Signal and transducer references resolve to ordinals at compile time; field references stay
/// names, because parameters are shared across transducers and field ordinals are local to
/// each (resolution happens per running frame).
pub struct ParameterScope<'a> {
    model: &'a Model,
}

impl<'a> ParameterScope<'a> {
    pub(crate) fn new(model: &'a Model) -> Self {
        ParameterScope { model }
    }

    pub fn signal(&self, name: &[u8]) -> Result<Signal, EffectorError> {
        core::str::from_utf8(name)
            .ok()
            .and_then(|name| self.model.signals().get(name))
            .ok_or_else(|| {
                EffectorError::BadParameter(format!("unknown signal '!{}'", lossy(name)))
            })
    }

    pub fn transducer(&self, name: &[u8]) -> Result<u32, EffectorError> {
        core::str::from_utf8(name)
            .ok()
            .and_then(|name| self.model.transducer_ordinal(name))
            .ok_or_else(|| {
                EffectorError::BadParameter(format!("unknown transducer '@{}'", lossy(name)))
            })
    }
}

pub(crate) fn lossy(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' }).collect()
}

// EFFECTOR TRAIT
// ================================================================================================

/// A named callable installed on a transductor.
///
/// `compile_parameter` is the proxy hook, invoked once per referenced token list at model bind
/// time; `invoke` is the live hook, dispatched from effect vectors during `run()`. Effectors
/// that take no parameters keep the default `compile_parameter`.
pub trait Effector<T: Target> {
    /// The effector's name, as it appears in model effector tables.
    fn name(&self) -> &'static str;

    /// Compiles one parameter token list into its opaque compiled form.
    fn compile_parameter(
        &self,
        tokens: &[Token],
        scope: &ParameterScope<'_>,
    ) -> Result<Param, EffectorError> {
        let _ = (tokens, scope);
        Err(EffectorError::NotParameterized)
    }

    /// Applies this effector against the live transduction.
    fn invoke(
        &mut self,
        target: &mut T,
        ctx: &mut Transduction,
        parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError>;
}

// BUILT-IN REGISTRY
// ================================================================================================

/// Returns the built-in effector set, indexed by the fixed ABI ordinals.
pub(crate) fn builtin_effectors<T: Target>() -> Vec<Box<dyn Effector<T>>> {
    let effectors: Vec<Box<dyn Effector<T>>> = vec![
        Box::new(flow_ops::Nul),
        Box::new(flow_ops::Nil),
        Box::new(field_ops::Paste),
        Box::new(field_ops::Select),
        Box::new(field_ops::CopyField),
        Box::new(field_ops::Cut),
        Box::new(field_ops::Clear),
        Box::new(flow_ops::Count),
        Box::new(flow_ops::Raise),
        Box::new(input_ops::In),
        Box::new(output_ops::Out),
        Box::new(input_ops::Mark),
        Box::new(input_ops::Reset),
        Box::new(flow_ops::Start),
        Box::new(flow_ops::Pause),
        Box::new(flow_ops::Stop),
    ];
    debug_assert_eq!(effectors.len(), builtins::NAMES.len());
    debug_assert!(
        effectors.iter().zip(builtins::NAMES.iter()).all(|(e, n)| e.name() == *n),
        "built-in registry order must match the ABI name table"
    );
    effectors
}

// TESTS
// ================================================================================================
