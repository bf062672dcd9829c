//! Built-in control effectors: `nul`, `nil`, `count`, `signal`, `start`, `pause`, `stop`.

use ribose_core::Token;

use super::{CounterSource, EffectFlags, Effector, Param, ParameterScope};
use crate::{EffectorError, Target, effectors::lossy, transductor::Transduction};

// NUL / NIL
// ================================================================================================

/// No-op; the target of domain-error recovery transitions.
pub(super) struct Nul;

impl<T: Target> Effector<T> for Nul {
    fn name(&self) -> &'static str {
        "nul"
    }

    fn invoke(
        &mut self,
        _target: &mut T,
        _ctx: &mut Transduction,
        _parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        Ok(EffectFlags::NONE)
    }
}

/// No-op.
pub(super) struct Nil;

impl<T: Target> Effector<T> for Nil {
    fn name(&self) -> &'static str {
        "nil"
    }

    fn invoke(
        &mut self,
        _target: &mut T,
        _ctx: &mut Transduction,
        _parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        Ok(EffectFlags::NONE)
    }
}

// COUNT
// ================================================================================================

/// `count[n|~f, !sig]` arms the running frame's counter; zero-arg `count` decrements it and
/// queues the armed signal on reaching zero.
pub(super) struct Count;

impl<T: Target> Effector<T> for Count {
    fn name(&self) -> &'static str {
        "count"
    }

    fn compile_parameter(
        &self,
        tokens: &[Token],
        scope: &ParameterScope<'_>,
    ) -> Result<Param, EffectorError> {
        let [initial, Token::Signal(signal)] = tokens else {
            return Err(EffectorError::BadParameter(
                "count expects an initial value and a signal".into(),
            ));
        };
        let initial = match initial {
            Token::Literal(digits) => CounterSource::Immediate(decimal_value(digits)?),
            Token::Field(name) => CounterSource::Field(name.clone()),
            _ => {
                return Err(EffectorError::BadParameter(
                    "counter initial value must be a literal or a field".into(),
                ));
            },
        };
        Ok(Param::Counter { initial, signal: scope.signal(signal)? })
    }

    fn invoke(
        &mut self,
        _target: &mut T,
        ctx: &mut Transduction,
        parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        match parameter {
            Some(Param::Counter { initial, signal }) => {
                let remaining = match initial {
                    CounterSource::Immediate(value) => *value,
                    CounterSource::Field(name) => decimal_field_value(ctx, name)?,
                };
                ctx.arm_counter(remaining, *signal)?;
                Ok(EffectFlags::NONE)
            },
            None => match ctx.decrement_counter()? {
                Some(signal) => Ok(EffectFlags::COUNTER_HIT_ZERO | EffectFlags::signal(signal)),
                None => Ok(EffectFlags::NONE),
            },
            Some(_) => Err(EffectorError::BadParameter("count parameter mismatch".into())),
        }
    }
}

fn decimal_value(digits: &[u8]) -> Result<u64, EffectorError> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(EffectorError::BadParameter(format!(
            "'{}' is not a decimal value",
            lossy(digits)
        )));
    }
    let mut value: u64 = 0;
    for &digit in digits {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((digit - b'0') as u64))
            .ok_or_else(|| {
                EffectorError::BadParameter(format!("'{}' overflows the counter", lossy(digits)))
            })?;
    }
    Ok(value)
}

/// Decodes the ASCII-decimal contents of a named field.
fn decimal_field_value(ctx: &Transduction, name: &[u8]) -> Result<u64, EffectorError> {
    decimal_value(ctx.field(name)?)
}

// SIGNAL
// ================================================================================================

/// `signal[!sig]` queues a signal as the next input.
pub(super) struct Raise;

impl<T: Target> Effector<T> for Raise {
    fn name(&self) -> &'static str {
        "signal"
    }

    fn compile_parameter(
        &self,
        tokens: &[Token],
        scope: &ParameterScope<'_>,
    ) -> Result<Param, EffectorError> {
        match tokens {
            [Token::Signal(name)] => Ok(Param::Signal(scope.signal(name)?)),
            _ => Err(EffectorError::BadParameter("expected a single signal reference".into())),
        }
    }

    fn invoke(
        &mut self,
        _target: &mut T,
        _ctx: &mut Transduction,
        parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        match parameter {
            Some(Param::Signal(signal)) => Ok(EffectFlags::signal(*signal)),
            _ => Err(EffectorError::BadParameter("signal requires a parameter".into())),
        }
    }
}

// START / PAUSE / STOP
// ================================================================================================

/// `start[@tr]` pushes a transducer frame in its initial state.
pub(super) struct Start;

impl<T: Target> Effector<T> for Start {
    fn name(&self) -> &'static str {
        "start"
    }

    fn compile_parameter(
        &self,
        tokens: &[Token],
        scope: &ParameterScope<'_>,
    ) -> Result<Param, EffectorError> {
        match tokens {
            [Token::Transducer(name)] => Ok(Param::Transducer(scope.transducer(name)?)),
            _ => {
                Err(EffectorError::BadParameter("expected a single transducer reference".into()))
            },
        }
    }

    fn invoke(
        &mut self,
        _target: &mut T,
        ctx: &mut Transduction,
        parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        match parameter {
            Some(Param::Transducer(ordinal)) => {
                ctx.push_transducer(*ordinal);
                Ok(EffectFlags::TRANSDUCER_PUSHED)
            },
            _ => Err(EffectorError::BadParameter("start requires a parameter".into())),
        }
    }
}

/// `pause` returns control to the caller; the transduction stays runnable.
pub(super) struct Pause;

impl<T: Target> Effector<T> for Pause {
    fn name(&self) -> &'static str {
        "pause"
    }

    fn invoke(
        &mut self,
        _target: &mut T,
        _ctx: &mut Transduction,
        _parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        Ok(EffectFlags::PAUSE)
    }
}

/// `stop` pops the running transducer frame; the engine halts normally when the stack empties.
pub(super) struct Stop;

impl<T: Target> Effector<T> for Stop {
    fn name(&self) -> &'static str {
        "stop"
    }

    fn invoke(
        &mut self,
        _target: &mut T,
        ctx: &mut Transduction,
        _parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        ctx.pop_transducer();
        Ok(EffectFlags::TRANSDUCER_POPPED)
    }
}
