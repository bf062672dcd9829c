//! Built-in effectors over the input stack: `in`, `mark`, `reset`.

use ribose_core::Token;

use super::{EffectFlags, Effector, Param, ParameterScope, Plan};
use crate::{EffectorError, Target, transductor::Transduction};

// IN
// ================================================================================================

/// `in[..]` pushes an input frame composed from its tokens. A plan that is a single signal
/// reference queues that signal instead of pushing a zero-length frame.
pub(super) struct In;

impl<T: Target> Effector<T> for In {
    fn name(&self) -> &'static str {
        "in"
    }

    fn compile_parameter(
        &self,
        tokens: &[Token],
        scope: &ParameterScope<'_>,
    ) -> Result<Param, EffectorError> {
        match tokens {
            [Token::Signal(name)] => Ok(Param::Signal(scope.signal(name)?)),
            _ => Plan::compile(tokens).map(Param::Plan),
        }
    }

    fn invoke(
        &mut self,
        _target: &mut T,
        ctx: &mut Transduction,
        parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        match parameter {
            Some(Param::Plan(plan)) => {
                ctx.push_input_plan(plan)?;
                Ok(EffectFlags::INPUT_PUSHED)
            },
            Some(Param::Signal(signal)) => Ok(EffectFlags::signal(*signal)),
            _ => Err(EffectorError::BadParameter("in requires a parameter".into())),
        }
    }
}

// MARK / RESET
// ================================================================================================

/// `mark` arms the mark set at the current position of the primary input.
pub(super) struct Mark;

impl<T: Target> Effector<T> for Mark {
    fn name(&self) -> &'static str {
        "mark"
    }

    fn invoke(
        &mut self,
        _target: &mut T,
        ctx: &mut Transduction,
        _parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        ctx.mark_input();
        Ok(EffectFlags::NONE)
    }
}

/// `reset` rewinds the input to the mark point; replay begins there. Without an armed mark it
/// is a no-op.
pub(super) struct Reset;

impl<T: Target> Effector<T> for Reset {
    fn name(&self) -> &'static str {
        "reset"
    }

    fn invoke(
        &mut self,
        _target: &mut T,
        ctx: &mut Transduction,
        _parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        ctx.reset_input();
        Ok(EffectFlags::NONE)
    }
}
