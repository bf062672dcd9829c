//! Built-in output effector: `out`.

use ribose_core::Token;

use super::{EffectFlags, Effector, Param, ParameterScope, Plan};
use crate::{EffectorError, Target, transductor::Transduction};

// OUT
// ================================================================================================

/// `out[..]` writes the concatenation of its tokens to the installed output sink in a single
/// write. There is no default sink; an uninstalled sink is an effector failure.
pub(super) struct Out;

impl<T: Target> Effector<T> for Out {
    fn name(&self) -> &'static str {
        "out"
    }

    fn compile_parameter(
        &self,
        tokens: &[Token],
        _scope: &ParameterScope<'_>,
    ) -> Result<Param, EffectorError> {
        Plan::compile(tokens).map(Param::Plan)
    }

    fn invoke(
        &mut self,
        _target: &mut T,
        ctx: &mut Transduction,
        parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        match parameter {
            Some(Param::Plan(plan)) => {
                ctx.write_plan(plan)?;
                Ok(EffectFlags::NONE)
            },
            _ => Err(EffectorError::BadParameter("out requires a parameter".into())),
        }
    }
}
