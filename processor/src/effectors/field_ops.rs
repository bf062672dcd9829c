//! Built-in effectors over the field table: `paste`, `select`, `copy`, `cut`, `clear`.

use ribose_core::Token;

use super::{EffectFlags, Effector, FieldSpec, Param, ParameterScope, Plan};
use crate::{EffectorError, Target, transductor::Transduction};

/// Compiles a single `~field` reference; `allow_star` admits the `~*` wildcard.
fn compile_field_reference(
    tokens: &[Token],
    allow_star: bool,
) -> Result<Param, EffectorError> {
    match tokens {
        [Token::Field(name)] if allow_star && name.as_slice() == b"*" => {
            Ok(Param::Field(FieldSpec::All))
        },
        [Token::Field(name)] if name.as_slice() != b"*" => {
            Ok(Param::Field(FieldSpec::Name(name.clone())))
        },
        _ => Err(EffectorError::BadParameter("expected a single field reference".into())),
    }
}

fn missing(effector: &str) -> EffectorError {
    EffectorError::BadParameter(format!("{effector}: missing or mismatched parameter"))
}

// PASTE
// ================================================================================================

/// `paste` appends the current input byte to the selected field; `paste[..]` appends the
/// concatenation of its literal and field tokens.
pub(super) struct Paste;

impl<T: Target> Effector<T> for Paste {
    fn name(&self) -> &'static str {
        "paste"
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
            None => ctx.paste_byte()?,
            Some(Param::Plan(plan)) => ctx.paste_plan(plan)?,
            Some(_) => return Err(missing("paste")),
        }
        Ok(EffectFlags::NONE)
    }
}

// SELECT
// ================================================================================================

/// `select` selects the anonymous field; `select[~f]` selects a named field.
pub(super) struct Select;

impl<T: Target> Effector<T> for Select {
    fn name(&self) -> &'static str {
        "select"
    }

    fn compile_parameter(
        &self,
        tokens: &[Token],
        _scope: &ParameterScope<'_>,
    ) -> Result<Param, EffectorError> {
        compile_field_reference(tokens, false)
    }

    fn invoke(
        &mut self,
        _target: &mut T,
        ctx: &mut Transduction,
        parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        match parameter {
            None => ctx.select_anonymous(),
            Some(Param::Field(FieldSpec::Name(name))) => ctx.select_field(name)?,
            Some(_) => return Err(missing("select")),
        }
        Ok(EffectFlags::NONE)
    }
}

// COPY / CUT
// ================================================================================================

/// `copy[~f]` overwrites the selected field with a copy of `~f`.
pub(super) struct CopyField;

impl<T: Target> Effector<T> for CopyField {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn compile_parameter(
        &self,
        tokens: &[Token],
        _scope: &ParameterScope<'_>,
    ) -> Result<Param, EffectorError> {
        compile_field_reference(tokens, false)
    }

    fn invoke(
        &mut self,
        _target: &mut T,
        ctx: &mut Transduction,
        parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        match parameter {
            Some(Param::Field(FieldSpec::Name(name))) => ctx.copy_field(name, false)?,
            _ => return Err(missing("copy")),
        }
        Ok(EffectFlags::NONE)
    }
}

/// `cut[~f]` is `copy[~f]` followed by a clear of `~f`.
pub(super) struct Cut;

impl<T: Target> Effector<T> for Cut {
    fn name(&self) -> &'static str {
        "cut"
    }

    fn compile_parameter(
        &self,
        tokens: &[Token],
        _scope: &ParameterScope<'_>,
    ) -> Result<Param, EffectorError> {
        compile_field_reference(tokens, false)
    }

    fn invoke(
        &mut self,
        _target: &mut T,
        ctx: &mut Transduction,
        parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        match parameter {
            Some(Param::Field(FieldSpec::Name(name))) => ctx.copy_field(name, true)?,
            _ => return Err(missing("cut")),
        }
        Ok(EffectFlags::NONE)
    }
}

// CLEAR
// ================================================================================================

/// `clear` clears the selected field, `clear[~f]` a named field, `clear[~*]` all fields.
pub(super) struct Clear;

impl<T: Target> Effector<T> for Clear {
    fn name(&self) -> &'static str {
        "clear"
    }

    fn compile_parameter(
        &self,
        tokens: &[Token],
        _scope: &ParameterScope<'_>,
    ) -> Result<Param, EffectorError> {
        compile_field_reference(tokens, true)
    }

    fn invoke(
        &mut self,
        _target: &mut T,
        ctx: &mut Transduction,
        parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        match parameter {
            None => ctx.clear_selected()?,
            Some(Param::Field(FieldSpec::All)) => ctx.clear_all_fields()?,
            Some(Param::Field(FieldSpec::Name(name))) => ctx.clear_field(name)?,
            Some(_) => return Err(missing("clear")),
        }
        Ok(EffectFlags::NONE)
    }
}
