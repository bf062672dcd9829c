use alloc::{
    boxed::Box,
    string::{String, ToString},
    sync::Arc,
    vec::Vec,
};
use core::marker::PhantomData;

use ribose_core::Model;
use tracing::instrument;

use crate::{
    Target, TransductionError,
    effectors::{Effector, Param, ParameterScope, builtin_effectors},
    transductor::{Status, Transductor},
};

// COMPILED PARAMETERS
// ================================================================================================

/// The shared table of compiled effector parameters, indexed by model effector ordinal and
/// parameter index. Built once per runtime by the proxy pass; borrowed read-only by every live
/// transductor.
#[derive(Default)]
pub(crate) struct CompiledParameters {
    by_effector: Vec<Vec<Param>>,
}

impl CompiledParameters {
    #[inline(always)]
    pub(crate) fn parameter(&self, effector: u16, index: u32) -> &Param {
        &self.by_effector[effector as usize][index as usize]
    }
}

// RUNTIME
// ================================================================================================

/// A model bound to a target class, ready to mint transductors.
///
/// Construction runs the proxy phase of the binding protocol: a throwaway target instance
/// supplies effectors, every parameter token list in the model is compiled through them on a
/// proxy transductor, and the instance is discarded. Live transductors borrow the resulting
/// table, so a model's parameters are compiled exactly once however many transductors run.
pub struct Runtime<T: Target> {
    model: Arc<Model>,
    parameters: Arc<CompiledParameters>,
    _target: PhantomData<fn() -> T>,
}

impl<T: Target> Runtime<T> {
    /// Binds `model` to the target class, compiling its parameters through `proxy`'s
    /// effectors. Fails on a target class mismatch, an effector the target does not supply,
    /// or any parameter that does not compile.
    #[instrument(skip_all)]
    pub fn new(model: impl Into<Arc<Model>>, mut proxy: T) -> Result<Self, TransductionError> {
        let model: Arc<Model> = model.into();
        verify_target(&model, &proxy)?;
        let effectors = bind_effectors(&model, &mut proxy)?;
        let host = Transductor::proxy(proxy, effectors, model.clone());
        let parameters = Arc::new(host.compile_parameters()?);
        tracing::debug!(
            target_class = model.target_name(),
            transducers = model.transducer_count(),
            "model bound"
        );
        Ok(Runtime { model, parameters, _target: PhantomData })
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Mints a live transductor bound to `target`.
    pub fn transductor(&self, mut target: T) -> Result<Transductor<T>, TransductionError> {
        verify_target(&self.model, &target)?;
        let effectors = bind_effectors(&self.model, &mut target)?;
        Ok(Transductor::live(target, effectors, self.parameters.clone(), self.model.clone()))
    }
}

// BINDING
// ================================================================================================

fn verify_target<T: Target>(model: &Model, target: &T) -> Result<(), TransductionError> {
    if model.target_name() != target.name() {
        return Err(TransductionError::TargetMismatch {
            expected: model.target_name().to_string(),
            found: target.name().to_string(),
        });
    }
    Ok(())
}

/// Resolves the model's effector table: built-ins first at their fixed ordinals, then the
/// target's effectors looked up by name.
fn bind_effectors<T: Target>(
    model: &Model,
    target: &mut T,
) -> Result<Vec<Box<dyn Effector<T>>>, TransductionError> {
    let mut supplied = target.effectors();
    let mut bound = builtin_effectors::<T>();
    for name in &model.effector_names()[bound.len()..] {
        let index = supplied
            .iter()
            .position(|e| e.name() == name)
            .ok_or_else(|| TransductionError::EffectorNotFound(String::clone(name)))?;
        bound.push(supplied.swap_remove(index));
    }
    Ok(bound)
}

// PROXY COMPILATION
// ================================================================================================

impl<T: Target> Transductor<T> {
    /// Compiles every parameter token list in the model through this proxy's effectors.
    pub(crate) fn compile_parameters(&self) -> Result<CompiledParameters, TransductionError> {
        debug_assert_eq!(self.status(), Status::Proxy);
        let model = self.model().clone();
        let scope = ParameterScope::new(&model);
        let mut by_effector = Vec::with_capacity(model.effector_names().len());
        for (ordinal, effector) in self.effectors().iter().enumerate() {
            let lists = model.parameters(ordinal as u16);
            let mut compiled = Vec::with_capacity(lists.len());
            for (index, tokens) in lists.iter().enumerate() {
                let param = effector.compile_parameter(tokens, &scope).map_err(|source| {
                    TransductionError::ParameterCompile {
                        effector: model.effector_names()[ordinal].clone(),
                        index: index as u32,
                        source,
                    }
                })?;
                compiled.push(param);
            }
            by_effector.push(compiled);
        }
        Ok(CompiledParameters { by_effector })
    }
}
