use alloc::{boxed::Box, vec::Vec};

use crate::effectors::Effector;

// TARGET
// ================================================================================================

/// A transduction target: the receiver of effector side effects.
///
/// A target names its class and supplies its custom effector instances; the built-in effector
/// set is always present. One instance plays the proxy role at [`Runtime`](crate::Runtime)
/// construction (its effectors compile the model's parameters and the instance is discarded);
/// a fresh instance backs every live transductor.
pub trait Target {
    /// The target class name, matched against the model's target class identifier.
    fn name(&self) -> &str;

    /// Returns the target's effector instances, in any order. Instances are bound to the
    /// model's effector table by name.
    fn effectors(&mut self) -> Vec<Box<dyn Effector<Self>>>
    where
        Self: Sized,
    {
        Vec::new()
    }
}

/// The trivial target for models that use only the built-in effector set.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicTarget;

impl Target for BasicTarget {
    fn name(&self) -> &str {
        "base"
    }
}
