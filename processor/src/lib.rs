#![no_std]

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod errors;
mod input;
mod metrics;
mod output;
mod runtime;
mod stack;
mod target;
mod transductor;

pub mod effectors;

#[cfg(test)]
mod tests;

// RE-EXPORTS
// ================================================================================================

pub use errors::{EffectorError, TransductionError};
pub use metrics::Metrics;
pub use output::OutputSink;
#[cfg(feature = "std")]
pub use output::IoSink;
pub use ribose_core::{
    EffectRef, Model, ModelBuilder, ModelError, Signal, Token, TransducerBuilder, builtins,
};
pub use runtime::Runtime;
pub use target::{BasicTarget, Target};
pub use transductor::{Status, Transduction, Transductor};

pub use bytes::{Bytes, BytesMut};
