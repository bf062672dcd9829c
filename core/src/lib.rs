#![no_std]

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod effect;
mod errors;
mod signals;
mod tokens;
mod transducer;

pub mod model;

// RE-EXPORTS
// ================================================================================================

pub use effect::{EMPTY_EFFECT, EffectRef, EffectVector};
pub use errors::ModelError;
pub use model::{Model, ModelBuilder, TransducerBuilder};
pub use signals::{Signal, SignalTable};
pub use tokens::Token;
pub use transducer::{Cell, NO_STATE, Run, Transducer};

pub mod serde {
    //! Binary (de)serialization primitives, re-exported from winter-utils.
    pub use winter_utils::{
        ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable, SliceReader,
    };
}

// BUILT-IN EFFECTOR ABI
// ================================================================================================

/// Ordinals and names of the built-in effector set.
///
/// These ordinals are part of the versioned model ABI: every model's effector table must list
/// the built-in effectors first, in this order, before any target-supplied effectors. The
/// runtime refuses to bind a model whose table violates this.
pub mod builtins {
    pub const NUL: u16 = 0;
    pub const NIL: u16 = 1;
    pub const PASTE: u16 = 2;
    pub const SELECT: u16 = 3;
    pub const COPY: u16 = 4;
    pub const CUT: u16 = 5;
    pub const CLEAR: u16 = 6;
    pub const COUNT: u16 = 7;
    pub const SIGNAL: u16 = 8;
    pub const IN: u16 = 9;
    pub const OUT: u16 = 10;
    pub const MARK: u16 = 11;
    pub const RESET: u16 = 12;
    pub const START: u16 = 13;
    pub const PAUSE: u16 = 14;
    pub const STOP: u16 = 15;

    /// Built-in effector names, indexed by ordinal.
    pub const NAMES: [&str; 16] = [
        "nul", "nil", "paste", "select", "copy", "cut", "clear", "count", "signal", "in", "out",
        "mark", "reset", "start", "pause", "stop",
    ];
}
