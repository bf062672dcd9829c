use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use core::fmt;

use winter_utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable};

// SIGNAL
// ================================================================================================

/// An out-of-band input ordinal.
///
/// Signals share the input alphabet with bytes: ordinals `0..=255` are bytes, and every signal
/// occupies an ordinal `>= 256` assigned by its model's signal table. The first four ordinals
/// above the byte range are reserved and carry fixed meanings for every model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signal(u16);

impl Signal {
    /// Injected by the engine when the kernel matrix carries no transition for the current
    /// input, giving the transducer a chance to recover from the domain error.
    pub const NUL: Signal = Signal(256);
    /// The conventional prologue signal; a no-op input transducers use to run entry effects.
    pub const NIL: Signal = Signal(257);
    /// End of line.
    pub const EOL: Signal = Signal(258);
    /// End of stream; raised by the engine when the input stack runs dry.
    pub const EOS: Signal = Signal(259);

    /// The ordinal of the first signal; ordinals below this are input bytes.
    pub const BASE: u32 = 256;

    /// Returns the signal with the given ordinal, or `None` if the ordinal falls inside the
    /// byte range.
    pub const fn from_ordinal(ordinal: u32) -> Option<Signal> {
        if ordinal >= Self::BASE && ordinal <= u16::MAX as u32 {
            Some(Signal(ordinal as u16))
        } else {
            None
        }
    }

    /// Returns this signal's input ordinal.
    pub const fn ordinal(&self) -> u32 {
        self.0 as u32
    }

    /// Returns true for the four reserved signals present in every model.
    pub const fn is_reserved(&self) -> bool {
        self.0 < Self::BASE as u16 + SignalTable::RESERVED.len() as u16
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!{}", self.0)
    }
}

// SIGNAL TABLE
// ================================================================================================

/// The ordered signal name table of a model.
///
/// Ordinals are assigned in table order starting at [`Signal::BASE`]. Loading fails unless the
/// table begins with the reserved names `nul`, `nil`, `eol`, `eos`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalTable {
    names: Vec<String>,
}

impl SignalTable {
    /// Names of the reserved signals, in ordinal order.
    pub const RESERVED: [&'static str; 4] = ["nul", "nil", "eol", "eos"];

    /// Returns a table containing only the reserved signals.
    pub fn new() -> Self {
        SignalTable {
            names: Self::RESERVED.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Appends a signal name and returns its assigned signal.
    ///
    /// Re-adding a known name returns the existing assignment.
    pub fn define(&mut self, name: &str) -> Signal {
        if let Some(sig) = self.get(name) {
            return sig;
        }
        self.names.push(name.to_string());
        Signal((Signal::BASE as usize + self.names.len() - 1) as u16)
    }

    /// Returns the signal bound to `name`, if any.
    pub fn get(&self, name: &str) -> Option<Signal> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| Signal((Signal::BASE as usize + i) as u16))
    }

    /// Returns the name bound to `signal`, if it belongs to this table.
    pub fn name(&self, signal: Signal) -> Option<&str> {
        self.names
            .get((signal.ordinal() - Signal::BASE) as usize)
            .map(String::as_str)
    }

    /// Returns the number of signals in the table, reserved signals included.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false; the reserved signals are ever-present.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns true if `ordinal` is a byte or a signal this table defines.
    pub fn contains_ordinal(&self, ordinal: u32) -> bool {
        (ordinal as usize) < 256 + self.names.len()
    }

    /// Iterates over `(signal, name)` pairs in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = (Signal, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (Signal((Signal::BASE as usize + i) as u16), n.as_str()))
    }

    fn starts_with_reserved(&self) -> bool {
        self.names.len() >= Self::RESERVED.len()
            && self.names.iter().zip(Self::RESERVED.iter()).all(|(a, b)| a == b)
    }
}

impl Default for SignalTable {
    fn default() -> Self {
        Self::new()
    }
}

// SERIALIZATION
// ================================================================================================

impl Serializable for SignalTable {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        target.write_u16(self.names.len() as u16);
        for name in &self.names {
            target.write_u16(name.len() as u16);
            target.write_bytes(name.as_bytes());
        }
    }
}

impl Deserializable for SignalTable {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        let count = source.read_u16()? as usize;
        let mut names = Vec::with_capacity(count);
        for _ in 0..count {
            let len = source.read_u16()? as usize;
            let bytes = source.read_vec(len)?;
            let name = String::from_utf8(bytes).map_err(|_| {
                DeserializationError::InvalidValue("signal name is not UTF-8".to_string())
            })?;
            names.push(name);
        }
        let table = SignalTable { names };
        if !table.starts_with_reserved() {
            return Err(DeserializationError::InvalidValue(
                "signal table does not begin with the reserved signals".to_string(),
            ));
        }
        Ok(table)
    }
}

// TESTS
// ================================================================================================
