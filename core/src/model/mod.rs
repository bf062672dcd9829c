//! The immutable model container and its binary format.
//!
//! A model file is produced offline by the pattern compiler (or programmatically by
//! [`ModelBuilder`], which writes the identical format) and loaded read-only at runtime. The
//! layout is little-endian: magic and format version, a free-form version note, the target
//! class identifier, the signal and effector name tables, the transducer table, the parameter
//! token blob, and a BLAKE3 trailer over everything that precedes it.

use alloc::{
    string::{String, ToString},
    vec::Vec,
};

use winter_utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable, SliceReader};

use crate::{ModelError, SignalTable, Token, Transducer, builtins};

mod builder;
pub use builder::{ModelBuilder, TransducerBuilder};


// CONSTANTS
// ================================================================================================

/// Leading magic bytes of a model file.
pub const MAGIC: [u8; 7] = *b"RIBOSE\0";

/// The model format version this runtime reads and writes.
pub const FORMAT_VERSION: u32 = 1;

/// Free-form version note stamped into models built by this crate.
const VERSION_NOTE: &str = concat!("ribose-rs ", env!("CARGO_PKG_VERSION"));

// MODEL
// ================================================================================================

/// An immutable container of compiled transducers and the tables they reference.
///
/// A model binds to a live target by name: the runtime refuses to attach a target whose class
/// name differs from [`Self::target_name`]. All tables are read-only after load; a model is
/// shared across transductors without locking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Model {
    target_name: String,
    version_note: String,
    signals: SignalTable,
    effectors: Vec<String>,
    transducers: Vec<Transducer>,
    parameters: Vec<Vec<Vec<Token>>>,
}

impl Model {
    // ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the target class identifier this model was compiled against.
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Returns the version note recorded by the compiler that produced this model.
    pub fn version_note(&self) -> &str {
        &self.version_note
    }

    pub fn signals(&self) -> &SignalTable {
        &self.signals
    }

    /// Returns the effector name table; ordinals are table indices.
    pub fn effector_names(&self) -> &[String] {
        &self.effectors
    }

    pub fn effector_ordinal(&self, name: &str) -> Option<u16> {
        self.effectors.iter().position(|n| n == name).map(|i| i as u16)
    }

    pub fn transducer_count(&self) -> usize {
        self.transducers.len()
    }

    /// Returns the transducer with the given ordinal.
    ///
    /// Ordinals must originate from this model (via [`Self::transducer_ordinal`] or a compiled
    /// `@name` parameter); they are not range-checked here.
    pub fn transducer(&self, ordinal: u32) -> &Transducer {
        &self.transducers[ordinal as usize]
    }

    pub fn transducer_ordinal(&self, name: &str) -> Option<u32> {
        self.transducers.iter().position(|t| t.name() == name).map(|i| i as u32)
    }

    /// Returns the raw parameter token lists of the given effector, indexed by parameter index.
    pub fn parameters(&self, effector: u16) -> &[Vec<Token>] {
        &self.parameters[effector as usize]
    }

    // SERIALIZATION
    // --------------------------------------------------------------------------------------------

    /// Serializes this model into the file format, checksum trailer included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        self.write_body(&mut body);
        let digest = blake3::hash(&body);
        body.extend_from_slice(digest.as_bytes());
        body
    }

    /// Parses a model from file bytes, verifying magic, version and checksum before any table
    /// is interpreted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        const TRAILER: usize = 32;
        if bytes.len() < MAGIC.len() + TRAILER {
            return Err(ModelError::BadMagic);
        }
        let (body, trailer) = bytes.split_at(bytes.len() - TRAILER);
        if !bytes.starts_with(&MAGIC) {
            return Err(ModelError::BadMagic);
        }
        if blake3::hash(body).as_bytes() != trailer {
            return Err(ModelError::ChecksumMismatch);
        }

        let mut source = SliceReader::new(&body[MAGIC.len()..]);
        let format_version = source.read_u32()?;
        if format_version != FORMAT_VERSION {
            return Err(ModelError::UnsupportedVersion(format_version));
        }
        let version_note = read_string(&mut source)?;
        let target_name = read_string(&mut source)?;
        let signals = SignalTable::read_from(&mut source)?;

        let effector_count = source.read_u16()? as usize;
        let mut effectors = Vec::with_capacity(effector_count);
        for _ in 0..effector_count {
            effectors.push(read_string(&mut source)?);
        }

        let transducer_count = source.read_u32()? as usize;
        let mut transducers = Vec::with_capacity(transducer_count);
        for _ in 0..transducer_count {
            transducers.push(Transducer::read_from(&mut source)?);
        }

        let mut parameters = Vec::with_capacity(effector_count);
        for _ in 0..effector_count {
            let list_count = source.read_u32()? as usize;
            let mut lists = Vec::with_capacity(list_count);
            for _ in 0..list_count {
                let token_count = source.read_u16()? as usize;
                let mut tokens = Vec::with_capacity(token_count);
                for _ in 0..token_count {
                    tokens.push(Token::read_from(&mut source)?);
                }
                lists.push(tokens);
            }
            parameters.push(lists);
        }

        let model =
            Model { target_name, version_note, signals, effectors, transducers, parameters };
        model.validate()?;
        Ok(model)
    }

    fn write_body<W: ByteWriter>(&self, target: &mut W) {
        target.write_bytes(&MAGIC);
        target.write_u32(FORMAT_VERSION);
        write_string(target, &self.version_note);
        write_string(target, &self.target_name);
        self.signals.write_into(target);

        target.write_u16(self.effectors.len() as u16);
        for name in &self.effectors {
            write_string(target, name);
        }

        target.write_u32(self.transducers.len() as u32);
        for transducer in &self.transducers {
            transducer.write_into(target);
        }

        for lists in &self.parameters {
            target.write_u32(lists.len() as u32);
            for tokens in lists {
                target.write_u16(tokens.len() as u16);
                for token in tokens {
                    token.write_into(target);
                }
            }
        }
    }

    // FILE I/O
    // --------------------------------------------------------------------------------------------

    /// Reads and verifies a model file.
    #[cfg(feature = "std")]
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Writes this model to a file in the binary format.
    #[cfg(feature = "std")]
    pub fn store(&self, path: impl AsRef<std::path::Path>) -> Result<(), ModelError> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    // VALIDATION
    // --------------------------------------------------------------------------------------------

    fn validate(&self) -> Result<(), ModelError> {
        if self.effectors.len() < builtins::NAMES.len()
            || self.effectors.iter().zip(builtins::NAMES.iter()).any(|(a, b)| a != b)
        {
            return Err(ModelError::BadEffectorTable);
        }
        for (i, transducer) in self.transducers.iter().enumerate() {
            if self.transducers[..i].iter().any(|t| t.name() == transducer.name()) {
                return Err(ModelError::DuplicateTransducer(transducer.name().to_string()));
            }
            let invalid = |reason: String| ModelError::InvalidTransducer {
                transducer: transducer.name().to_string(),
                reason,
            };
            if transducer.input_count() != 256 + self.signals.len() {
                return Err(invalid(format!(
                    "equivalence map covers {} inputs, model alphabet has {}",
                    transducer.input_count(),
                    256 + self.signals.len()
                )));
            }
            for id in 0..transducer.effect_count() {
                for entry in transducer.effect(id as u32).iter() {
                    if entry.effector as usize >= self.effectors.len() {
                        return Err(invalid(format!(
                            "effect vector {id} references unknown effector {}",
                            entry.effector
                        )));
                    }
                    if let Some(parameter) = entry.parameter {
                        if parameter as usize >= self.parameters[entry.effector as usize].len() {
                            return Err(invalid(format!(
                                "effect vector {id} references parameter {parameter} of {}",
                                self.effectors[entry.effector as usize]
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

// HELPERS
// ================================================================================================

fn write_string<W: ByteWriter>(target: &mut W, value: &str) {
    target.write_u16(value.len() as u16);
    target.write_bytes(value.as_bytes());
}

fn read_string<R: ByteReader>(source: &mut R) -> Result<String, DeserializationError> {
    let len = source.read_u16()? as usize;
    String::from_utf8(source.read_vec(len)?)
        .map_err(|_| DeserializationError::InvalidValue("string is not UTF-8".to_string()))
}
