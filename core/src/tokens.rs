use alloc::{string::ToString, vec::Vec};
use core::fmt;

use winter_utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable};

// TOKEN
// ================================================================================================

/// First byte marking a field reference in the decorated textual form.
pub const FIELD_SIGIL: u8 = b'~';
/// First byte marking a signal reference in the decorated textual form.
pub const SIGNAL_SIGIL: u8 = b'!';
/// First byte marking a transducer reference in the decorated textual form.
pub const TRANSDUCER_SIGIL: u8 = b'@';
/// Escape prefix for literals whose first byte collides with a sigil; stripped on decode.
pub const ESCAPE: u8 = 0xF8;

/// One parameter token, as handed to an effector's proxy at model bind time.
///
/// Tokens are the atoms of effector parameters: a `paste['-: ' ~date]` reference compiles from
/// the literal token `-: ` and the field token `date`. Reference tokens carry the referenced
/// name; resolution to ordinals happens when the owning effector compiles the parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    /// A raw byte sequence.
    Literal(Vec<u8>),
    /// A reference to a named field (`~name`); the empty name is the anonymous field.
    Field(Vec<u8>),
    /// A reference to a named signal (`!name`).
    Signal(Vec<u8>),
    /// A reference to a named transducer (`@name`).
    Transducer(Vec<u8>),
}

impl Token {
    /// Decodes a token from its decorated form.
    ///
    /// A leading sigil selects the reference variant and is stripped; a leading [`ESCAPE`]
    /// byte is stripped and forces the literal variant. Anything else is a literal as-is.
    /// Decoding and [`Self::encode`] are mutually inverse.
    pub fn decode(raw: &[u8]) -> Token {
        match raw.first() {
            Some(&FIELD_SIGIL) => Token::Field(raw[1..].to_vec()),
            Some(&SIGNAL_SIGIL) => Token::Signal(raw[1..].to_vec()),
            Some(&TRANSDUCER_SIGIL) => Token::Transducer(raw[1..].to_vec()),
            Some(&ESCAPE) => Token::Literal(raw[1..].to_vec()),
            _ => Token::Literal(raw.to_vec()),
        }
    }

    /// Encodes this token into its decorated form.
    pub fn encode(&self) -> Vec<u8> {
        let (sigil, name) = match self {
            Token::Literal(bytes) => {
                let mut out = Vec::with_capacity(bytes.len() + 1);
                if matches!(
                    bytes.first(),
                    Some(&FIELD_SIGIL | &SIGNAL_SIGIL | &TRANSDUCER_SIGIL | &ESCAPE)
                ) {
                    out.push(ESCAPE);
                }
                out.extend_from_slice(bytes);
                return out;
            },
            Token::Field(name) => (FIELD_SIGIL, name),
            Token::Signal(name) => (SIGNAL_SIGIL, name),
            Token::Transducer(name) => (TRANSDUCER_SIGIL, name),
        };
        let mut out = Vec::with_capacity(name.len() + 1);
        out.push(sigil);
        out.extend_from_slice(name);
        out
    }

    /// Returns the referenced name or literal bytes, undecorated.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Token::Literal(bytes)
            | Token::Field(bytes)
            | Token::Signal(bytes)
            | Token::Transducer(bytes) => bytes,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Token::Literal(_) => 0,
            Token::Field(_) => 1,
            Token::Signal(_) => 2,
            Token::Transducer(_) => 3,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chunk in self.encode() {
            if chunk.is_ascii_graphic() || chunk == b' ' {
                write!(f, "{}", chunk as char)?;
            } else {
                write!(f, "\\x{chunk:02x}")?;
            }
        }
        Ok(())
    }
}

// SERIALIZATION
// ================================================================================================

impl Serializable for Token {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        target.write_u8(self.tag());
        let bytes = self.bytes();
        target.write_u16(bytes.len() as u16);
        target.write_bytes(bytes);
    }
}

impl Deserializable for Token {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        let tag = source.read_u8()?;
        let len = source.read_u16()? as usize;
        let bytes = source.read_vec(len)?;
        match tag {
            0 => Ok(Token::Literal(bytes)),
            1 => Ok(Token::Field(bytes)),
            2 => Ok(Token::Signal(bytes)),
            3 => Ok(Token::Transducer(bytes)),
            _ => Err(DeserializationError::InvalidValue(format!("invalid token tag {tag}"))),
        }
    }
}

// TESTS
// ================================================================================================
