use smallvec::SmallVec;
use winter_utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable};

// EFFECT VECTOR
// ================================================================================================

/// The reserved id of the empty effect vector.
pub const EMPTY_EFFECT: u32 = 0;

/// One entry of an effect vector: an effector ordinal plus an optional index into that
/// effector's precompiled parameter table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EffectRef {
    pub effector: u16,
    pub parameter: Option<u32>,
}

impl EffectRef {
    /// Returns an unparameterized reference to `effector`.
    pub const fn plain(effector: u16) -> Self {
        EffectRef { effector, parameter: None }
    }

    /// Returns a reference to `effector` with parameter `index`.
    pub const fn with_parameter(effector: u16, index: u32) -> Self {
        EffectRef { effector, parameter: Some(index) }
    }
}

/// An ordered list of effector invocations attached to one transition.
///
/// Vectors are short in practice (the compiler lays them out from tape 2 of the source
/// automaton), so entries are stored inline up to four.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EffectVector(SmallVec<[EffectRef; 4]>);

impl EffectVector {
    /// Returns the empty vector.
    pub fn empty() -> Self {
        EffectVector(SmallVec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EffectRef> {
        self.0.iter()
    }

    pub fn entries(&self) -> &[EffectRef] {
        &self.0
    }
}

impl FromIterator<EffectRef> for EffectVector {
    fn from_iter<I: IntoIterator<Item = EffectRef>>(iter: I) -> Self {
        EffectVector(iter.into_iter().collect())
    }
}

impl From<&[EffectRef]> for EffectVector {
    fn from(entries: &[EffectRef]) -> Self {
        EffectVector(SmallVec::from_slice(entries))
    }
}

// SERIALIZATION
// ================================================================================================

impl Serializable for EffectVector {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        target.write_u16(self.0.len() as u16);
        for entry in &self.0 {
            target.write_u16(entry.effector);
            let parameter = entry.parameter.map_or(-1i32, |p| p as i32);
            target.write_u32(parameter as u32);
        }
    }
}

impl Deserializable for EffectVector {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        let len = source.read_u16()? as usize;
        let mut entries = SmallVec::with_capacity(len);
        for _ in 0..len {
            let effector = source.read_u16()?;
            let parameter = match source.read_u32()? as i32 {
                -1 => None,
                p if p >= 0 => Some(p as u32),
                p => {
                    return Err(DeserializationError::InvalidValue(format!(
                        "invalid parameter index {p}"
                    )));
                },
            };
            entries.push(EffectRef { effector, parameter });
        }
        Ok(EffectVector(entries))
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use winter_utils::{Deserializable, Serializable};

    use super::*;

    #[test]
    fn roundtrip() {
        let vector: EffectVector = [
            EffectRef::plain(crate::builtins::CLEAR),
            EffectRef::with_parameter(crate::builtins::PASTE, 3),
            EffectRef::plain(crate::builtins::STOP),
        ]
        .into_iter()
        .collect();
        let restored = EffectVector::read_from_bytes(&vector.to_bytes()).unwrap();
        assert_eq!(vector, restored);
    }

    #[test]
    fn empty_vector_roundtrips() {
        let vector = EffectVector::empty();
        let restored = EffectVector::read_from_bytes(&vector.to_bytes()).unwrap();
        assert!(restored.is_empty());
    }

}
