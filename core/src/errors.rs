use alloc::string::String;

use winter_utils::DeserializationError;

// MODEL ERROR
// ================================================================================================

/// Errors raised while loading, validating, or assembling a model.
///
/// All of these are fatal to the load: a model that fails any check is not installable.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("not a ribose model file (bad magic)")]
    BadMagic,
    #[error("unsupported model format version {0}")]
    UnsupportedVersion(u32),
    #[error("model checksum mismatch")]
    ChecksumMismatch,
    #[error("malformed model file")]
    Deserialization(#[from] DeserializationError),
    #[error("signal table must begin with the reserved signals nul, nil, eol, eos")]
    MissingReservedSignals,
    #[error("effector table must begin with the built-in effector set")]
    BadEffectorTable,
    #[error("duplicate transducer name '{0}'")]
    DuplicateTransducer(String),
    #[error("transducer '{transducer}': {reason}")]
    InvalidTransducer { transducer: String, reason: String },
    #[cfg(feature = "std")]
    #[error("failed to read model file")]
    Io(#[from] std::io::Error),
}
