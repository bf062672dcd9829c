use alloc::string::String;

// TRANSDUCTION ERROR
// ================================================================================================

/// Errors surfaced by transductor operations.
///
/// Recoverable domain errors never appear here; they are absorbed by nul injection inside the
/// dispatch loop and only counted. Everything below leaves the engine state inspectable, and
/// only [`Transductor::stop`](crate::Transductor::stop) guarantees a clean slate afterwards.
#[derive(Debug, thiserror::Error)]
pub enum TransductionError {
    #[error(
        "no transition for input {input} from state {state} of '{transducer}', and nul recovery failed"
    )]
    DomainErrorUnrecoverable { transducer: String, state: u32, input: u32 },
    #[error("transducer '{0}' is not in the model")]
    TransducerNotFound(String),
    #[error("effector '{0}' is neither built in nor supplied by the target")]
    EffectorNotFound(String),
    #[error("model was compiled for target class '{expected}', not '{found}'")]
    TargetMismatch { expected: String, found: String },
    #[error("'{0}' is not available on a proxy transductor")]
    ProxyMisuse(&'static str),
    #[error("input ordinal {0} is outside the model's signal range")]
    SignalOutOfRange(u32),
    #[error("effector '{effector}' failed")]
    Effector {
        effector: &'static str,
        #[source]
        source: EffectorError,
    },
    #[error("compiling parameter {index} of effector '{effector}' failed")]
    ParameterCompile {
        effector: String,
        index: u32,
        #[source]
        source: EffectorError,
    },
}

// EFFECTOR ERROR
// ================================================================================================

/// Failures raised inside effector invocations and parameter compilation.
///
/// Context-free by design; the dispatch loop wraps these with the failing effector's identity
/// at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum EffectorError {
    #[error("no output sink is installed")]
    NoOutputSink,
    #[error("effector does not accept parameters")]
    NotParameterized,
    #[error("bad parameter: {0}")]
    BadParameter(String),
    #[error("field '{0}' is not defined by the running transducer")]
    FieldNotFound(String),
    #[cfg(feature = "std")]
    #[error("output sink I/O failure")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Failure(String),
}

impl EffectorError {
    /// A free-form failure, for target-supplied effectors.
    pub fn failure(message: impl Into<String>) -> Self {
        EffectorError::Failure(message.into())
    }
}
