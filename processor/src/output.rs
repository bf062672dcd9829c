use alloc::vec::Vec;

use crate::EffectorError;

// OUTPUT SINK
// ================================================================================================

/// The byte sink the `out[..]` effector writes to.
///
/// The engine issues one `write` per `out[..]` invocation with the full concatenation and
/// never flushes or closes; buffering is the caller's concern. There is no default sink:
/// running a model that emits output without installing one is an effector failure.
pub trait OutputSink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), EffectorError>;
}

impl OutputSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), EffectorError> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Adapts any [`std::io::Write`] into an [`OutputSink`].
#[cfg(feature = "std")]
pub struct IoSink<W: std::io::Write> {
    inner: W,
}

#[cfg(feature = "std")]
impl<W: std::io::Write> IoSink<W> {
    pub fn new(inner: W) -> Self {
        IoSink { inner }
    }

    /// Releases the wrapped writer, e.g. to flush it.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(feature = "std")]
impl<W: std::io::Write> OutputSink for IoSink<W> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), EffectorError> {
        self.inner.write_all(bytes)?;
        Ok(())
    }
}
