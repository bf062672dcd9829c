// METRICS
// ================================================================================================

/// Per-run transduction counters.
///
/// Counters accumulate across [`run`](crate::Transductor::run) calls until drained into an
/// accumulator with [`metrics`](crate::Transductor::metrics).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Input bytes consumed, fast-scanned bytes included. Signals are not counted.
    pub bytes: u64,
    /// Recoverable domain errors (nul injections).
    pub errors: u64,
    /// Bytes consumed on the self-loop fast path (a subset of `bytes`).
    pub scanned: u64,
    /// Bytes retained by the mark set.
    pub marked: u64,
}

impl Metrics {
    /// Folds `other` into this accumulator.
    pub fn absorb(&mut self, other: Metrics) {
        self.bytes += other.bytes;
        self.errors += other.errors;
        self.scanned += other.scanned;
        self.marked += other.marked;
    }

    /// Zeroes every counter.
    pub fn clear(&mut self) {
        *self = Metrics::default();
    }
}
