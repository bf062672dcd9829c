use alloc::vec::Vec;

use bytes::Bytes;

// INPUT FRAME
// ================================================================================================

/// One entry of the input stack: a byte buffer with a read cursor.
///
/// Primary frames arrive through [`Transductor::push`](crate::Transductor::push); the rest are
/// composed and pushed by the `in[..]` effector and are never retained by the mark set.
#[derive(Clone, Debug)]
pub(crate) struct InputFrame {
    data: Bytes,
    pos: usize,
    limit: usize,
    primary: bool,
}

impl InputFrame {
    #[inline(always)]
    pub fn next(&mut self) -> Option<u8> {
        if self.pos < self.limit {
            let byte = self.data[self.pos];
            self.pos += 1;
            Some(byte)
        } else {
            None
        }
    }

    /// Unread bytes, for the self-loop fast path.
    #[inline(always)]
    pub fn pending(&self) -> &[u8] {
        &self.data[self.pos..self.limit]
    }

    #[inline(always)]
    pub fn advance(&mut self, n: usize) {
        self.pos += n;
        debug_assert!(self.pos <= self.limit);
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.pos
    }
}

// MARK SET
// ================================================================================================

/// The primary frames retained for replay between `mark` and the release of the mark.
///
/// Frames join the set in stream order: index 0 is the marked frame (replay resumes at
/// `mark_pos` inside it), later entries are the primary frames pushed while the mark was
/// armed. Retention is by reference count: the set holds a `Bytes` clone of each frame, so
/// caller buffers stay alive however the stack itself churns.
#[derive(Debug, Default)]
struct MarkSet {
    armed: bool,
    frames: Vec<MarkedFrame>,
    mark_pos: usize,
    resetting: bool,
}

#[derive(Debug)]
struct MarkedFrame {
    data: Bytes,
    limit: usize,
}

impl MarkSet {
    fn release(&mut self) {
        self.armed = false;
        self.resetting = false;
        self.frames.clear();
        self.mark_pos = 0;
    }

    fn holds(&self, frame: &InputFrame) -> bool {
        self.frames.iter().any(|m| m.data.as_ptr() == frame.data.as_ptr())
    }

    fn is_last(&self, frame: &InputFrame) -> bool {
        self.frames.last().is_some_and(|m| m.data.as_ptr() == frame.data.as_ptr())
    }
}

// INPUT STACK
// ================================================================================================

/// The LIFO of input frames, with the mark set that retains primary buffers across resets.
#[derive(Debug, Default)]
pub(crate) struct InputStack {
    frames: Vec<InputFrame>,
    marks: MarkSet,
    warned_runaway: bool,
    /// Bytes retained by the mark set since the last metrics drain.
    pub(crate) marked_bytes: u64,
}

impl InputStack {
    /// True when no unread bytes remain; exhausted frames awaiting retirement don't count.
    pub fn is_empty(&self) -> bool {
        self.frames.iter().all(|f| f.remaining() == 0)
    }

    /// Total unread bytes across all frames.
    pub fn remaining(&self) -> usize {
        self.frames.iter().map(InputFrame::remaining).sum()
    }

    /// Appends a primary frame; while the mark is armed the buffer joins the mark set.
    pub fn push_primary(&mut self, data: Bytes, limit: usize) {
        let limit = limit.min(data.len());
        if self.marks.armed {
            self.marks.frames.push(MarkedFrame { data: data.clone(), limit });
            self.marked_bytes += limit as u64;
        }
        self.frames.push(InputFrame { data, pos: 0, limit, primary: true });
    }

    /// Appends a frame composed by an effector.
    pub fn push_injected(&mut self, data: Bytes) {
        let limit = data.len();
        self.frames.push(InputFrame { data, pos: 0, limit, primary: false });
    }

    /// Pops the next byte, discarding exhausted frames.
    #[inline]
    pub fn next(&mut self) -> Option<u8> {
        loop {
            let frame = self.frames.last_mut()?;
            if let Some(byte) = frame.next() {
                return Some(byte);
            }
            let frame = self.frames.pop().expect("frame observed above");
            self.retire(frame);
        }
    }

    /// Returns the top frame for bulk access, skipping any exhausted frames first.
    pub fn top_mut(&mut self) -> Option<&mut InputFrame> {
        while self.frames.last().is_some_and(|f| f.remaining() == 0) {
            let frame = self.frames.pop().expect("frame observed above");
            self.retire(frame);
        }
        self.frames.last_mut()
    }

    fn retire(&mut self, frame: InputFrame) {
        if !frame.primary {
            return;
        }
        if self.marks.resetting && self.marks.is_last(&frame) {
            // replay has run past the mark point; retention is over
            self.marks.release();
            return;
        }
        if self.marks.armed
            && !self.marks.resetting
            && !self.marks.frames.is_empty()
            && !self.warned_runaway
        {
            self.warned_runaway = true;
            tracing::warn!(
                retained = self.marks.frames.len(),
                "primary input buffer consumed while the mark set is non-empty; \
                 a runaway mark retains every buffer pushed until reset"
            );
        }
    }

    // MARK AND RESET
    // --------------------------------------------------------------------------------------------

    /// Arms the mark at the current position of the topmost primary frame. Re-arming releases
    /// the previous retention.
    pub fn mark(&mut self) {
        self.marks.release();
        self.marks.armed = true;
        if let Some(frame) = self.frames.iter().rev().find(|f| f.primary) {
            self.marks.frames.push(MarkedFrame { data: frame.data.clone(), limit: frame.limit });
            self.marks.mark_pos = frame.pos;
            self.marked_bytes += (frame.limit - frame.pos) as u64;
        }
    }

    /// Rewinds the input to the mark point, rebuilding the stack from the mark set.
    ///
    /// Frames pushed after the mark (and any effector-pushed frames above the marked one) are
    /// discarded from the stack; marked frames stay in the set and replay in stream order.
    /// Returns false if no mark is armed.
    pub fn reset(&mut self) -> bool {
        if !self.marks.armed || self.marks.frames.is_empty() {
            return false;
        }
        // cut at the lowest frame that postdates the mark
        let cut = self
            .frames
            .iter()
            .position(|f| self.marks.holds(f))
            .or_else(|| self.frames.iter().position(|f| !f.primary))
            .unwrap_or(self.frames.len());
        self.frames.truncate(cut);
        for (index, marked) in self.marks.frames.iter().enumerate().rev() {
            self.frames.push(InputFrame {
                data: marked.data.clone(),
                pos: if index == 0 { self.marks.mark_pos } else { 0 },
                limit: marked.limit,
                primary: true,
            });
        }
        self.marks.resetting = true;
        true
    }

    /// Drops the retention; called on `stop()`, on re-mark, and when the primary stream ends.
    pub fn release_marks(&mut self) {
        self.marks.release();
    }

    pub fn marks_active(&self) -> bool {
        self.marks.armed
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.marks.release();
    }
}

// TESTS
// ================================================================================================
