use alloc::vec::Vec;

use ribose_core::Signal;

// TRANSDUCER FRAME
// ================================================================================================

/// An armed counter: decremented by the zero-arg `count` effector, queuing `signal` when
/// `remaining` reaches zero.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Counter {
    pub remaining: u64,
    pub signal: Signal,
}

/// One entry of the transducer stack.
///
/// Field storage is owned by the frame and created fresh on every push; popping a frame drops
/// its fields, and a later re-push of the same transducer starts clean.
#[derive(Debug)]
pub(crate) struct TransducerFrame {
    pub ordinal: u32,
    pub state: u32,
    pub counter: Option<Counter>,
    pub selected: u32,
    fields: Vec<Vec<u8>>,
}

impl TransducerFrame {
    fn new(ordinal: u32, state: u32, field_count: usize) -> Self {
        TransducerFrame {
            ordinal,
            state,
            counter: None,
            selected: 0,
            fields: vec![Vec::new(); field_count],
        }
    }

    pub fn field(&self, ordinal: u32) -> &[u8] {
        &self.fields[ordinal as usize]
    }

    pub fn field_mut(&mut self, ordinal: u32) -> &mut Vec<u8> {
        &mut self.fields[ordinal as usize]
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Overwrites field `dst` with the contents of field `src`; clears `src` when `take` is
    /// set. A self-copy is the identity (and a self-cut just clears).
    pub fn transfer_field(&mut self, src: u32, dst: u32, take: bool) {
        let (src, dst) = (src as usize, dst as usize);
        if src == dst {
            if take {
                self.fields[src].clear();
            }
            return;
        }
        let (source, sink) = if src < dst {
            let (lo, hi) = self.fields.split_at_mut(dst);
            (&mut lo[src], &mut hi[0])
        } else {
            let (lo, hi) = self.fields.split_at_mut(src);
            let (sink, source) = (&mut lo[dst], &mut hi[0]);
            (source, sink)
        };
        sink.clear();
        sink.extend_from_slice(source);
        if take {
            source.clear();
        }
    }

    pub fn clear_fields(&mut self) {
        for field in &mut self.fields {
            field.clear();
        }
    }
}

// TRANSDUCER STACK
// ================================================================================================

/// The LIFO of running transducers. Popping returns control to the pusher, which resumes at
/// the state it was in when it pushed.
#[derive(Debug, Default)]
pub(crate) struct TransducerStack {
    frames: Vec<TransducerFrame>,
}

impl TransducerStack {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self, ordinal: u32, start_state: u32, field_count: usize) {
        self.frames.push(TransducerFrame::new(ordinal, start_state, field_count));
    }

    pub fn pop(&mut self) -> Option<TransducerFrame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&TransducerFrame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut TransducerFrame> {
        self.frames.last_mut()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

// TESTS
// ================================================================================================
