//! Quantified engine properties, exercised over generated inputs.

use std::{cell::RefCell, rc::Rc};

use proptest::prelude::*;
use ribose_processor::{
    BasicTarget, Bytes, EffectRef, EffectorError, Metrics, Model, ModelBuilder, OutputSink,
    Runtime, Signal, Token, TransducerBuilder, Transductor, builtins as fx,
};

// HARNESS
// ================================================================================================

#[derive(Clone, Default)]
struct Capture(Rc<RefCell<Vec<u8>>>);

impl Capture {
    fn taken(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }
}

impl OutputSink for Capture {
    fn write(&mut self, bytes: &[u8]) -> Result<(), EffectorError> {
        self.0.borrow_mut().extend_from_slice(bytes);
        Ok(())
    }
}

fn transductor(model: Model) -> (Transductor<BasicTarget>, Capture) {
    let runtime = Runtime::new(model, BasicTarget).unwrap();
    let mut trex = runtime.transductor(BasicTarget).unwrap();
    let capture = Capture::default();
    trex.output(Box::new(capture.clone()));
    (trex, capture)
}

// MARK / RESET ROUND TRIP
// ================================================================================================

const MARK_BYTE: u8 = 0x01;
const RESET_BYTE: u8 = 0x02;

/// Echo transducer with in-band mark/reset triggers: 0x01 arms the mark, 0x02 rewinds to it
/// once (and is skipped on replay).
fn mark_reset_model() -> Model {
    let mut model = ModelBuilder::new("base");
    let echo_anon = model.parameter(fx::OUT, vec![Token::Field(Vec::new())]);

    let mut t = TransducerBuilder::new("replayer");
    let echo = t.effect(&[
        EffectRef::plain(fx::CLEAR),
        EffectRef::plain(fx::PASTE),
        EffectRef::with_parameter(fx::OUT, echo_anon),
    ]);
    let arm = t.effect(&[EffectRef::plain(fx::MARK)]);
    let rewind = t.effect(&[EffectRef::plain(fx::RESET)]);
    let halt = t.effect(&[EffectRef::plain(fx::STOP)]);

    // state 0 echoes; a reset jumps to state 1, which skips the replayed 0x02
    t.bytes(0, 0x20..=0x7f, 0, echo);
    t.byte(0, MARK_BYTE, 0, arm);
    t.byte(0, RESET_BYTE, 1, rewind);
    t.bytes(1, 0x20..=0x7f, 1, echo);
    t.byte(1, RESET_BYTE, 0, 0);
    t.signal(0, Signal::EOS, 0, halt);
    t.signal(1, Signal::EOS, 1, halt);
    model.add_transducer(t).unwrap();
    model.build().unwrap()
}

proptest! {
    /// Marking at `m` and resetting at `r` must replay exactly `B[m..r)`:
    /// the output is `B[0..m) + B[m..r) + B[m..]`.
    #[test]
    fn mark_reset_round_trip(
        body in proptest::collection::vec(0x20u8..0x80, 0..48),
        split in any::<(prop::sample::Index, prop::sample::Index)>(),
    ) {
        let (a, b) = (split.0.index(body.len() + 1), split.1.index(body.len() + 1));
        let (m, r) = (a.min(b), a.max(b));

        let mut input = Vec::with_capacity(body.len() + 2);
        input.extend_from_slice(&body[..m]);
        input.push(MARK_BYTE);
        input.extend_from_slice(&body[m..r]);
        input.push(RESET_BYTE);
        input.extend_from_slice(&body[r..]);

        let mut expected = Vec::with_capacity(body.len() + (r - m));
        expected.extend_from_slice(&body[..m]);
        expected.extend_from_slice(&body[m..r]);
        expected.extend_from_slice(&body[m..]);

        let (mut trex, capture) = transductor(mark_reset_model());
        trex.start("replayer").unwrap();
        let len = input.len();
        trex.push(input, len).unwrap();
        prop_assert_eq!(trex.run().unwrap(), ribose_processor::Status::Stopped);
        prop_assert_eq!(capture.taken(), expected);
    }
}

// EQUIVALENCE-CLASS CLOSURE
// ================================================================================================

/// A transducer with assorted range/point transitions, for partition checks.
fn partitioned_model() -> Model {
    let mut model = ModelBuilder::new("base");
    let go = model.signal("go");
    let mut t = TransducerBuilder::new("partitioned");
    let paste = t.effect(&[EffectRef::plain(fx::PASTE)]);
    let halt = t.effect(&[EffectRef::plain(fx::STOP)]);
    t.bytes(0, b'a'..=b'z', 1, paste);
    t.bytes(0, b'0'..=b'9', 0, 0);
    t.byte(0, b' ', 2, 0);
    t.bytes(1, b'a'..=b'm', 1, paste);
    t.bytes(1, b'n'..=b'z', 0, 0);
    t.signal(1, go, 2, 0);
    t.signal(2, Signal::EOS, 2, halt);
    model.add_transducer(t).unwrap();
    model.build().unwrap()
}

proptest! {
    /// Inputs sharing an equivalence class take identical transitions from every state.
    #[test]
    fn inputs_in_one_class_are_indistinguishable(i1 in 0u32..260, i2 in 0u32..260) {
        let model = partitioned_model();
        let transducer = model.transducer(0);
        let (c1, c2) = (transducer.class_of(i1).unwrap(), transducer.class_of(i2).unwrap());
        prop_assume!(c1 == c2);
        for state in 0..transducer.state_count() {
            prop_assert_eq!(transducer.cell(state, c1), transducer.cell(state, c2));
        }
    }
}

// DOMAIN-ERROR DETERMINISM
// ================================================================================================

/// Accepts lowercase letters and newlines; anything else recovers through nul.
fn forgiving_model() -> Model {
    let mut model = ModelBuilder::new("base");
    let mut t = TransducerBuilder::new("forgiving");
    let halt = t.effect(&[EffectRef::plain(fx::STOP)]);
    t.bytes(0, b'a'..=b'z', 0, 0);
    t.byte(0, b'\n', 0, 0);
    t.signal(0, Signal::NUL, 0, 0);
    t.signal(0, Signal::EOS, 0, halt);
    model.add_transducer(t).unwrap();
    model.build().unwrap()
}

proptest! {
    /// For a fixed model and input, the number of nul recoveries is reproducible, and equals
    /// the number of out-of-alphabet bytes.
    #[test]
    fn nul_recovery_is_deterministic(input in proptest::collection::vec(any::<u8>(), 0..64)) {
        let model = forgiving_model();
        let expected_errors =
            input.iter().filter(|b| !(b.is_ascii_lowercase() || **b == b'\n')).count() as u64;

        let run_once = || {
            let runtime = Runtime::new(model.clone(), BasicTarget).unwrap();
            let mut trex = runtime.transductor(BasicTarget).unwrap();
            trex.start("forgiving").unwrap();
            trex.push(Bytes::from(input.clone()), input.len()).unwrap();
            trex.run().unwrap();
            let mut metrics = Metrics::default();
            trex.metrics(&mut metrics);
            metrics
        };

        let first = run_once();
        prop_assert_eq!(first.errors, expected_errors);
        prop_assert_eq!(first.bytes, input.len() as u64);
        prop_assert_eq!(run_once(), first);
    }
}
