use alloc::{boxed::Box, rc::Rc, vec::Vec};
use core::cell::RefCell;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::{
    BasicTarget, EffectRef, EffectorError, Metrics, Model, ModelBuilder, OutputSink, Runtime,
    Signal, Status, Target, Token, TransducerBuilder, TransductionError, Transductor,
    builtins as fx,
    effectors::{EffectFlags, Effector, Param, builtin_effectors},
    transductor::Transduction,
};

// HARNESS
// ================================================================================================

/// A shared capture sink; clones write into the same buffer.
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

/// An echo transducer: every byte goes to the sink, `eos` stops.
fn echo_model() -> Model {
    let mut model = ModelBuilder::new("base");
    let mut echo = TransducerBuilder::new("echo");
    let anon = model.parameter(fx::OUT, vec![Token::Field(Vec::new())]);
    let emit = echo.effect(&[
        EffectRef::plain(fx::CLEAR),
        EffectRef::plain(fx::PASTE),
        EffectRef::with_parameter(fx::OUT, anon),
    ]);
    let halt = echo.effect(&[EffectRef::plain(fx::STOP)]);
    echo.any_byte(0, 0, emit);
    echo.signal(0, Signal::EOS, 0, halt);
    model.add_transducer(echo).unwrap();
    model.build().unwrap()
}

// STATUS MACHINE
// ================================================================================================

#[test]
fn status_walks_waiting_runnable_stopped() {
    let (mut trex, capture) = transductor(echo_model());
    assert_eq!(trex.status(), Status::Stopped);

    trex.push(Bytes::from_static(b"ab"), 2).unwrap();
    assert_eq!(trex.status(), Status::Waiting);

    trex.start("echo").unwrap();
    assert_eq!(trex.status(), Status::Runnable);

    assert_eq!(trex.run().unwrap(), Status::Stopped);
    assert_eq!(capture.taken(), b"ab");
}

#[test]
fn exhausted_input_with_no_eos_transition_pauses() {
    let mut model = ModelBuilder::new("base");
    let mut sip = TransducerBuilder::new("sip");
    sip.any_byte(0, 0, 0);
    model.add_transducer(sip).unwrap();
    let (mut trex, _) = transductor(model.build().unwrap());

    trex.start("sip").unwrap();
    trex.push(Bytes::from_static(b"xyz"), 3).unwrap();
    assert_eq!(trex.run().unwrap(), Status::Paused);

    // pushing more input resumes the transduction
    trex.push(Bytes::from_static(b"w"), 1).unwrap();
    assert_eq!(trex.status(), Status::Runnable);
    assert_eq!(trex.run().unwrap(), Status::Paused);

    let mut metrics = Metrics::default();
    trex.metrics(&mut metrics);
    assert_eq!(metrics.bytes, 4);
}

#[test]
fn stop_is_idempotent() {
    let (mut trex, _) = transductor(echo_model());
    trex.start("echo").unwrap();
    trex.push(Bytes::from_static(b"abc"), 3).unwrap();
    assert_eq!(trex.stop().unwrap(), Status::Stopped);
    let first = (trex.status(), trex.remaining_input());
    assert_eq!(trex.stop().unwrap(), Status::Stopped);
    assert_eq!((trex.status(), trex.remaining_input()), first);
}

#[test]
fn pause_effector_returns_runnable() {
    let mut model = ModelBuilder::new("base");
    let mut gate = TransducerBuilder::new("gate");
    let hold = gate.effect(&[EffectRef::plain(fx::PAUSE)]);
    gate.any_byte(0, 0, 0);
    gate.byte(0, b'|', 0, hold);
    model.add_transducer(gate).unwrap();
    let (mut trex, _) = transductor(model.build().unwrap());

    trex.start("gate").unwrap();
    trex.push(Bytes::from_static(b"aa|bb"), 5).unwrap();
    assert_eq!(trex.run().unwrap(), Status::Runnable);
    assert_eq!(trex.remaining_input(), 2);
    assert_eq!(trex.run().unwrap(), Status::Paused);
    assert_eq!(trex.remaining_input(), 0);
}

// CONSERVATION
// ================================================================================================

#[test]
fn consumed_plus_remaining_equals_pushed() {
    let mut model = ModelBuilder::new("base");
    let mut gate = TransducerBuilder::new("gate");
    let hold = gate.effect(&[EffectRef::plain(fx::PAUSE)]);
    gate.any_byte(0, 0, 0);
    gate.byte(0, b'|', 0, hold);
    model.add_transducer(gate).unwrap();
    let (mut trex, _) = transductor(model.build().unwrap());

    trex.start("gate").unwrap();
    trex.push(Bytes::from_static(b"abc|"), 4).unwrap();
    trex.push(Bytes::from_static(b"defgh"), 5).unwrap();

    let mut consumed = Metrics::default();
    while trex.run().unwrap() == Status::Runnable {}
    trex.metrics(&mut consumed);
    assert_eq!(consumed.bytes as usize + trex.remaining_input(), 9);
}

// COUNTER
// ================================================================================================

fn counter_model(n: u64) -> Model {
    let mut model = ModelBuilder::new("base");
    let go = model.signal("go");
    let mut tally = TransducerBuilder::new("tally");
    let arm = model.parameter(
        fx::COUNT,
        vec![Token::Literal(format!("{n}").into_bytes()), Token::Signal(b"go".to_vec())],
    );
    let fired = model.parameter(fx::OUT, vec![Token::Literal(b"!".to_vec())]);
    let armed = tally.effect(&[EffectRef::with_parameter(fx::COUNT, arm)]);
    let tick = tally.effect(&[EffectRef::plain(fx::COUNT)]);
    let bang = tally.effect(&[EffectRef::with_parameter(fx::OUT, fired)]);
    tally.signal(0, Signal::NIL, 1, armed);
    tally.byte(1, b'a', 1, tick);
    tally.signal(1, go, 2, bang);
    tally.byte(2, b'a', 2, 0);
    model.add_transducer(tally).unwrap();
    model.build().unwrap()
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(8)]
fn counter_fires_on_the_nth_decrement_and_never_before(#[case] n: u64) {
    // one fewer than n ticks: no signal
    let (mut trex, capture) = transductor(counter_model(n));
    trex.start("tally").unwrap();
    trex.signal(Signal::NIL).unwrap();
    let under = vec![b'a'; (n - 1) as usize];
    let len = under.len();
    trex.push(under, len).unwrap();
    trex.run().unwrap();
    assert_eq!(capture.taken(), b"");

    // exactly n ticks: the armed signal fires once
    let (mut trex, capture) = transductor(counter_model(n));
    trex.start("tally").unwrap();
    trex.signal(Signal::NIL).unwrap();
    let exact = vec![b'a'; n as usize];
    let len = exact.len();
    trex.push(exact, len).unwrap();
    trex.run().unwrap();
    assert_eq!(capture.taken(), b"!");
}

#[test]
fn counter_initial_value_can_come_from_a_field() {
    let mut model = ModelBuilder::new("base");
    let go = model.signal("go");
    let mut tally = TransducerBuilder::new("tally");
    let n = tally.field("n");
    assert_eq!(n, 1);
    let arm = model.parameter(
        fx::COUNT,
        vec![Token::Field(b"n".to_vec()), Token::Signal(b"go".to_vec())],
    );
    let seed = model.parameter(fx::PASTE, vec![Token::Literal(b"2".to_vec())]);
    let sel = model.parameter(fx::SELECT, vec![Token::Field(b"n".to_vec())]);
    let fired = model.parameter(fx::OUT, vec![Token::Literal(b"!".to_vec())]);

    let prologue = tally.effect(&[
        EffectRef::with_parameter(fx::SELECT, sel),
        EffectRef::with_parameter(fx::PASTE, seed),
        EffectRef::with_parameter(fx::COUNT, arm),
    ]);
    let tick = tally.effect(&[EffectRef::plain(fx::COUNT)]);
    let bang = tally.effect(&[EffectRef::with_parameter(fx::OUT, fired)]);
    tally.signal(0, Signal::NIL, 1, prologue);
    tally.byte(1, b'a', 1, tick);
    tally.signal(1, go, 2, bang);
    model.add_transducer(tally).unwrap();

    let (mut trex, capture) = transductor(model.build().unwrap());
    trex.start("tally").unwrap();
    trex.signal(Signal::NIL).unwrap();
    trex.push(Bytes::from_static(b"aa"), 2).unwrap();
    trex.run().unwrap();
    assert_eq!(capture.taken(), b"!");
}

// FIELD OPS
// ================================================================================================

#[test]
fn copy_overwrites_and_cut_clears_the_source() {
    let mut model = ModelBuilder::new("base");
    let mut t = TransducerBuilder::new("t");
    t.field("a");
    t.field("b");
    let sel_a = model.parameter(fx::SELECT, vec![Token::Field(b"a".to_vec())]);
    let sel_b = model.parameter(fx::SELECT, vec![Token::Field(b"b".to_vec())]);
    let cp = model.parameter(fx::COPY, vec![Token::Field(b"a".to_vec())]);
    let ct = model.parameter(fx::CUT, vec![Token::Field(b"b".to_vec())]);
    let emit = model.parameter(
        fx::OUT,
        vec![
            Token::Literal(b"a=".to_vec()),
            Token::Field(b"a".to_vec()),
            Token::Literal(b" b=".to_vec()),
            Token::Field(b"b".to_vec()),
            Token::Literal(b" anon=".to_vec()),
            Token::Field(Vec::new()),
        ],
    );

    let prologue = t.effect(&[EffectRef::with_parameter(fx::SELECT, sel_a)]);
    let paste = t.effect(&[EffectRef::plain(fx::PASTE)]);
    // b := a (stale b content overwritten), then anon := b with b cleared
    let juggle = t.effect(&[
        EffectRef::with_parameter(fx::SELECT, sel_b),
        EffectRef::with_parameter(fx::PASTE, model_banner(&mut model)),
        EffectRef::with_parameter(fx::COPY, cp),
        EffectRef::plain(fx::SELECT),
        EffectRef::with_parameter(fx::CUT, ct),
    ]);
    let emit = t.effect(&[EffectRef::with_parameter(fx::OUT, emit), EffectRef::plain(fx::STOP)]);
    t.signal(0, Signal::NIL, 1, prologue);
    t.bytes(1, b'a'..=b'z', 1, paste);
    t.byte(1, b';', 2, juggle);
    t.signal(2, Signal::EOS, 2, emit);
    model.add_transducer(t).unwrap();

    let (mut trex, capture) = transductor(model.build().unwrap());
    trex.start("t").unwrap();
    trex.signal(Signal::NIL).unwrap();
    trex.push(Bytes::from_static(b"hi;"), 3).unwrap();
    assert_eq!(trex.run().unwrap(), Status::Stopped);
    assert_eq!(capture.taken(), b"a=hi b= anon=hi");
}

fn model_banner(model: &mut ModelBuilder) -> u32 {
    model.parameter(fx::PASTE, vec![Token::Literal(b"stale".to_vec())])
}

#[test]
fn clear_all_wipes_every_field() {
    let mut model = ModelBuilder::new("base");
    let mut t = TransducerBuilder::new("t");
    t.field("a");
    let sel_a = model.parameter(fx::SELECT, vec![Token::Field(b"a".to_vec())]);
    let wipe = model.parameter(fx::CLEAR, vec![Token::Field(b"*".to_vec())]);
    let emit = model.parameter(
        fx::OUT,
        vec![Token::Literal(b"[".to_vec()), Token::Field(b"a".to_vec()), Token::Literal(b"]".to_vec())],
    );

    let fill = t.effect(&[EffectRef::with_parameter(fx::SELECT, sel_a), EffectRef::plain(fx::PASTE)]);
    let wipe = t.effect(&[EffectRef::with_parameter(fx::CLEAR, wipe)]);
    let emit = t.effect(&[EffectRef::with_parameter(fx::OUT, emit), EffectRef::plain(fx::STOP)]);
    t.bytes(0, b'a'..=b'z', 0, fill);
    t.byte(0, b'!', 0, wipe);
    t.signal(0, Signal::EOS, 0, emit);
    model.add_transducer(t).unwrap();

    let (mut trex, capture) = transductor(model.build().unwrap());
    trex.start("t").unwrap();
    trex.push(Bytes::from_static(b"abc!"), 4).unwrap();
    trex.run().unwrap();
    assert_eq!(capture.taken(), b"[]");
}

// NESTED TRANSDUCERS
// ================================================================================================

#[test]
fn start_effector_nests_and_stop_returns_to_the_caller() {
    let mut model = ModelBuilder::new("base");
    let inner_call = model.parameter(fx::START, vec![Token::Transducer(b"inner".to_vec())]);
    let tag_outer = model.parameter(fx::OUT, vec![Token::Literal(b"o".to_vec())]);
    let tag_inner = model.parameter(fx::OUT, vec![Token::Literal(b"i".to_vec())]);

    let mut outer = TransducerBuilder::new("outer");
    let descend = outer.effect(&[EffectRef::with_parameter(fx::START, inner_call)]);
    let o = outer.effect(&[EffectRef::with_parameter(fx::OUT, tag_outer)]);
    let halt = outer.effect(&[EffectRef::plain(fx::STOP)]);
    outer.byte(0, b'(', 0, descend);
    outer.byte(0, b'.', 0, o);
    outer.signal(0, Signal::EOS, 0, halt);

    let mut inner = TransducerBuilder::new("inner");
    let i = inner.effect(&[EffectRef::with_parameter(fx::OUT, tag_inner)]);
    let pop = inner.effect(&[EffectRef::plain(fx::STOP)]);
    inner.byte(0, b'.', 0, i);
    inner.byte(0, b')', 0, pop);

    model.add_transducer(outer).unwrap();
    model.add_transducer(inner).unwrap();

    let (mut trex, capture) = transductor(model.build().unwrap());
    trex.start("outer").unwrap();
    trex.push(Bytes::from_static(b".(..)."), 6).unwrap();
    assert_eq!(trex.run().unwrap(), Status::Stopped);
    assert_eq!(capture.taken(), b"oiio");
}

// SIGNALS FROM EFFECTORS
// ================================================================================================

const GO: Signal = match Signal::from_ordinal(260) {
    Some(signal) => signal,
    None => unreachable!(),
};

#[derive(Default)]
struct ProbeTarget {
    probes: usize,
}

impl Target for ProbeTarget {
    fn name(&self) -> &str {
        "probe-target"
    }

    fn effectors(&mut self) -> Vec<Box<dyn Effector<Self>>> {
        vec![Box::new(Probe)]
    }
}

struct Probe;

impl Effector<ProbeTarget> for Probe {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn invoke(
        &mut self,
        target: &mut ProbeTarget,
        _ctx: &mut Transduction,
        _parameter: Option<&Param>,
    ) -> Result<EffectFlags, EffectorError> {
        target.probes += 1;
        Ok(EffectFlags::signal(GO))
    }
}

fn probe_model() -> Model {
    let mut model = ModelBuilder::new("probe-target");
    let go = model.signal("go");
    assert_eq!(go, GO);
    let probe_ord = model.effector("probe");
    let tag_go = model.parameter(fx::OUT, vec![Token::Literal(b"G".to_vec())]);
    let tag_byte = model.parameter(fx::OUT, vec![Token::Literal(b"Z".to_vec())]);

    let mut t = TransducerBuilder::new("t");
    let fire = t.effect(&[EffectRef::plain(probe_ord)]);
    let on_go = t.effect(&[EffectRef::with_parameter(fx::OUT, tag_go)]);
    let on_byte = t.effect(&[EffectRef::with_parameter(fx::OUT, tag_byte)]);
    let halt = t.effect(&[EffectRef::plain(fx::STOP)]);
    t.signal(0, Signal::NIL, 1, fire);
    t.signal(1, GO, 2, on_go);
    t.byte(1, b'z', 2, on_byte);
    t.byte(2, b'z', 2, 0);
    t.signal(2, Signal::EOS, 2, halt);
    model.add_transducer(t).unwrap();
    model.build().unwrap()
}

#[test]
fn effector_returned_signal_preempts_pending_bytes() {
    let runtime = Runtime::new(probe_model(), ProbeTarget::default()).unwrap();
    let mut trex = runtime.transductor(ProbeTarget::default()).unwrap();
    let capture = Capture::default();
    trex.output(Box::new(capture.clone()));

    trex.start("t").unwrap();
    trex.push(Bytes::from_static(b"z"), 1).unwrap();
    trex.signal(Signal::NIL).unwrap();
    assert_eq!(trex.run().unwrap(), Status::Stopped);

    // the probe's !go outran the buffered byte
    assert_eq!(capture.taken(), b"G");
    assert_eq!(trex.into_target().probes, 1);
}

// RECYCLE
// ================================================================================================

#[test]
fn recycle_reclaims_unretained_buffers_and_replaces_marked_ones() {
    let mut model = ModelBuilder::new("base");
    let mut t = TransducerBuilder::new("t");
    // the mark pauses so retention is observable before the stream ends
    let hold = t.effect(&[EffectRef::plain(fx::MARK), EffectRef::plain(fx::PAUSE)]);
    t.any_byte(0, 0, 0);
    t.byte(0, b'm', 0, hold);
    model.add_transducer(t).unwrap();
    let (mut trex, _) = transductor(model.build().unwrap());

    // consumed without a mark: storage comes back
    trex.start("t").unwrap();
    let plain = Bytes::from(b"aaaa".to_vec());
    let plain_ptr = plain.as_ptr();
    trex.push(plain.clone(), 4).unwrap();
    assert_eq!(trex.run().unwrap(), Status::Paused);
    let reclaimed = trex.recycle(plain);
    assert_eq!(reclaimed.as_ptr(), plain_ptr);
    assert!(reclaimed.is_empty());

    // marked: the mark set keeps a clone, so the caller gets a fresh buffer
    let marked = Bytes::from(b"aama".to_vec());
    let marked_ptr = marked.as_ptr();
    trex.push(marked.clone(), 4).unwrap();
    assert_eq!(trex.run().unwrap(), Status::Runnable);
    let replacement = trex.recycle(marked);
    assert_ne!(replacement.as_ptr(), marked_ptr);
    assert_eq!(replacement.capacity(), 4);
}

// ERRORS
// ================================================================================================

#[test]
fn unknown_transducer_fails_start() {
    let (mut trex, _) = transductor(echo_model());
    assert!(matches!(trex.start("nope"), Err(TransductionError::TransducerNotFound(_))));
}

#[test]
fn target_class_mismatch_fails_binding() {
    let model = {
        let mut model = ModelBuilder::new("somebody-else");
        model.add_transducer(TransducerBuilder::new("t")).unwrap();
        model.build().unwrap()
    };
    assert!(matches!(
        Runtime::new(model, BasicTarget),
        Err(TransductionError::TargetMismatch { .. })
    ));
}

#[test]
fn missing_target_effector_fails_binding() {
    let model = {
        let mut model = ModelBuilder::new("base");
        model.effector("probe");
        model.add_transducer(TransducerBuilder::new("t")).unwrap();
        model.build().unwrap()
    };
    assert!(matches!(
        Runtime::new(model, BasicTarget),
        Err(TransductionError::EffectorNotFound(name)) if name == "probe"
    ));
}

#[test]
fn bad_parameter_fails_model_binding() {
    let model = {
        let mut model = ModelBuilder::new("base");
        model.signal("go");
        // paste has no use for a signal reference
        let bad = model.parameter(fx::PASTE, vec![Token::Signal(b"go".to_vec())]);
        let mut t = TransducerBuilder::new("t");
        let eff = t.effect(&[EffectRef::with_parameter(fx::PASTE, bad)]);
        t.byte(0, b'x', 0, eff);
        model.add_transducer(t).unwrap();
        model.build().unwrap()
    };
    assert!(matches!(
        Runtime::new(model, BasicTarget),
        Err(TransductionError::ParameterCompile { effector, .. }) if effector == "paste"
    ));
}

#[test]
fn out_without_a_sink_is_an_effector_failure() {
    let mut model = ModelBuilder::new("base");
    let emit = model.parameter(fx::OUT, vec![Token::Literal(b"x".to_vec())]);
    let mut t = TransducerBuilder::new("t");
    let eff = t.effect(&[EffectRef::with_parameter(fx::OUT, emit)]);
    t.byte(0, b'x', 0, eff);
    model.add_transducer(t).unwrap();

    let runtime = Runtime::new(model.build().unwrap(), BasicTarget).unwrap();
    let mut trex = runtime.transductor(BasicTarget).unwrap();
    trex.start("t").unwrap();
    trex.push(Bytes::from_static(b"x"), 1).unwrap();
    assert!(matches!(
        trex.run(),
        Err(TransductionError::Effector { effector: "out", source: EffectorError::NoOutputSink })
    ));
}

#[test]
fn out_of_range_signal_is_rejected() {
    let (mut trex, _) = transductor(echo_model());
    let stray = Signal::from_ordinal(300).unwrap();
    assert!(matches!(trex.signal(stray), Err(TransductionError::SignalOutOfRange(300))));
}

#[test]
fn unrecoverable_domain_error_reports_the_state() {
    // no nul transition anywhere: the first unmatched byte is fatal
    let mut model = ModelBuilder::new("base");
    let mut t = TransducerBuilder::new("strict");
    t.byte(0, b'a', 0, 0);
    model.add_transducer(t).unwrap();
    let (mut trex, _) = transductor(model.build().unwrap());

    trex.start("strict").unwrap();
    trex.push(Bytes::from_static(b"ab"), 2).unwrap();
    let err = trex.run().unwrap_err();
    assert!(matches!(
        err,
        TransductionError::DomainErrorUnrecoverable { state: 0, input, .. } if input == b'b' as u32
    ));
    // the wreckage is inspectable, and stop() still resets
    assert_eq!(trex.stop().unwrap(), Status::Stopped);
}

// PROXY MISUSE
// ================================================================================================

#[test]
fn proxy_transductors_refuse_live_operations() {
    let model = alloc::sync::Arc::new(echo_model());
    let mut proxy =
        Transductor::proxy(BasicTarget, builtin_effectors::<BasicTarget>(), model.clone());
    assert_eq!(proxy.status(), Status::Proxy);
    assert!(matches!(proxy.run(), Err(TransductionError::ProxyMisuse("run"))));
    assert!(matches!(
        proxy.push(Bytes::from_static(b"x"), 1),
        Err(TransductionError::ProxyMisuse("push"))
    ));
    assert!(matches!(proxy.start("echo"), Err(TransductionError::ProxyMisuse("start"))));
    assert!(matches!(proxy.stop(), Err(TransductionError::ProxyMisuse("stop"))));
}
