use alloc::{boxed::Box, string::ToString, sync::Arc, vec::Vec};
use core::mem;

use bytes::{Bytes, BytesMut};
use ribose_core::{Cell, EMPTY_EFFECT, Model, Signal, Transducer};
use tracing::instrument;

use crate::{
    Metrics, OutputSink, Target, TransductionError,
    effectors::{EffectFlags, Effector, Plan, PlanStep, lossy},
    errors::EffectorError,
    input::InputStack,
    runtime::CompiledParameters,
    stack::{Counter, TransducerStack},
};

// STATUS
// ================================================================================================

/// The transductor status machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Both stacks have work; `run()` can make progress.
    Runnable,
    /// Transducers remain but the input is exhausted (or the `pause` effector fired); resume
    /// with `push`.
    Paused,
    /// The transducer stack is empty while input remains; resume with `start`.
    Waiting,
    /// Both stacks are empty.
    Stopped,
    /// The instance exists solely to host parameter compilation; `run`, `push`, `start` and
    /// `stop` all fail.
    Proxy,
}

// TRANSDUCTION
// ================================================================================================

/// The live transduction state: both stacks, fields, the output sink, the pending signal, and
/// the per-run metrics.
///
/// This is the handle effectors mutate. Built-ins go through the `pub(crate)` surface; the
/// public methods are the contract available to target-supplied effectors.
pub struct Transduction {
    pub(crate) model: Arc<Model>,
    pub(crate) input: InputStack,
    pub(crate) frames: TransducerStack,
    pub(crate) output: Option<Box<dyn OutputSink>>,
    pub(crate) metrics: Metrics,
    pub(crate) pending: Option<Signal>,
    current_input: u32,
    eos_raised: bool,
    scratch: Vec<u8>,
}

impl Transduction {
    pub(crate) fn new(model: Arc<Model>) -> Self {
        Transduction {
            model,
            input: InputStack::default(),
            frames: TransducerStack::default(),
            output: None,
            metrics: Metrics::default(),
            pending: None,
            current_input: Signal::NIL.ordinal(),
            eos_raised: false,
            scratch: Vec::new(),
        }
    }

    // INPUT
    // --------------------------------------------------------------------------------------------

    /// The input ordinal driving the current transition (a byte, or a signal `>= 256`).
    pub fn current_input(&self) -> u32 {
        self.current_input
    }

    /// The current input as a byte, if it is one.
    pub fn current_byte(&self) -> Option<u8> {
        u8::try_from(self.current_input).ok()
    }

    /// Pushes a composed input frame; it will be consumed before anything beneath it.
    pub fn push_input(&mut self, data: Bytes) {
        self.input.push_injected(data);
    }

    pub(crate) fn push_input_plan(&mut self, plan: &Plan) -> Result<(), EffectorError> {
        let mut buf = Vec::new();
        self.compose_into(plan, &mut buf)?;
        self.input.push_injected(Bytes::from(buf));
        Ok(())
    }

    pub(crate) fn mark_input(&mut self) {
        self.input.mark();
    }

    pub(crate) fn reset_input(&mut self) {
        if self.input.reset() {
            // replay re-opened the input stack
            self.eos_raised = false;
        }
    }

    // FIELDS
    // --------------------------------------------------------------------------------------------

    /// Selects the anonymous field.
    pub fn select_anonymous(&mut self) {
        if let Some(frame) = self.frames.top_mut() {
            frame.selected = 0;
        }
    }

    /// Selects the named field of the running transducer.
    pub fn select_field(&mut self, name: &[u8]) -> Result<(), EffectorError> {
        let ordinal = self.resolve_field(name)?;
        self.top_frame_mut()?.selected = ordinal;
        Ok(())
    }

    /// Appends the current input byte to the selected field; signal inputs have no byte and
    /// append nothing.
    pub fn paste_byte(&mut self) -> Result<(), EffectorError> {
        if let Some(byte) = self.current_byte() {
            let frame = self.top_frame_mut()?;
            let selected = frame.selected;
            frame.field_mut(selected).push(byte);
        }
        Ok(())
    }

    /// Appends bytes to the selected field.
    pub fn paste(&mut self, bytes: &[u8]) -> Result<(), EffectorError> {
        let frame = self.top_frame_mut()?;
        let selected = frame.selected;
        frame.field_mut(selected).extend_from_slice(bytes);
        Ok(())
    }

    pub(crate) fn paste_plan(&mut self, plan: &Plan) -> Result<(), EffectorError> {
        let mut scratch = mem::take(&mut self.scratch);
        scratch.clear();
        let composed = self.compose_into(plan, &mut scratch);
        let result = composed.and_then(|()| self.paste(&scratch));
        self.scratch = scratch;
        result
    }

    /// Returns the contents of the named field.
    pub fn field(&self, name: &[u8]) -> Result<&[u8], EffectorError> {
        let ordinal = self.resolve_field(name)?;
        Ok(self.frames.top().expect("resolve_field checked the frame").field(ordinal))
    }

    pub(crate) fn copy_field(&mut self, name: &[u8], take: bool) -> Result<(), EffectorError> {
        let src = self.resolve_field(name)?;
        let frame = self.top_frame_mut()?;
        frame.transfer_field(src, frame.selected, take);
        Ok(())
    }

    pub(crate) fn clear_selected(&mut self) -> Result<(), EffectorError> {
        let frame = self.top_frame_mut()?;
        let selected = frame.selected;
        frame.field_mut(selected).clear();
        Ok(())
    }

    pub(crate) fn clear_field(&mut self, name: &[u8]) -> Result<(), EffectorError> {
        let ordinal = self.resolve_field(name)?;
        self.top_frame_mut()?.field_mut(ordinal).clear();
        Ok(())
    }

    pub(crate) fn clear_all_fields(&mut self) -> Result<(), EffectorError> {
        self.top_frame_mut()?.clear_fields();
        Ok(())
    }

    fn resolve_field(&self, name: &[u8]) -> Result<u32, EffectorError> {
        let frame = self
            .frames
            .top()
            .ok_or_else(|| EffectorError::failure("no transducer is running"))?;
        self.model
            .transducer(frame.ordinal)
            .field_ordinal(name)
            .ok_or_else(|| EffectorError::FieldNotFound(lossy(name)))
    }

    fn top_frame_mut(&mut self) -> Result<&mut crate::stack::TransducerFrame, EffectorError> {
        self.frames.top_mut().ok_or_else(|| EffectorError::failure("no transducer is running"))
    }

    // COUNTER
    // --------------------------------------------------------------------------------------------

    /// Arms the running transducer's counter.
    pub fn arm_counter(&mut self, remaining: u64, signal: Signal) -> Result<(), EffectorError> {
        self.top_frame_mut()?.counter = Some(Counter { remaining, signal });
        Ok(())
    }

    /// Decrements the counter; on reaching zero it disarms and returns its signal. With no
    /// counter armed this is a no-op.
    pub fn decrement_counter(&mut self) -> Result<Option<Signal>, EffectorError> {
        let frame = self.top_frame_mut()?;
        match &mut frame.counter {
            Some(counter) => {
                counter.remaining = counter.remaining.saturating_sub(1);
                if counter.remaining == 0 {
                    let signal = counter.signal;
                    frame.counter = None;
                    Ok(Some(signal))
                } else {
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    // OUTPUT
    // --------------------------------------------------------------------------------------------

    /// Writes bytes to the installed output sink; fails if none is installed.
    pub fn write_output(&mut self, bytes: &[u8]) -> Result<(), EffectorError> {
        match &mut self.output {
            Some(sink) => sink.write(bytes),
            None => Err(EffectorError::NoOutputSink),
        }
    }

    pub(crate) fn write_plan(&mut self, plan: &Plan) -> Result<(), EffectorError> {
        let mut scratch = mem::take(&mut self.scratch);
        scratch.clear();
        let composed = self.compose_into(plan, &mut scratch);
        let result = composed.and_then(|()| self.write_output(&scratch));
        self.scratch = scratch;
        result
    }

    // TRANSDUCER STACK
    // --------------------------------------------------------------------------------------------

    pub(crate) fn push_transducer(&mut self, ordinal: u32) {
        let transducer = self.model.transducer(ordinal);
        self.frames.push(ordinal, transducer.start_state(), transducer.field_count());
    }

    pub(crate) fn pop_transducer(&mut self) {
        self.frames.pop();
    }

    /// The transducer stack depth.
    pub fn depth(&self) -> usize {
        self.frames.depth()
    }

    // COMPOSITION
    // --------------------------------------------------------------------------------------------

    fn compose_into(&self, plan: &Plan, out: &mut Vec<u8>) -> Result<(), EffectorError> {
        for step in &plan.0 {
            match step {
                PlanStep::Literal(bytes) => out.extend_from_slice(bytes),
                PlanStep::Field(name) => {
                    let ordinal = self.resolve_field(name)?;
                    let frame = self.frames.top().expect("resolve_field checked the frame");
                    out.extend_from_slice(frame.field(ordinal));
                },
            }
        }
        Ok(())
    }

    // FAST SCAN
    // --------------------------------------------------------------------------------------------

    /// Consumes top-frame bytes while the row keeps mapping them onto the current self-loop
    /// no-op cell, without re-entering the full step machinery.
    fn scan_self_loop(&mut self, transducer: &Transducer, state: u32) {
        let Some(frame) = self.input.top_mut() else { return };
        let mut n = 0usize;
        for &byte in frame.pending() {
            let Some(class) = transducer.class_of(byte as u32) else { break };
            let cell = transducer.cell(state, class);
            if cell.next != state || cell.effect != EMPTY_EFFECT {
                break;
            }
            n += 1;
        }
        if n > 0 {
            frame.advance(n);
            self.metrics.bytes += n as u64;
            self.metrics.scanned += n as u64;
        }
    }

    // LIFECYCLE
    // --------------------------------------------------------------------------------------------

    fn reset_state(&mut self) {
        self.frames.clear();
        self.input.clear();
        self.pending = None;
        self.eos_raised = false;
        self.scratch = Vec::new();
    }

    fn drain_metrics(&mut self, acc: &mut Metrics) {
        self.metrics.marked += self.input.marked_bytes;
        self.input.marked_bytes = 0;
        acc.absorb(self.metrics);
        self.metrics.clear();
    }
}

// TRANSDUCTOR
// ================================================================================================

/// The transduction driver: feeds input ordinals through the running transducer's transition
/// table and dispatches the selected effect vectors until a halting condition.
///
/// Instances are minted by [`Runtime::transductor`](crate::Runtime::transductor), own their
/// target, and borrow the model and compiled parameter tables shared across the runtime.
pub struct Transductor<T: Target> {
    status: Status,
    target: T,
    effectors: Vec<Box<dyn Effector<T>>>,
    parameters: Arc<CompiledParameters>,
    ctx: Transduction,
}

impl<T: Target> Transductor<T> {
    pub(crate) fn live(
        target: T,
        effectors: Vec<Box<dyn Effector<T>>>,
        parameters: Arc<CompiledParameters>,
        model: Arc<Model>,
    ) -> Self {
        Transductor {
            status: Status::Stopped,
            target,
            effectors,
            parameters,
            ctx: Transduction::new(model),
        }
    }

    pub(crate) fn proxy(
        target: T,
        effectors: Vec<Box<dyn Effector<T>>>,
        model: Arc<Model>,
    ) -> Self {
        Transductor {
            status: Status::Proxy,
            target,
            effectors,
            parameters: Arc::new(CompiledParameters::default()),
            ctx: Transduction::new(model),
        }
    }

    // ACCESSORS
    // --------------------------------------------------------------------------------------------

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Consumes the transductor and returns its target, e.g. to read back accumulated state.
    pub fn into_target(self) -> T {
        self.target
    }

    pub(crate) fn effectors(&self) -> &[Box<dyn Effector<T>>] {
        &self.effectors
    }

    pub(crate) fn model(&self) -> &Arc<Model> {
        &self.ctx.model
    }

    // OPERATIONS
    // --------------------------------------------------------------------------------------------

    /// Appends a primary input frame of `data[..limit]`.
    ///
    /// While a mark is armed the buffer joins the mark set and stays retained until the mark
    /// is released; [`Self::recycle`] tells a caller which case applied to its buffer.
    pub fn push(&mut self, data: impl Into<Bytes>, limit: usize) -> Result<(), TransductionError> {
        self.ensure_live("push")?;
        self.ctx.input.push_primary(data.into(), limit);
        self.ctx.eos_raised = false;
        self.status = settle(&self.ctx);
        Ok(())
    }

    /// Arranges for `signal` to be the first input of the next `run()`, replacing any signal
    /// already pending.
    pub fn signal(&mut self, signal: Signal) -> Result<(), TransductionError> {
        self.ensure_live("signal")?;
        if !self.ctx.model.signals().contains_ordinal(signal.ordinal()) {
            return Err(TransductionError::SignalOutOfRange(signal.ordinal()));
        }
        self.ctx.pending = Some(signal);
        self.status = settle(&self.ctx);
        Ok(())
    }

    /// Pushes a fresh frame for the named transducer in its initial state.
    pub fn start(&mut self, name: &str) -> Result<(), TransductionError> {
        self.ensure_live("start")?;
        let ordinal = self
            .ctx
            .model
            .transducer_ordinal(name)
            .ok_or_else(|| TransductionError::TransducerNotFound(name.to_string()))?;
        self.ctx.push_transducer(ordinal);
        self.status = settle(&self.ctx);
        Ok(())
    }

    /// Installs the output sink the `out[..]` effector writes to; returns the previous sink.
    pub fn output(&mut self, sink: Box<dyn OutputSink>) -> Option<Box<dyn OutputSink>> {
        self.ctx.output.replace(sink)
    }

    /// Empties both stacks, releases retained buffers, and clears all fields.
    pub fn stop(&mut self) -> Result<Status, TransductionError> {
        self.ensure_live("stop")?;
        self.ctx.reset_state();
        self.status = Status::Stopped;
        Ok(self.status)
    }

    /// Returns a buffer the caller can refill: the reclaimed storage of `buffer` when the
    /// engine retains no reference to it, or a fresh equally-sized buffer when the mark set
    /// still holds it.
    pub fn recycle(&mut self, buffer: Bytes) -> BytesMut {
        match buffer.try_into_mut() {
            Ok(mut reclaimed) => {
                reclaimed.clear();
                reclaimed
            },
            Err(retained) => BytesMut::with_capacity(retained.len()),
        }
    }

    /// Drains the counters accumulated since the last drain into `acc`.
    pub fn metrics(&mut self, acc: &mut Metrics) {
        self.ctx.drain_metrics(acc);
    }

    /// Unread input bytes across all stacked frames.
    pub fn remaining_input(&self) -> usize {
        self.ctx.input.remaining()
    }

    fn ensure_live(&self, op: &'static str) -> Result<(), TransductionError> {
        if self.status == Status::Proxy {
            return Err(TransductionError::ProxyMisuse(op));
        }
        Ok(())
    }

    // DISPATCH LOOP
    // --------------------------------------------------------------------------------------------

    /// Runs the transduction until a halting condition: a stack empties, an effector pauses or
    /// stops the engine, or an unrecoverable domain error surfaces.
    #[instrument(skip_all, level = "debug")]
    pub fn run(&mut self) -> Result<Status, TransductionError> {
        self.ensure_live("run")?;
        let Self { target, effectors, parameters, ctx, .. } = self;
        let model = ctx.model.clone();

        let status = loop {
            if ctx.frames.is_empty() {
                break settle(ctx);
            }

            // 1. current input: the pending signal, the next byte, or end of stream
            let mut auto_eos = false;
            let input: u32 = if let Some(signal) = ctx.pending.take() {
                signal.ordinal()
            } else if let Some(byte) = ctx.input.next() {
                ctx.metrics.bytes += 1;
                byte as u32
            } else {
                if ctx.eos_raised {
                    break settle(ctx);
                }
                ctx.eos_raised = true;
                // the primary stream has ended; retention has nothing left to replay over
                ctx.input.release_marks();
                auto_eos = true;
                Signal::EOS.ordinal()
            };

            // 2-4. resolve the transition, recovering from domain errors through nul
            let (ordinal, state) = {
                let frame = ctx.frames.top().expect("frames checked non-empty");
                (frame.ordinal, frame.state)
            };
            let transducer = model.transducer(ordinal);
            let mut current = input;
            let cell = loop {
                let Some(class) = transducer.class_of(current) else {
                    return Err(TransductionError::SignalOutOfRange(current));
                };
                let cell = transducer.cell(state, class);
                if !cell.is_void() {
                    break cell;
                }
                if auto_eos {
                    // an unconsumed auto-raised eos is not a domain error; just settle
                    break Cell::VOID;
                }
                if current == Signal::NUL.ordinal() {
                    return Err(TransductionError::DomainErrorUnrecoverable {
                        transducer: transducer.name().to_string(),
                        state,
                        input,
                    });
                }
                ctx.metrics.errors += 1;
                current = Signal::NUL.ordinal();
            };
            if cell.is_void() {
                break settle(ctx);
            }
            ctx.current_input = current;

            // 5. take the transition, then fire the effect vector in order
            ctx.frames.top_mut().expect("frames checked non-empty").state = cell.next;
            let mut flags = EffectFlags::NONE;
            if cell.effect != EMPTY_EFFECT {
                for entry in transducer.effect(cell.effect).iter() {
                    let effector = &mut effectors[entry.effector as usize];
                    let parameter = entry
                        .parameter
                        .map(|p| parameters.parameter(entry.effector, p));
                    match effector.invoke(target, ctx, parameter) {
                        Ok(result) => flags = flags.merge(result),
                        Err(source) => {
                            return Err(TransductionError::Effector {
                                effector: effector.name(),
                                source,
                            });
                        },
                    }
                }
            } else if cell.next == state && current < Signal::BASE {
                ctx.scan_self_loop(transducer, state);
            }

            // 6. settle the step
            if let Some(signal) = flags.queued_signal() {
                ctx.pending = Some(signal);
            }
            if flags.contains(EffectFlags::STOPPED) {
                ctx.reset_state();
                break Status::Stopped;
            }
            if flags.contains(EffectFlags::PAUSE) {
                break Status::Runnable;
            }
            if flags.contains(EffectFlags::TRANSDUCER_POPPED) && ctx.frames.is_empty() {
                break settle(ctx);
            }
        };

        self.status = status;
        Ok(status)
    }
}

/// Computes the status implied by the stack occupancy; a pending signal counts as input.
fn settle(ctx: &Transduction) -> Status {
    let input_empty = ctx.input.is_empty() && ctx.pending.is_none();
    match (ctx.frames.is_empty(), input_empty) {
        (true, true) => Status::Stopped,
        (true, false) => Status::Waiting,
        (false, true) => Status::Paused,
        (false, false) => Status::Runnable,
    }
}
