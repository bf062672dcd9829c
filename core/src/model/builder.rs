use alloc::{
    collections::BTreeMap,
    string::{String, ToString},
    vec::Vec,
};

use crate::{
    Cell, EffectRef, EffectVector, Model, ModelError, Run, Signal, SignalTable, Token, Transducer,
    builtins,
};

// MODEL BUILDER
// ================================================================================================

/// Programmatic model assembly.
///
/// This is the in-process twin of the external pattern compiler's back end: it produces the
/// same [`Model`] the loader yields from a file, so the format and the engine can be exercised
/// end-to-end without compiled artifacts. Signals and effectors must be declared before the
/// transducers that reference them (the input alphabet width is fixed per transducer at
/// [`Self::add_transducer`] time).
pub struct ModelBuilder {
    target_name: String,
    signals: SignalTable,
    effectors: Vec<String>,
    parameters: Vec<Vec<Vec<Token>>>,
    transducers: Vec<Transducer>,
}

impl ModelBuilder {
    /// Starts a model for the given target class, with the reserved signals and the built-in
    /// effector table in place.
    pub fn new(target_name: &str) -> Self {
        ModelBuilder {
            target_name: target_name.to_string(),
            signals: SignalTable::new(),
            effectors: builtins::NAMES.iter().map(|n| n.to_string()).collect(),
            parameters: vec![Vec::new(); builtins::NAMES.len()],
            transducers: Vec::new(),
        }
    }

    /// Defines a signal (idempotent) and returns its assignment.
    pub fn signal(&mut self, name: &str) -> Signal {
        self.signals.define(name)
    }

    /// Appends a target-supplied effector name and returns its ordinal.
    pub fn effector(&mut self, name: &str) -> u16 {
        if let Some(ordinal) = self.effectors.iter().position(|n| n == name) {
            return ordinal as u16;
        }
        self.effectors.push(name.to_string());
        self.parameters.push(Vec::new());
        (self.effectors.len() - 1) as u16
    }

    /// Registers a parameter token list for `effector` and returns its parameter index.
    ///
    /// Identical lists are shared.
    pub fn parameter(&mut self, effector: u16, tokens: Vec<Token>) -> u32 {
        let lists = &mut self.parameters[effector as usize];
        if let Some(index) = lists.iter().position(|l| *l == tokens) {
            return index as u32;
        }
        lists.push(tokens);
        (lists.len() - 1) as u32
    }

    /// Compiles and appends a transducer; returns its ordinal.
    pub fn add_transducer(&mut self, builder: TransducerBuilder) -> Result<u32, ModelError> {
        if self.transducers.iter().any(|t| t.name() == builder.name) {
            return Err(ModelError::DuplicateTransducer(builder.name));
        }
        let transducer = builder.build(256 + self.signals.len());
        transducer.validate().map_err(|reason| ModelError::InvalidTransducer {
            transducer: transducer.name().to_string(),
            reason,
        })?;
        self.transducers.push(transducer);
        Ok((self.transducers.len() - 1) as u32)
    }

    /// Finishes the model, running the same validation the loader applies.
    pub fn build(self) -> Result<Model, ModelError> {
        let model = Model {
            target_name: self.target_name,
            version_note: super::VERSION_NOTE.to_string(),
            signals: self.signals,
            effectors: self.effectors,
            transducers: self.transducers,
            parameters: self.parameters,
        };
        model.validate()?;
        Ok(model)
    }
}

// TRANSDUCER BUILDER
// ================================================================================================

/// Assembles one transducer from a dense transition listing.
///
/// Transitions are declared over raw input ordinals (bytes and signals); [`Self::build`]
/// computes the input-equivalence partition, folds identical columns into classes, and
/// run-length encodes the kernel rows. Later declarations overwrite earlier ones, so broad
/// strokes (`any_byte`) go first and refinements after.
pub struct TransducerBuilder {
    name: String,
    start_state: u32,
    state_count: u32,
    transitions: BTreeMap<(u32, u32), Cell>,
    effects: Vec<EffectVector>,
    fields: Vec<Vec<u8>>,
}

impl TransducerBuilder {
    pub fn new(name: &str) -> Self {
        TransducerBuilder {
            name: name.to_string(),
            start_state: 0,
            state_count: 1,
            transitions: BTreeMap::new(),
            effects: vec![EffectVector::empty()],
            fields: vec![Vec::new()],
        }
    }

    /// Sets the initial state (default 0).
    pub fn start_state(&mut self, state: u32) -> &mut Self {
        self.start_state = state;
        self.note_state(state);
        self
    }

    /// Declares a named field and returns its local ordinal (the anonymous field is 0).
    pub fn field(&mut self, name: &str) -> u32 {
        let name = name.as_bytes();
        if let Some(ordinal) = self.fields.iter().position(|f| f == name) {
            return ordinal as u32;
        }
        self.fields.push(name.to_vec());
        (self.fields.len() - 1) as u32
    }

    /// Registers an effect vector and returns its id; the empty vector is always id 0.
    ///
    /// Identical vectors are shared.
    pub fn effect(&mut self, entries: &[EffectRef]) -> u32 {
        let vector: EffectVector = entries.into();
        if let Some(id) = self.effects.iter().position(|e| *e == vector) {
            return id as u32;
        }
        self.effects.push(vector);
        (self.effects.len() - 1) as u32
    }

    /// Declares the transition `(state, input) -> (next, effect)`.
    pub fn transition(&mut self, state: u32, input: u32, next: u32, effect: u32) -> &mut Self {
        self.note_state(state);
        self.note_state(next);
        self.transitions.insert((state, input), Cell { next, effect });
        self
    }

    /// Declares a transition on one byte.
    pub fn byte(&mut self, state: u32, byte: u8, next: u32, effect: u32) -> &mut Self {
        self.transition(state, byte as u32, next, effect)
    }

    /// Declares the same transition for every byte in `bytes`.
    pub fn bytes(
        &mut self,
        state: u32,
        bytes: impl IntoIterator<Item = u8>,
        next: u32,
        effect: u32,
    ) -> &mut Self {
        for b in bytes {
            self.byte(state, b, next, effect);
        }
        self
    }

    /// Declares the same transition for all 256 bytes.
    pub fn any_byte(&mut self, state: u32, next: u32, effect: u32) -> &mut Self {
        self.bytes(state, 0..=u8::MAX, next, effect)
    }

    /// Declares a transition on a signal.
    pub fn signal(&mut self, state: u32, signal: Signal, next: u32, effect: u32) -> &mut Self {
        self.transition(state, signal.ordinal(), next, effect)
    }

    fn note_state(&mut self, state: u32) {
        self.state_count = self.state_count.max(state + 1);
    }

    /// Partitions the input alphabet into equivalence classes and run-length encodes the
    /// kernel rows.
    pub(crate) fn build(self, input_width: usize) -> Transducer {
        let states = self.state_count as usize;

        // group identical columns; class numbering follows first appearance so the partition
        // is deterministic for a given transition listing
        let mut class_of_column: BTreeMap<Vec<(u32, u32)>, u16> = BTreeMap::new();
        let mut input_equivalents = Vec::with_capacity(input_width);
        let mut columns: Vec<Vec<Cell>> = Vec::new();
        for input in 0..input_width as u32 {
            let column: Vec<Cell> = (0..states as u32)
                .map(|state| {
                    self.transitions.get(&(state, input)).copied().unwrap_or(Cell::VOID)
                })
                .collect();
            let key: Vec<(u32, u32)> = column.iter().map(|c| (c.next, c.effect)).collect();
            let next_class = columns.len() as u16;
            let class = *class_of_column.entry(key).or_insert_with(|| {
                columns.push(column);
                next_class
            });
            input_equivalents.push(class);
        }
        let class_count = columns.len() as u32;

        let mut rows = Vec::with_capacity(states);
        for state in 0..states {
            let mut row: Vec<Run> = Vec::new();
            for column in &columns {
                let cell = column[state];
                match row.last_mut() {
                    Some(run) if run.cell == cell => run.length += 1,
                    _ => row.push(Run { length: 1, cell }),
                }
            }
            rows.push(row.into_boxed_slice());
        }

        Transducer::new(
            self.name,
            states as u32,
            class_count,
            input_equivalents.into_boxed_slice(),
            rows,
            self.effects,
            self.fields,
            self.start_state,
        )
    }
}
