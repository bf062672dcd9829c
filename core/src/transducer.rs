use alloc::{
    boxed::Box,
    string::{String, ToString},
    vec::Vec,
};
use core::fmt::Write;

use winter_utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable};

use crate::effect::EffectVector;

// CONSTANTS
// ================================================================================================

/// Sentinel "no transition" state. A kernel cell whose next state is `NO_STATE` triggers
/// domain-error recovery in the engine; its effect id must be 0.
pub const NO_STATE: u32 = u32::MAX;

/// Cell-count threshold below which a kernel is expanded from RLE rows into a flat matrix.
///
/// Above the threshold the RLE rows are scanned directly; rows hot enough to matter are short
/// after run-length compression, so the scan stays cache-resident.
const FLAT_CELL_LIMIT: usize = 1 << 20;

// KERNEL CELLS
// ================================================================================================

/// One kernel matrix entry: the successor state and the effect vector to dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    pub next: u32,
    pub effect: u32,
}

impl Cell {
    /// The "no transition" cell.
    pub const VOID: Cell = Cell { next: NO_STATE, effect: 0 };

    /// Returns true if this cell denotes the absence of a transition.
    pub const fn is_void(&self) -> bool {
        self.next == NO_STATE
    }
}

/// A run of identical cells across consecutive equivalence classes of one kernel row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Run {
    pub length: u32,
    pub cell: Cell,
}

// TRANSDUCER
// ================================================================================================

/// One compiled transducer: a minimal deterministic automaton over bytes and signals whose
/// transitions carry effect vectors.
///
/// The transition matrix is factored through an input-equivalence partition: the
/// `input_equivalents` map folds the `256 + S` input ordinals into `E` classes, and the kernel
/// holds one row of `E` cells per state, run-length encoded. Instances are immutable after
/// construction and shared read-only across transductors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transducer {
    name: String,
    state_count: u32,
    class_count: u32,
    input_equivalents: Box<[u16]>,
    rows: Vec<Box<[Run]>>,
    flat: Option<Box<[Cell]>>,
    effects: Vec<EffectVector>,
    fields: Vec<Vec<u8>>,
    start_state: u32,
}

impl Transducer {
    /// Assembles a transducer from its component tables.
    ///
    /// `fields` must carry the anonymous field (empty name) at ordinal 0; `effects` must carry
    /// the empty vector at id 0. Kernels small enough for a flat matrix are expanded eagerly.
    pub(crate) fn new(
        name: String,
        state_count: u32,
        class_count: u32,
        input_equivalents: Box<[u16]>,
        rows: Vec<Box<[Run]>>,
        effects: Vec<EffectVector>,
        fields: Vec<Vec<u8>>,
        start_state: u32,
    ) -> Self {
        let mut transducer = Transducer {
            name,
            state_count,
            class_count,
            input_equivalents,
            rows,
            flat: None,
            effects,
            fields,
            start_state,
        };
        transducer.expand();
        transducer
    }

    // ACCESSORS
    // --------------------------------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state_count(&self) -> u32 {
        self.state_count
    }

    pub fn class_count(&self) -> u32 {
        self.class_count
    }

    pub fn start_state(&self) -> u32 {
        self.start_state
    }

    /// Returns the number of input ordinals the equivalence map covers (256 + signal count).
    pub fn input_count(&self) -> usize {
        self.input_equivalents.len()
    }

    /// Returns the equivalence class of the given input ordinal, or `None` for an ordinal
    /// outside the alphabet this transducer was compiled against.
    #[inline(always)]
    pub fn class_of(&self, input: u32) -> Option<u16> {
        self.input_equivalents.get(input as usize).copied()
    }

    /// Returns the kernel cell for `(state, class)`.
    ///
    /// Flat kernels index directly; larger kernels scan the RLE row.
    #[inline(always)]
    pub fn cell(&self, state: u32, class: u16) -> Cell {
        if let Some(flat) = &self.flat {
            return flat[state as usize * self.class_count as usize + class as usize];
        }
        let mut remaining = class as u32;
        for run in self.rows[state as usize].iter() {
            if remaining < run.length {
                return run.cell;
            }
            remaining -= run.length;
        }
        Cell::VOID
    }

    /// Returns the effect vector with the given id.
    pub fn effect(&self, id: u32) -> &EffectVector {
        &self.effects[id as usize]
    }

    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }

    /// Returns the number of fields, the anonymous field included.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Returns the local ordinal of the named field. The empty name is the anonymous field.
    pub fn field_ordinal(&self, name: &[u8]) -> Option<u32> {
        self.fields.iter().position(|f| f == name).map(|i| i as u32)
    }

    pub fn field_name(&self, ordinal: u32) -> Option<&[u8]> {
        self.fields.get(ordinal as usize).map(Vec::as_slice)
    }

    // VALIDATION
    // --------------------------------------------------------------------------------------------

    /// Checks internal consistency; returns a reason string on the first violation.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.state_count == 0 {
            return Err("no states".to_string());
        }
        if self.start_state >= self.state_count {
            return Err("start state out of range".to_string());
        }
        if self.input_equivalents.len() < 256 {
            return Err("input equivalence map shorter than the byte alphabet".to_string());
        }
        if self.effects.is_empty() || !self.effects[0].is_empty() {
            return Err("effect vector 0 must be the empty vector".to_string());
        }
        if self.fields.first().map(Vec::as_slice) != Some(&[][..]) {
            return Err("field 0 must be anonymous".to_string());
        }
        for (input, &class) in self.input_equivalents.iter().enumerate() {
            if class as u32 >= self.class_count {
                return Err(format!("input {input} maps to out-of-range class {class}"));
            }
        }
        if self.rows.len() != self.state_count as usize {
            return Err("kernel row count disagrees with state count".to_string());
        }
        for (state, row) in self.rows.iter().enumerate() {
            let width: u64 = row.iter().map(|r| r.length as u64).sum();
            if width != self.class_count as u64 {
                return Err(format!("kernel row {state} covers {width} classes"));
            }
            for run in row.iter() {
                if run.cell.is_void() {
                    if run.cell.effect != 0 {
                        return Err(format!("void cell with effect in row {state}"));
                    }
                } else if run.cell.next >= self.state_count {
                    return Err(format!("row {state} references state {}", run.cell.next));
                }
                if run.cell.effect as usize >= self.effects.len() {
                    return Err(format!("row {state} references effect {}", run.cell.effect));
                }
            }
        }
        Ok(())
    }

    // KERNEL EXPANSION
    // --------------------------------------------------------------------------------------------

    fn expand(&mut self) {
        let cells = self.state_count as usize * self.class_count as usize;
        if cells == 0 || cells > FLAT_CELL_LIMIT {
            return;
        }
        let mut flat = Vec::with_capacity(cells);
        for row in &self.rows {
            for run in row.iter() {
                for _ in 0..run.length {
                    flat.push(run.cell);
                }
            }
        }
        debug_assert_eq!(flat.len(), cells);
        self.flat = Some(flat.into_boxed_slice());
    }

    // DECOMPILATION
    // --------------------------------------------------------------------------------------------

    /// Writes a human-readable dump of the equivalence partition and RLE kernel rows.
    pub fn dump(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "transducer {} [{} states, {} classes, {} inputs, start {}]",
            self.name,
            self.state_count,
            self.class_count,
            self.input_equivalents.len(),
            self.start_state
        );
        let _ = writeln!(out, "input equivalence:");
        for class in 0..self.class_count as u16 {
            let mut members = String::new();
            let mut run: Option<(u32, u32)> = None;
            for (input, &c) in self.input_equivalents.iter().enumerate() {
                let input = input as u32;
                if c == class {
                    run = match run {
                        None => Some((input, input)),
                        Some((lo, hi)) if hi + 1 == input => Some((lo, input)),
                        Some(span) => {
                            push_span(&mut members, span);
                            Some((input, input))
                        },
                    };
                }
            }
            if let Some(span) = run {
                push_span(&mut members, span);
            }
            let _ = writeln!(out, "  {class}: {members}");
        }
        let _ = writeln!(out, "kernel:");
        for (state, row) in self.rows.iter().enumerate() {
            let _ = write!(out, "  {state}:");
            for r in row.iter() {
                if r.cell.is_void() {
                    let _ = write!(out, " {}*-", r.length);
                } else {
                    let _ = write!(out, " {}*({} {})", r.length, r.cell.next, r.cell.effect);
                }
            }
            let _ = writeln!(out);
        }
    }
}

fn push_span(out: &mut String, (lo, hi): (u32, u32)) {
    if !out.is_empty() {
        out.push(' ');
    }
    let _ = if lo == hi {
        write!(out, "{}", describe_input(lo))
    } else {
        write!(out, "{}-{}", describe_input(lo), describe_input(hi))
    };
}

fn describe_input(input: u32) -> String {
    match input {
        0x21..=0x7e => format!("'{}'", input as u8 as char),
        0..=0xff => format!("{input:#04x}"),
        signal => format!("!{signal}"),
    }
}

// SERIALIZATION
// ================================================================================================

impl Serializable for Transducer {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        target.write_u16(self.name.len() as u16);
        target.write_bytes(self.name.as_bytes());
        target.write_u32(self.state_count);
        target.write_u32(self.class_count);
        target.write_u32(self.start_state);

        // one byte per equivalence entry when the class space allows it
        target.write_u32(self.input_equivalents.len() as u32);
        let wide = self.class_count > 256;
        for &class in self.input_equivalents.iter() {
            if wide {
                target.write_u16(class);
            } else {
                target.write_u8(class as u8);
            }
        }

        for row in &self.rows {
            target.write_u32(row.len() as u32);
            for run in row.iter() {
                target.write_u32(run.length);
                target.write_u32(run.cell.next);
                target.write_u32(run.cell.effect);
            }
        }

        target.write_u32(self.effects.len() as u32);
        for effect in &self.effects {
            effect.write_into(target);
        }

        target.write_u16(self.fields.len() as u16);
        for field in &self.fields {
            target.write_u16(field.len() as u16);
            target.write_bytes(field);
        }
    }
}

impl Deserializable for Transducer {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        let name_len = source.read_u16()? as usize;
        let name = String::from_utf8(source.read_vec(name_len)?).map_err(|_| {
            DeserializationError::InvalidValue("transducer name is not UTF-8".to_string())
        })?;
        let state_count = source.read_u32()?;
        let class_count = source.read_u32()?;
        let start_state = source.read_u32()?;

        let input_count = source.read_u32()? as usize;
        let wide = class_count > 256;
        let mut input_equivalents = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            let class = if wide { source.read_u16()? } else { source.read_u8()? as u16 };
            input_equivalents.push(class);
        }

        let mut rows = Vec::with_capacity(state_count as usize);
        for _ in 0..state_count {
            let run_count = source.read_u32()? as usize;
            let mut row = Vec::with_capacity(run_count);
            for _ in 0..run_count {
                let length = source.read_u32()?;
                let next = source.read_u32()?;
                let effect = source.read_u32()?;
                row.push(Run { length, cell: Cell { next, effect } });
            }
            rows.push(row.into_boxed_slice());
        }

        let effect_count = source.read_u32()? as usize;
        let mut effects = Vec::with_capacity(effect_count);
        for _ in 0..effect_count {
            effects.push(EffectVector::read_from(source)?);
        }

        let field_count = source.read_u16()? as usize;
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            let len = source.read_u16()? as usize;
            fields.push(source.read_vec(len)?);
        }

        let transducer = Transducer::new(
            name,
            state_count,
            class_count,
            input_equivalents.into_boxed_slice(),
            rows,
            effects,
            fields,
            start_state,
        );
        transducer
            .validate()
            .map_err(|reason| DeserializationError::InvalidValue(reason.to_string()))?;
        Ok(transducer)
    }
}

// TESTS
// ================================================================================================
