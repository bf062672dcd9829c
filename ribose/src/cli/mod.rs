use std::{
    cell::RefCell,
    fs::File,
    io::{BufWriter, Read, Write},
    path::PathBuf,
    rc::Rc,
};

use clap::Parser;
use ribose_core::{Model, ModelError};
use ribose_processor::{
    BasicTarget, EffectorError, Metrics, OutputSink, Runtime, Signal, Status, TransductionError,
};

// ERRORS
// ================================================================================================

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("cannot load model")]
    Model(#[from] ModelError),
    #[error("transduction failed")]
    Transduction(#[from] TransductionError),
    #[error("transducer '{0}' is not in the model")]
    UnknownTransducer(String),
    #[error("stream I/O failure")]
    Io(#[from] std::io::Error),
}

// ENVIRONMENT KNOBS
// ================================================================================================

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Streaming buffer sizes; these shape the I/O glue only, never the engine semantics.
fn buffer_size(variable: &str) -> usize {
    std::env::var(variable)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|&size| size > 0)
        .unwrap_or(DEFAULT_BUFFER_SIZE)
}

// SHARED SINK
// ================================================================================================

/// A cloneable handle over the buffered output writer, so the sink installed on the
/// transductor can still be flushed after the run.
#[derive(Clone)]
struct SharedSink(Rc<RefCell<BufWriter<Box<dyn Write>>>>);

impl SharedSink {
    fn new(writer: Box<dyn Write>, capacity: usize) -> Self {
        SharedSink(Rc::new(RefCell::new(BufWriter::with_capacity(capacity, writer))))
    }

    fn flush(&self) -> std::io::Result<()> {
        self.0.borrow_mut().flush()
    }
}

impl OutputSink for SharedSink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), EffectorError> {
        self.0.borrow_mut().write_all(bytes)?;
        Ok(())
    }
}

// RUN
// ================================================================================================

/// Streams a byte source through one transducer of a model.
#[derive(Debug, Clone, Parser)]
#[command(about = "Run a transducer from a model against a byte stream")]
pub struct Run {
    /// Path to the compiled model file
    #[arg(value_parser)]
    model_file: PathBuf,

    /// Name of the transducer to start
    transducer: String,

    /// Input file; standard input when omitted
    #[arg(value_parser)]
    input_file: Option<PathBuf>,

    /// Output file; standard output when omitted
    #[arg(value_parser)]
    output_file: Option<PathBuf>,

    /// Inject a nil prologue signal before the first input byte
    #[arg(long = "nil")]
    nil: bool,
}

impl Run {
    pub fn execute(&self) -> Result<(), CliError> {
        let model = Model::load(&self.model_file)?;
        let runtime = Runtime::new(model, BasicTarget)?;
        let mut trex = runtime.transductor(BasicTarget)?;

        let writer: Box<dyn Write> = match &self.output_file {
            Some(path) => Box::new(File::create(path)?),
            None => Box::new(std::io::stdout()),
        };
        let sink = SharedSink::new(writer, buffer_size("RIBOSE_OUTBUFFER_SIZE"));
        trex.output(Box::new(sink.clone()));

        let mut reader: Box<dyn Read> = match &self.input_file {
            Some(path) => Box::new(File::open(path)?),
            None => Box::new(std::io::stdin()),
        };

        trex.start(&self.transducer)?;
        if self.nil {
            trex.signal(Signal::NIL)?;
        }

        // the recycle handshake: reuse the carrier buffer unless the mark set retained it
        let chunk = buffer_size("RIBOSE_INBUFFER_SIZE");
        let mut carrier = ribose_processor::BytesMut::with_capacity(chunk);
        let mut metrics = Metrics::default();
        loop {
            carrier.resize(chunk, 0);
            let n = reader.read(&mut carrier)?;
            if n == 0 {
                break;
            }
            carrier.truncate(n);
            let frame = carrier.freeze();
            trex.push(frame.clone(), n)?;
            while trex.run()? == Status::Runnable {}
            carrier = trex.recycle(frame);
        }
        // end of stream: let the transduction observe eos and wind down
        while trex.run()? == Status::Runnable {}

        trex.metrics(&mut metrics);
        tracing::info!(
            bytes = metrics.bytes,
            errors = metrics.errors,
            scanned = metrics.scanned,
            marked = metrics.marked,
            "transduction finished"
        );
        sink.flush()?;
        Ok(())
    }
}

// DECOMPILE
// ================================================================================================

/// Dumps the input-equivalence partition and RLE kernel rows of one transducer.
#[derive(Debug, Clone, Parser)]
#[command(about = "Dump a transducer's equivalence partition and kernel rows")]
pub struct Decompile {
    /// Path to the compiled model file
    #[arg(value_parser)]
    model_file: PathBuf,

    /// Name of the transducer to dump
    transducer: String,
}

impl Decompile {
    pub fn execute(&self) -> Result<(), CliError> {
        let model = Model::load(&self.model_file)?;
        let ordinal = model
            .transducer_ordinal(&self.transducer)
            .ok_or_else(|| CliError::UnknownTransducer(self.transducer.clone()))?;
        let mut text = String::new();
        model.transducer(ordinal).dump(&mut text);
        print!("{text}");
        Ok(())
    }
}

// TESTS
// ================================================================================================
