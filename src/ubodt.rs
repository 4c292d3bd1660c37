use crate::common;
use crate::graph::Network;
use crate::routing::Record;
use parking_lot::Mutex;
use pyo3::exceptions;
use pyo3::prelude::*;
use rayon::prelude::*;
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::sync::atomic::Ordering as AtomicOrdering;
use std::time::Instant;

/// Header row of the delimited-text table. `next_n` holds the first hop.
pub const CSV_HEADER: [&str; 6] = ["source", "target", "next_n", "prev_n", "next_e", "distance"];

/// Fixed binary layout of one record: four node indices, the first edge and the cost.
type BinaryRow = (i64, i64, i64, i64, i32, f64);

#[pyclass(eq, eq_int)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Binary,
    Json,
}

impl OutputFormat {
    /// A `.json` path always selects JSON; otherwise `binary` picks binary over CSV.
    pub fn from_path(path: &str, binary: bool) -> Self {
        if path.ends_with(".json") {
            OutputFormat::Json
        } else if binary {
            OutputFormat::Binary
        } else {
            OutputFormat::Csv
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Binary => "binary",
            OutputFormat::Json => "json",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    /// `None` lets rayon size the pool.
    Parallel { num_threads: Option<usize> },
}

impl ExecutionMode {
    pub fn from_flags(use_omp: bool, num_threads: Option<usize>) -> Self {
        if use_omp {
            ExecutionMode::Parallel { num_threads }
        } else {
            ExecutionMode::Sequential
        }
    }
}

/// Streaming destination for the records of one source at a time.
pub trait RecordSink {
    fn write_batch(&mut self, records: &[Record]) -> io::Result<()>;
    fn finish(&mut self) -> io::Result<()>;
}

/// `;` delimited text with a header row.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(inner: W) -> io::Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(CSV_HEADER)?;
        Ok(Self { writer })
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn write_batch(&mut self, records: &[Record]) -> io::Result<()> {
        for r in records {
            self.writer.write_record([
                r.source.to_string(),
                r.target.to_string(),
                r.first_n.to_string(),
                r.prev_n.to_string(),
                r.next_e.to_string(),
                r.cost.to_string(),
            ])?;
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Headerless little-endian stream of `BinaryRow` tuples.
pub struct BinarySink<W: Write> {
    writer: W,
}

impl<W: Write> BinarySink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> RecordSink for BinarySink<W> {
    fn write_batch(&mut self, records: &[Record]) -> io::Result<()> {
        for r in records {
            let next_e = i32::try_from(r.next_e).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Edge index {} does not fit the binary record layout.", r.next_e),
                )
            })?;
            let row: BinaryRow = (
                r.source as i64,
                r.target as i64,
                r.first_n as i64,
                r.prev_n as i64,
                next_e,
                r.cost,
            );
            bincode::serialize_into(&mut self.writer, &row).map_err(io::Error::other)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[derive(Deserialize)]
struct CsvRow {
    source: usize,
    target: usize,
    next_n: usize,
    prev_n: usize,
    next_e: usize,
    distance: f64,
}

impl From<CsvRow> for Record {
    fn from(row: CsvRow) -> Self {
        Record {
            source: row.source,
            target: row.target,
            first_n: row.next_n,
            prev_n: row.prev_n,
            next_e: row.next_e,
            cost: row.distance,
        }
    }
}

fn record_from_binary(row: BinaryRow) -> Record {
    let (source, target, first_n, prev_n, next_e, cost) = row;
    Record {
        source: source as usize,
        target: target as usize,
        first_n: first_n as usize,
        prev_n: prev_n as usize,
        next_e: next_e as usize,
        cost,
    }
}

fn build_pool(num_threads: Option<usize>) -> PyResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads.unwrap_or(0))
        .build()
        .map_err(|e| {
            exceptions::PyRuntimeError::new_err(format!("Failed to build thread pool: {}", e))
        })
}

impl Network {
    /// Streams the records of every source into `sink`.
    ///
    /// In parallel mode each source's batch is written under one lock, so batches never
    /// interleave, but batch order across sources is not defined.
    pub fn precompute_ubodt<S: RecordSink + Send>(
        &self,
        sink: &mut S,
        delta: f64,
        mode: ExecutionMode,
    ) -> PyResult<()> {
        common::check_delta(delta)?;
        let num_vertices = self.node_count();
        let step_size = common::progress_step(num_vertices);
        self.progress_init();
        match mode {
            ExecutionMode::Sequential => {
                for src_idx in 0..num_vertices {
                    if src_idx % step_size == 0 {
                        log::info!("Progress {} / {}", src_idx, num_vertices);
                    }
                    let records = self.source_records(src_idx, delta)?;
                    sink.write_batch(&records)?;
                    self.progress.fetch_add(1, AtomicOrdering::Relaxed);
                }
            }
            ExecutionMode::Parallel { num_threads } => {
                let pool = build_pool(num_threads)?;
                let guarded = Mutex::new(sink);
                pool.install(|| {
                    (0..num_vertices)
                        .into_par_iter()
                        .try_for_each(|src_idx| -> PyResult<()> {
                            let records = self.source_records(src_idx, delta)?;
                            guarded.lock().write_batch(&records)?;
                            let done = self.progress.fetch_add(1, AtomicOrdering::Relaxed) + 1;
                            if done % step_size == 0 {
                                log::info!("Progress {} / {}", done, num_vertices);
                            }
                            Ok(())
                        })
                })?;
            }
        }
        Ok(())
    }

    /// Builds the whole table in memory, in source order for both modes.
    pub fn collect_ubodt(&self, delta: f64, mode: ExecutionMode) -> PyResult<Vec<Record>> {
        common::check_delta(delta)?;
        let num_vertices = self.node_count();
        let step_size = common::progress_step(num_vertices);
        self.progress_init();
        let per_source = |src_idx: usize| -> PyResult<Vec<Record>> {
            let records = self.source_records(src_idx, delta)?;
            let done = self.progress.fetch_add(1, AtomicOrdering::Relaxed) + 1;
            if done % step_size == 0 {
                log::info!("Progress {} / {}", done, num_vertices);
            }
            Ok(records)
        };
        let batches: Vec<Vec<Record>> = match mode {
            ExecutionMode::Sequential => (0..num_vertices)
                .map(per_source)
                .collect::<PyResult<_>>()?,
            ExecutionMode::Parallel { num_threads } => {
                let pool = build_pool(num_threads)?;
                pool.install(|| {
                    (0..num_vertices)
                        .into_par_iter()
                        .map(per_source)
                        .collect::<PyResult<_>>()
                })?
            }
        };
        Ok(batches.into_iter().flatten().collect())
    }

    /// Generates the table at `path` and returns the status summary.
    pub fn generate_ubodt_with(
        &self,
        path: &str,
        delta: f64,
        format: OutputFormat,
        mode: ExecutionMode,
    ) -> PyResult<String> {
        common::check_delta(delta)?;
        let begin = Instant::now();
        log::info!("Start to generate UBODT with delta {}", delta);
        log::info!("Output format {}", format.name());
        match format {
            OutputFormat::Json => {
                let records = self.collect_ubodt(delta, mode)?;
                let mut writer = BufWriter::new(File::create(path)?);
                serde_json::to_writer(&mut writer, &records).map_err(io::Error::from)?;
                writer.flush()?;
            }
            OutputFormat::Csv => {
                let mut sink = CsvSink::new(BufWriter::new(File::create(path)?))?;
                self.precompute_ubodt(&mut sink, delta, mode)?;
                sink.finish()?;
            }
            OutputFormat::Binary => {
                let mut sink = BinarySink::new(BufWriter::new(File::create(path)?));
                self.precompute_ubodt(&mut sink, delta, mode)?;
                sink.finish()?;
            }
        }
        let time_spent = begin.elapsed().as_millis() as f64 / 1000.0;
        log::info!("UBODT written to {} in {} seconds", path, time_spent);
        Ok(common::status_summary(time_spent))
    }
}

#[pymethods]
impl Network {
    /// Generates a UBODT file. A `.json` filename forces JSON output regardless of `binary`.
    #[pyo3(signature = (filename, delta, binary=true, use_omp=false, num_threads=None))]
    pub fn generate_ubodt(
        &self,
        filename: &str,
        delta: f64,
        binary: bool,
        use_omp: bool,
        num_threads: Option<usize>,
        py: Python,
    ) -> PyResult<String> {
        let format = OutputFormat::from_path(filename, binary);
        let mode = ExecutionMode::from_flags(use_omp, num_threads);
        py.allow_threads(move || self.generate_ubodt_with(filename, delta, format, mode))
    }

    #[pyo3(signature = (filename, delta, format, use_omp=false, num_threads=None))]
    pub fn generate_ubodt_as(
        &self,
        filename: &str,
        delta: f64,
        format: OutputFormat,
        use_omp: bool,
        num_threads: Option<usize>,
        py: Python,
    ) -> PyResult<String> {
        let mode = ExecutionMode::from_flags(use_omp, num_threads);
        py.allow_threads(move || self.generate_ubodt_with(filename, delta, format, mode))
    }
}

/// Loads a table written in any of the three formats.
pub fn read_records(path: &str, format: OutputFormat) -> PyResult<Vec<Record>> {
    match format {
        OutputFormat::Csv => {
            let mut reader = csv::ReaderBuilder::new()
                .delimiter(b';')
                .has_headers(true)
                .from_path(path)
                .map_err(io::Error::from)?;
            let mut records = Vec::new();
            for row in reader.deserialize::<CsvRow>() {
                records.push(Record::from(row.map_err(io::Error::from)?));
            }
            Ok(records)
        }
        OutputFormat::Binary => {
            let mut reader = BufReader::new(File::open(path)?);
            let mut records = Vec::new();
            while !reader.fill_buf()?.is_empty() {
                let row: BinaryRow =
                    bincode::deserialize_from(&mut reader).map_err(io::Error::other)?;
                records.push(record_from_binary(row));
            }
            Ok(records)
        }
        OutputFormat::Json => {
            let reader = BufReader::new(File::open(path)?);
            let records: Vec<Record> =
                serde_json::from_reader(reader).map_err(io::Error::from)?;
            Ok(records)
        }
    }
}

#[pyfunction]
#[pyo3(signature = (filename, binary=true))]
pub fn read_ubodt(filename: &str, binary: bool) -> PyResult<Vec<Record>> {
    read_records(filename, OutputFormat::from_path(filename, binary))
}
