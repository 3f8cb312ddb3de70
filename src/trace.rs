//! Append-only persistence of per-iteration scalars and posterior-mean grids.
//!
//! One text stream per tracked scalar, opened once at run start and held for the
//! whole run. Each line is `iteration<TAB>value`; on rejected iterations the
//! carried-forward values repeat verbatim, so every stream holds exactly one
//! line per iteration. Streams are appended to if they already exist and are
//! never truncated mid-run, which keeps a partial trace valid and inspectable
//! after a fatal error.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use itertools::Itertools;

use crate::chain::IterationRecord;
use crate::surface::Surface;

/// Tracked scalar streams, in record order.
const STREAMS: [&str; 7] = [
    "accept_rain.txt",
    "accept_erod.txt",
    "accept_m.txt",
    "accept_n.txt",
    "accept_tau_elev.txt",
    "accept_tau_erodep.txt",
    "accept_likl.txt",
];

struct TraceStream {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl TraceStream {
    fn open(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open trace stream {}", path.display()))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    fn append(&mut self, iteration: usize, value: f64) -> Result<()> {
        writeln!(self.writer, "{iteration}\t{value}")
            .with_context(|| format!("failed to append to trace stream {}", self.path.display()))
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("failed to flush trace stream {}", self.path.display()))
    }
}

impl Drop for TraceStream {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Persists the committed scalars of every iteration.
pub struct TraceRecorder {
    streams: Vec<TraceStream>,
}

impl TraceRecorder {
    /// Open all scalar streams under `dir`, creating the directory and any
    /// missing files.
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        let streams = STREAMS
            .iter()
            .map(|name| TraceStream::open(dir.join(name)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { streams })
    }

    /// Append one line per stream for this iteration.
    ///
    /// Any failure is fatal to the run: the chain must abort rather than
    /// continue with a gap in its provenance.
    pub fn record(&mut self, record: &IterationRecord) -> Result<()> {
        let values = [
            record.params.rain,
            record.params.erodibility,
            record.params.m,
            record.params.n,
            record.tau_elev,
            record.tau_erodep,
            record.log_likelihood,
        ];
        for (stream, value) in self.streams.iter_mut().zip(values) {
            stream.append(record.iteration, value)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        for stream in &mut self.streams {
            stream.flush()?;
        }
        Ok(())
    }
}

/// Write a posterior-mean grid as fixed-point text, one row per line.
pub fn write_mean_grid(path: &Path, grid: &Surface, precision: usize) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create mean grid file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for row in grid.rows() {
        let line = row.iter().map(|v| format!("{v:.precision$}")).join(" ");
        writeln!(writer, "{line}")
            .with_context(|| format!("failed to write mean grid file {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush mean grid file {}", path.display()))
}
