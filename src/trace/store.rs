//! Trace file reading and writing.
//!
//! A trace file is a flat sequence of JSON-encoded [`TraceRecord`]s, each
//! length-delimited with the agent's frame format. Records come in
//! ENTRY/EXIT pairs.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::record::TraceRecord;
use crate::ipc::framing::{recv_frame, send_frame, FrameError};

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Failed to open trace {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Trace framing error after {records} records: {source}")]
    Frame {
        records: usize,
        #[source]
        source: FrameError,
    },

    #[error("Malformed trace record: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to replace {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result of reading two records.
#[derive(Debug, Clone, PartialEq)]
pub enum TracePair {
    Complete { call: TraceRecord, result: TraceRecord },
    /// The file ended after the first record of a pair.
    Dangling(TraceRecord),
}

/// Sequential reader over a trace.
pub struct TraceReader<R> {
    reader: R,
    records_read: usize,
    done: bool,
}

impl TraceReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, TraceError> {
        let file = File::open(path).map_err(|source| TraceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            records_read: 0,
            done: false,
        }
    }

    /// Next record, or `None` at a clean end of file.
    pub fn next_record(&mut self) -> Result<Option<TraceRecord>, TraceError> {
        let bytes = match recv_frame(&mut self.reader) {
            Ok(bytes) => bytes,
            Err(FrameError::PeerClosed) => return Ok(None),
            Err(source) => {
                return Err(TraceError::Frame {
                    records: self.records_read,
                    source,
                })
            }
        };
        let record = serde_json::from_slice(&bytes)?;
        self.records_read += 1;
        Ok(Some(record))
    }

    /// Next two records, or `None` at a clean end of file.
    pub fn next_pair(&mut self) -> Result<Option<TracePair>, TraceError> {
        let Some(call) = self.next_record()? else {
            return Ok(None);
        };
        match self.next_record()? {
            Some(result) => Ok(Some(TracePair::Complete { call, result })),
            None => Ok(Some(TracePair::Dangling(call))),
        }
    }

    pub fn records_read(&self) -> usize {
        self.records_read
    }
}

impl<R: Read> Iterator for TraceReader<R> {
    type Item = Result<TraceRecord, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Sequential writer producing a trace.
pub struct TraceWriter<W: Write> {
    writer: W,
    records_written: usize,
}

impl TraceWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, TraceError> {
        let file = File::create(path).map_err(|source| TraceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> TraceWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            records_written: 0,
        }
    }

    pub fn append(&mut self, record: &TraceRecord) -> Result<(), TraceError> {
        let bytes = serde_json::to_vec(record)?;
        send_frame(&mut self.writer, &bytes).map_err(|source| TraceError::Frame {
            records: self.records_written,
            source,
        })?;
        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, TraceError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Read an entire trace into memory.
pub fn read_trace(path: &Path) -> Result<Vec<TraceRecord>, TraceError> {
    TraceReader::open(path)?.collect()
}

/// Write `records` as a new trace at `path`.
pub fn write_trace(path: &Path, records: &[TraceRecord]) -> Result<(), TraceError> {
    let mut writer = TraceWriter::create(path)?;
    for record in records {
        writer.append(record)?;
    }
    writer.finish()?;
    Ok(())
}

/// Replace the trace at `path` with `records`.
///
/// Records go to a temp file in the same directory which is then renamed over
/// the original, so readers never observe a half-written trace.
pub fn rewrite_trace(path: &Path, records: &[TraceRecord]) -> Result<(), TraceError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = TraceWriter::new(BufWriter::new(tmp.as_file_mut()));
        for record in records {
            writer.append(record)?;
        }
        writer.finish()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| TraceError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
