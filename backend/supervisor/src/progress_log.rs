//! Bounded, append-only progress log shared between the output relay and
//! status pollers.
//!
//! The log hands out exactly one [`ProgressWriter`] per run. Starting a new run
//! clears the log and invalidates the previous writer, so output from a
//! superseded run can never leak into the current one. Pollers only ever get a
//! [`ProgressReader`].

use boxinstall_core::ProgressRecord;
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Default number of records kept in memory.
pub const DEFAULT_CAPACITY: usize = 200;

struct LogInner {
    /// Records paired with their sequence number.
    records: VecDeque<(u64, ProgressRecord)>,
    capacity: usize,
    next_seq: u64,
    generation: u64,
}

/// Owner handle: can start runs and hand out readers.
#[derive(Clone)]
pub struct ProgressLog {
    inner: Arc<RwLock<LogInner>>,
    mirror_path: Option<PathBuf>,
}

/// Read-only view used by the status API.
#[derive(Clone)]
pub struct ProgressReader {
    inner: Arc<RwLock<LogInner>>,
}

/// The single write side for one run. Not `Clone`.
pub struct ProgressWriter {
    inner: Arc<RwLock<LogInner>>,
    generation: u64,
    mirror: Option<BufWriter<File>>,
}

/// Records at or after a sequence number, plus the cursor for the next poll.
#[derive(Debug, Clone, Serialize)]
pub struct LogSlice {
    pub records: Vec<ProgressRecord>,
    pub next: u64,
}

fn read(inner: &RwLock<LogInner>) -> RwLockReadGuard<'_, LogInner> {
    inner.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(inner: &RwLock<LogInner>) -> RwLockWriteGuard<'_, LogInner> {
    inner.write().unwrap_or_else(PoisonError::into_inner)
}

impl ProgressLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LogInner {
                records: VecDeque::with_capacity(capacity.max(1)),
                capacity: capacity.max(1),
                next_seq: 0,
                generation: 0,
            })),
            mirror_path: None,
        }
    }

    /// Also append every record as NDJSON to `path`, truncated on each run.
    pub fn with_mirror(mut self, path: impl Into<PathBuf>) -> Self {
        self.mirror_path = Some(path.into());
        self
    }

    pub fn reader(&self) -> ProgressReader {
        ProgressReader {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Clear the log and return the writer for a new run.
    ///
    /// Any writer handed out earlier becomes stale and its appends are dropped.
    pub fn begin_run(&self) -> ProgressWriter {
        let generation = {
            let mut inner = write(&self.inner);
            inner.records.clear();
            inner.next_seq = 0;
            inner.generation += 1;
            inner.generation
        };
        debug!(generation, "Progress log reset");

        let mirror = self.mirror_path.as_ref().and_then(|path| {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                let _ = std::fs::create_dir_all(parent);
            }
            match File::create(path) {
                Ok(file) => Some(BufWriter::new(file)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot open progress log file");
                    None
                }
            }
        });

        ProgressWriter {
            inner: Arc::clone(&self.inner),
            generation,
            mirror,
        }
    }
}

impl ProgressReader {
    /// Every retained record, oldest first.
    pub fn snapshot(&self) -> Vec<ProgressRecord> {
        read(&self.inner)
            .records
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Retained records with sequence number `>= seq`.
    pub fn since(&self, seq: u64) -> LogSlice {
        let inner = read(&self.inner);
        LogSlice {
            records: inner
                .records
                .iter()
                .filter(|(s, _)| *s >= seq)
                .map(|(_, r)| r.clone())
                .collect(),
            next: inner.next_seq,
        }
    }

    pub fn len(&self) -> usize {
        read(&self.inner).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<ProgressRecord> {
        read(&self.inner).records.back().map(|(_, r)| r.clone())
    }
}

impl ProgressWriter {
    /// Append one record, evicting the oldest past capacity.
    ///
    /// Returns `false` when this writer belongs to a superseded run.
    pub fn append(&mut self, record: ProgressRecord) -> bool {
        {
            let mut inner = write(&self.inner);
            if inner.generation != self.generation {
                return false;
            }
            if inner.records.len() == inner.capacity {
                inner.records.pop_front();
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.records.push_back((seq, record.clone()));
        }

        if let Some(mirror) = self.mirror.as_mut() {
            let written = serde_json::to_writer(&mut *mirror, &record)
                .map_err(std::io::Error::from)
                .and_then(|_| mirror.write_all(b"\n"));
            if let Err(e) = written {
                warn!(error = %e, "Progress log file write failed; disabling mirror");
                self.mirror = None;
            }
        }
        true
    }

    /// Whether this writer still belongs to the current run.
    pub fn is_current(&self) -> bool {
        read(&self.inner).generation == self.generation
    }

    pub fn flush(&mut self) {
        if let Some(mirror) = self.mirror.as_mut() {
            if let Err(e) = mirror.flush() {
                warn!(error = %e, "Progress log file flush failed");
            }
        }
    }

    /// Flush and close the mirror file.
    pub fn finish(mut self) {
        self.flush();
        self.mirror = None;
    }
}
