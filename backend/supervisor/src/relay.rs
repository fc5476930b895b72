//! Output relay: drains the PTY master into the progress log.
//!
//! The relay is blocking and runs on its own thread (`spawn_blocking`). It owns
//! the master endpoint and the run's [`ProgressWriter`] for its whole life and
//! hands the writer back when it stops.

use boxinstall_core::record::{error_record, parse_line};
use boxinstall_core::{InstallError, OutputMode};
use boxinstall_logging::redact_sensitive_data;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::progress_log::ProgressWriter;
use crate::pty_supervisor::MasterEndpoint;

/// Largest single read from the master.
pub const CHUNK_SIZE: usize = 4096;
/// How long to wait for data before re-checking the cancel flag.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Why the relay stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    /// Zero-byte read.
    Eof,
    /// `EIO` from the master: every slave descriptor is closed.
    SlaveClosed,
    Cancelled,
    /// Any other I/O error. An error record has been appended.
    Failed(String),
}

pub struct RelayOutcome {
    pub writer: ProgressWriter,
    pub end: RelayEnd,
    pub bytes: u64,
}

/// Incremental lossy UTF-8 decoder with line splitting.
///
/// Incomplete multi-byte sequences at the end of a chunk are carried into the
/// next one instead of being replaced.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    pending_bytes: Vec<u8>,
    partial_line: String,
}

impl ChunkDecoder {
    /// Decode `chunk`, returning the text that is safe to emit now.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending_bytes.extend_from_slice(chunk);
        let cut = complete_prefix_len(&self.pending_bytes);
        let rest = self.pending_bytes.split_off(cut);
        let text = String::from_utf8_lossy(&self.pending_bytes).into_owned();
        self.pending_bytes = rest;
        text
    }

    /// Decode `chunk` and return every completed line, without terminators.
    pub fn lines(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decode(chunk);
        self.partial_line.push_str(&text);

        let mut lines = Vec::new();
        while let Some(pos) = self.partial_line.find('\n') {
            let line: String = self.partial_line.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Whatever is left once the stream has ended.
    pub fn finish(&mut self) -> String {
        let mut tail = std::mem::take(&mut self.partial_line);
        if !self.pending_bytes.is_empty() {
            tail.push_str(&String::from_utf8_lossy(&self.pending_bytes));
            self.pending_bytes.clear();
        }
        tail
    }
}

/// Length of the longest prefix of `bytes` that does not end inside an
/// incomplete UTF-8 sequence.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        // `error_len() == None` means the input ended mid-sequence.
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => {
            // Invalid bytes somewhere; only hold back a trailing partial
            // sequence (at most three bytes).
            let start = bytes.len().saturating_sub(3);
            for i in (start..bytes.len()).rev() {
                let b = bytes[i];
                if b & 0xC0 != 0x80 {
                    let need = match b {
                        0xC0..=0xDF => 2,
                        0xE0..=0xEF => 3,
                        0xF0..=0xF7 => 4,
                        _ => 1,
                    };
                    return if bytes.len() - i < need { i } else { bytes.len() };
                }
            }
            bytes.len()
        }
    }
}

pub struct OutputRelay<M: MasterEndpoint> {
    master: M,
    writer: ProgressWriter,
    mode: OutputMode,
    cancel: Arc<AtomicBool>,
}

impl<M: MasterEndpoint> OutputRelay<M> {
    pub fn new(master: M, writer: ProgressWriter, mode: OutputMode) -> Self {
        Self {
            master,
            writer,
            mode,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the returned flag stops the relay at its next wakeup.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Drain until EOF, slave close, error or cancellation.
    ///
    /// The master is closed exactly once before this returns.
    pub fn run(self) -> RelayOutcome {
        let Self {
            mut master,
            mut writer,
            mode,
            cancel,
        } = self;

        let mut decoder = ChunkDecoder::default();
        let mut buf = [0u8; CHUNK_SIZE];
        let mut bytes: u64 = 0;

        let end = loop {
            if cancel.load(Ordering::Acquire) {
                break RelayEnd::Cancelled;
            }
            match master.wait_readable(POLL_INTERVAL) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => break RelayEnd::Failed(e.to_string()),
            }
            if cancel.load(Ordering::Acquire) {
                break RelayEnd::Cancelled;
            }
            match master.read(&mut buf) {
                Ok(0) => break RelayEnd::Eof,
                Ok(n) => {
                    bytes += n as u64;
                    emit_chunk(&mut writer, &mut decoder, mode, &buf[..n]);
                }
                Err(e) if e.raw_os_error() == Some(libc::EIO) => break RelayEnd::SlaveClosed,
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
                    ) =>
                {
                    continue
                }
                Err(e) => break RelayEnd::Failed(e.to_string()),
            }
        };

        if end != RelayEnd::Cancelled {
            let tail = decoder.finish();
            emit_text(&mut writer, mode, &tail);
        }

        match &end {
            RelayEnd::Failed(message) => {
                warn!(error = %message, bytes, "Output relay failed");
                let error = InstallError::RelayIo(message.clone());
                writer.append(error_record(&error.to_string(), None));
            }
            RelayEnd::Cancelled => info!(bytes, "Output relay cancelled"),
            other => debug!(end = ?other, bytes, "Output relay finished"),
        }

        master.close();
        writer.flush();

        RelayOutcome { writer, end, bytes }
    }
}

fn emit_chunk(writer: &mut ProgressWriter, decoder: &mut ChunkDecoder, mode: OutputMode, chunk: &[u8]) {
    match mode {
        OutputMode::Json => {
            for line in decoder.lines(chunk) {
                emit_line(writer, &line);
            }
        }
        OutputMode::Raw => {
            let text = decoder.decode(chunk);
            if !text.is_empty() {
                writer.append(Value::String(text));
            }
        }
    }
}

fn emit_text(writer: &mut ProgressWriter, mode: OutputMode, text: &str) {
    match mode {
        OutputMode::Json => emit_line(writer, text),
        OutputMode::Raw if !text.is_empty() => {
            writer.append(Value::String(text.to_string()));
        }
        OutputMode::Raw => {}
    }
}

fn emit_line(writer: &mut ProgressWriter, line: &str) {
    let line = line.trim();
    if !line.is_empty() {
        trace!(line = %redact_sensitive_data(line), "Installer output");
        writer.append(parse_line(line));
    }
}
