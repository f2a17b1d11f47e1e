// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Severity model, record format, and sink implementations.

use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Log severity, most severe first. `Off` disables everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    Off = 0,
    Fatal = 1,
    Error = 2,
    Warn = 3,
    Info = 4,
    Debug = 5,
    Verbose = 6,
}

impl Severity {
    /// Whether a message at `self` passes a `threshold` filter.
    pub fn enabled_at(self, threshold: Severity) -> bool {
        self != Severity::Off && threshold != Severity::Off && self <= threshold
    }

    pub(crate) fn from_u8(raw: u8) -> Severity {
        match raw {
            1 => Severity::Fatal,
            2 => Severity::Error,
            3 => Severity::Warn,
            4 => Severity::Info,
            5 => Severity::Debug,
            6 => Severity::Verbose,
            _ => Severity::Off,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Severity::Off => "OFF",
            Severity::Fatal => "FATAL",
            Severity::Error => "ERROR",
            Severity::Warn => "WARN",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
            Severity::Verbose => "VERB",
        }
    }
}

/// One log record as queued for the flush thread.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub severity: Severity,
    pub context_id: String,
    pub timestamp: SystemTime,
    pub message: String,
}

impl LogRecord {
    /// Render the single-line sink format:
    /// `<epoch-secs>.<millis> LEVEL [context] message`.
    pub fn format(&self) -> String {
        let since_epoch = self
            .timestamp
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        format!(
            "{}.{:03} {:5} [{}] {}",
            since_epoch.as_secs(),
            since_epoch.subsec_millis(),
            self.severity.label(),
            self.context_id,
            self.message
        )
    }
}

/// Log output destination.
pub trait Sink: Send + Sync {
    fn write(&self, record: &LogRecord) -> io::Result<()>;
    fn flush(&self) -> io::Result<()>;
}

/// Line-per-record sink writing to stdout.
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for ConsoleSink {
    fn write(&self, record: &LogRecord) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", record.format())
    }

    fn flush(&self) -> io::Result<()> {
        io::stdout().lock().flush()
    }
}

/// Buffered append-only file sink.
pub struct FileSink {
    writer: Mutex<BufWriter<std::fs::File>>,
}

impl FileSink {
    /// Open (or create) the log file in append mode.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl Sink for FileSink {
    fn write(&self, record: &LogRecord) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", record.format())
    }

    fn flush(&self) -> io::Result<()> {
        self.writer.lock().flush()
    }
}
