// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LoggerBase and per-context loggers.
//!
//! `LoggerBase` owns the sink registry, the per-context logger registry,
//! the bounded record queue, and a flush thread driven by its own reactor
//! plus a periodic steady timer. Producers only touch the lock-free queue;
//! sink I/O happens exclusively on the flush thread.
//!
//! `base_logger_guard` (the sink-list mutex) is held only around container
//! mutation and snapshotting, never around sink I/O.

use super::overflow::OverflowHandler;
use super::sink::{LogRecord, Severity, Sink};
use crate::runtime::reactor::{PollReactorFactory, ReactorFactory, ReactorWaker};
use crate::runtime::timer::SteadyTimerManager;
use crossbeam::queue::ArrayQueue;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

/// Context id used for the logging core's own diagnostics.
const SELF_CONTEXT: &str = "LOG";

struct LoggerCore {
    /// base_logger_guard: protects the sink list.
    sinks: Mutex<Vec<Arc<dyn Sink>>>,
    contexts: DashMap<String, Arc<Logger>>,
    threshold: AtomicU8,
    queue: ArrayQueue<LogRecord>,
    overflow: OverflowHandler,
}

impl LoggerCore {
    fn drain_to_sinks(&self) {
        // Snapshot under the guard, write outside it.
        let sinks = self.sinks.lock().clone();

        while let Some(record) = self.queue.pop() {
            for sink in &sinks {
                if sink.write(&record).is_err() {
                    log::warn!("[logging] sink write failed");
                }
            }
        }

        let dropped = self.overflow.take_report();
        if dropped > 0 {
            let summary = LogRecord {
                severity: Severity::Warn,
                context_id: SELF_CONTEXT.to_string(),
                timestamp: SystemTime::now(),
                message: format!("overflow: {} messages dropped", dropped),
            };
            for sink in &sinks {
                let _ = sink.write(&summary);
            }
        }
    }

    fn flush_sinks(&self) {
        let sinks = self.sinks.lock().clone();
        for sink in &sinks {
            if sink.flush().is_err() {
                log::warn!("[logging] sink flush failed");
            }
        }
    }
}

/// Per-context logging handle. Cheap to clone (`Arc`) and lock-free on the
/// hot path.
pub struct Logger {
    context_id: String,
    core: Weak<LoggerCore>,
}

impl Logger {
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Enqueue a record; dropped (and counted) when the queue is full or
    /// the logging core is already gone.
    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        let threshold = Severity::from_u8(core.threshold.load(Ordering::Relaxed));
        if !severity.enabled_at(threshold) {
            return;
        }
        let record = LogRecord {
            severity,
            context_id: self.context_id.clone(),
            timestamp: SystemTime::now(),
            message: message.into(),
        };
        if core.queue.push(record).is_err() {
            core.overflow.on_dropped();
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(Severity::Warn, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Severity::Debug, message);
    }
}

struct FlushThread {
    running: Arc<AtomicBool>,
    waker: ReactorWaker,
    handle: JoinHandle<()>,
}

/// Owner of sinks, context loggers, the record queue, and the flush thread.
pub struct LoggerBase {
    core: Arc<LoggerCore>,
    timers: Arc<SteadyTimerManager>,
    flusher: Option<FlushThread>,
}

impl LoggerBase {
    /// Start the logging core.
    ///
    /// `queue_capacity` bounds the record queue (overflow drops + counts),
    /// `threshold` is the initial severity filter, `flush_period` the sink
    /// drain cadence.
    pub fn new(
        queue_capacity: usize,
        threshold: Severity,
        flush_period: Duration,
    ) -> io::Result<Self> {
        let core = Arc::new(LoggerCore {
            sinks: Mutex::new(Vec::new()),
            contexts: DashMap::new(),
            threshold: AtomicU8::new(threshold as u8),
            queue: ArrayQueue::new(queue_capacity.max(1)),
            overflow: OverflowHandler::new(),
        });

        // The logging core owns its own reactor; the periodic flush timer
        // is the only registered work.
        let factory = PollReactorFactory;
        let token = factory.preconstruct(1)?;
        let mut reactor = factory.construct(token);
        let waker = reactor.waker();

        let timers = Arc::new(SteadyTimerManager::new());
        let flush_core = Arc::clone(&core);
        timers.add_timer(
            flush_period,
            Some(flush_period),
            Arc::new(move || flush_core.drain_to_sinks()),
        );

        let running = Arc::new(AtomicBool::new(true));
        let run_flag = Arc::clone(&running);
        let thread_timers = Arc::clone(&timers);
        let handle = std::thread::Builder::new()
            .name("socal-log-flush".to_string())
            .spawn(move || {
                while run_flag.load(Ordering::Acquire) {
                    let timeout = thread_timers
                        .next_deadline()
                        .map(|deadline| {
                            deadline
                                .saturating_duration_since(std::time::Instant::now())
                                .min(Duration::from_millis(100))
                        })
                        .unwrap_or(Duration::from_millis(100));
                    if reactor.handle_events(Some(timeout)).is_err() {
                        break;
                    }
                    thread_timers.fire_due();
                }
            })?;

        Ok(Self {
            core,
            timers,
            flusher: Some(FlushThread {
                running,
                waker,
                handle,
            }),
        })
    }

    /// Register a sink. New records fan out to every registered sink.
    pub fn register_sink(&self, sink: Arc<dyn Sink>) {
        self.core.sinks.lock().push(sink);
    }

    /// Get (or create) the logger for a context id.
    pub fn logger(&self, context_id: &str) -> Arc<Logger> {
        let entry = self
            .core
            .contexts
            .entry(context_id.to_string())
            .or_insert_with(|| {
                Arc::new(Logger {
                    context_id: context_id.to_string(),
                    core: Arc::downgrade(&self.core),
                })
            });
        Arc::clone(entry.value())
    }

    /// Change the global severity threshold.
    pub fn set_threshold(&self, threshold: Severity) {
        self.core.threshold.store(threshold as u8, Ordering::Relaxed);
    }

    pub fn threshold(&self) -> Severity {
        Severity::from_u8(self.core.threshold.load(Ordering::Relaxed))
    }

    /// Lifetime count of overflow-dropped records.
    pub fn dropped_records(&self) -> u64 {
        self.core.overflow.total_dropped()
    }

    /// Stop the flush thread, drain what is queued, and flush every sink.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(flusher) = self.flusher.take() {
            flusher.running.store(false, Ordering::Release);
            if flusher.waker.wake().is_err() {
                log::warn!("[logging] flush thread waker failed during shutdown");
            }
            if flusher.handle.join().is_err() {
                log::error!("[logging] flush thread panicked");
            }
        }
        self.timers.clear();
        self.core.drain_to_sinks();
        self.core.flush_sinks();
    }
}

impl Drop for LoggerBase {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink collecting formatted lines in memory.
    struct CollectingSink {
        lines: Mutex<Vec<String>>,
    }

    impl CollectingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                lines: Mutex::new(Vec::new()),
            })
        }

        fn lines(&self) -> Vec<String> {
            self.lines.lock().clone()
        }
    }

    impl Sink for CollectingSink {
        fn write(&self, record: &LogRecord) -> io::Result<()> {
            self.lines.lock().push(record.format());
            Ok(())
        }

        fn flush(&self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_records_reach_sinks() {
        let base =
            LoggerBase::new(64, Severity::Debug, Duration::from_millis(5)).expect("start core");
        let sink = CollectingSink::new();
        base.register_sink(sink.clone());

        let logger = base.logger("COMM");
        logger.info("service offered");
        logger.error("backend gone");
        base.shutdown();

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[COMM] service offered"));
        assert!(lines[1].contains("ERROR [COMM] backend gone"));
    }

    #[test]
    fn test_threshold_filters() {
        let base =
            LoggerBase::new(64, Severity::Warn, Duration::from_millis(5)).expect("start core");
        let sink = CollectingSink::new();
        base.register_sink(sink.clone());

        let logger = base.logger("APP");
        logger.debug("invisible");
        logger.info("invisible");
        logger.warn("visible");
        base.shutdown();

        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("visible"));
    }

    #[test]
    fn test_same_context_shares_logger() {
        let base =
            LoggerBase::new(8, Severity::Info, Duration::from_millis(50)).expect("start core");
        let a = base.logger("CTX");
        let b = base.logger("CTX");
        assert!(Arc::ptr_eq(&a, &b));
        base.shutdown();
    }

    #[test]
    fn test_overflow_is_counted_and_summarized() {
        // Long flush period: the queue fills before anything drains.
        let base =
            LoggerBase::new(2, Severity::Debug, Duration::from_secs(60)).expect("start core");
        let sink = CollectingSink::new();
        base.register_sink(sink.clone());

        let logger = base.logger("LOAD");
        for i in 0..5 {
            logger.info(format!("burst {}", i));
        }
        assert_eq!(base.dropped_records(), 3);
        base.shutdown();

        let lines = sink.lines();
        assert_eq!(lines.len(), 3, "2 queued records + 1 overflow summary");
        assert!(lines[2].contains("overflow: 3 messages dropped"));
    }

    #[test]
    fn test_logger_outliving_base_is_inert() {
        let base =
            LoggerBase::new(8, Severity::Info, Duration::from_millis(50)).expect("start core");
        let logger = base.logger("LATE");
        base.shutdown();

        // The core is gone; logging must not panic or block.
        logger.info("into the void");
    }
}
