// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Steady (monotonic) timer management.
//!
//! Timers are registered with a delay and an optional period; the reactor
//! driver calls [`SteadyTimerManager::fire_due`] on every step and uses
//! [`SteadyTimerManager::next_deadline`] to bound its poll timeout. Expiry
//! callbacks run with the manager lock released, so adding or removing
//! timers from inside a callback is allowed.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Handle identifying one registered timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Callback invoked on timer expiry.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

struct TimerEntry {
    deadline: Instant,
    period: Option<Duration>,
    callback: TimerCallback,
}

struct TimerState {
    timers: BTreeMap<u64, TimerEntry>,
    next_id: u64,
}

/// Thread-safe registry of one-shot and periodic monotonic timers.
pub struct SteadyTimerManager {
    state: Mutex<TimerState>,
}

impl SteadyTimerManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TimerState {
                timers: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Register a timer firing after `delay`, then every `period` when one
    /// is given.
    pub fn add_timer(
        &self,
        delay: Duration,
        period: Option<Duration>,
        callback: TimerCallback,
    ) -> TimerHandle {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.timers.insert(
            id,
            TimerEntry {
                deadline: Instant::now() + delay,
                period,
                callback,
            },
        );
        TimerHandle(id)
    }

    /// Remove a timer; `false` when the handle is no longer registered.
    ///
    /// Removal may race an in-flight `fire_due` that already collected the
    /// timer: in that case the callback fires one final time after this
    /// call returns.
    pub fn remove_timer(&self, handle: TimerHandle) -> bool {
        self.state.lock().timers.remove(&handle.0).is_some()
    }

    /// Earliest pending deadline, feeding the reactor's poll timeout.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state
            .lock()
            .timers
            .values()
            .map(|entry| entry.deadline)
            .min()
    }

    /// Run every expired callback; returns how many fired.
    ///
    /// Callbacks execute with the manager lock released. One-shot timers are
    /// unregistered before their callback runs; periodic timers are
    /// re-armed relative to their previous deadline (no drift accumulation).
    pub fn fire_due(&self) -> usize {
        let now = Instant::now();
        let due: Vec<TimerCallback> = {
            let mut state = self.state.lock();
            let expired: Vec<u64> = state
                .timers
                .iter()
                .filter(|(_, entry)| entry.deadline <= now)
                .map(|(&id, _)| id)
                .collect();

            let mut callbacks = Vec::with_capacity(expired.len());
            for id in expired {
                let rearm = {
                    let entry = state.timers.get_mut(&id).expect("collected above");
                    callbacks.push(Arc::clone(&entry.callback));
                    match entry.period {
                        Some(period) => {
                            entry.deadline += period;
                            true
                        }
                        None => false,
                    }
                };
                if !rearm {
                    state.timers.remove(&id);
                }
            }
            callbacks
        };

        for callback in &due {
            callback();
        }
        due.len()
    }

    /// Number of registered timers.
    pub fn len(&self) -> usize {
        self.state.lock().timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().timers.is_empty()
    }

    /// Drop every timer (runtime teardown).
    pub fn clear(&self) {
        self.state.lock().timers.clear();
    }
}

impl Default for SteadyTimerManager {
    fn default() -> Self {
        Self::new()
    }
}
