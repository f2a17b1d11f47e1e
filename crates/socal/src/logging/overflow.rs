// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded-queue overflow accounting.
//!
//! When the record queue is full, messages are dropped rather than blocking
//! the caller. The handler counts the drops; the flush thread periodically
//! collects the count and emits one summary record, so an overload produces
//! a single diagnostic line instead of amplifying itself.

use std::sync::atomic::{AtomicU64, Ordering};

/// Drop counter with collect-and-reset reporting.
pub struct OverflowHandler {
    pending: AtomicU64,
    total: AtomicU64,
}

impl OverflowHandler {
    pub fn new() -> Self {
        Self {
            pending: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Record one dropped message.
    pub fn on_dropped(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Collect the drops since the last report and reset the pending count.
    pub fn take_report(&self) -> u64 {
        self.pending.swap(0, Ordering::Relaxed)
    }

    /// Lifetime total of dropped messages.
    pub fn total_dropped(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl Default for OverflowHandler {
    fn default() -> Self {
        Self::new()
    }
}
