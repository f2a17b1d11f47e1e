// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Skeleton event dispatch.
//!
//! A [`SkeletonEvent`] forwards sends to every backend registered for its
//! service instance. Two memory strategies exist and are mutually
//! exclusive per event instance:
//!
//! - **dynamic**: `send` by reference, or `allocate` a backend-owned sample
//!   and hand it back via `send_allocated`;
//! - **preallocated**: `pre_allocate` a fixed sample budget up front, then
//!   `try_send`.
//!
//! The first call picks the strategy; mixing them afterwards is a
//! programming error and fatal, not a recoverable condition.

use super::backend::{EventBackend, SampleBox};
use super::ServiceOfferState;
use crate::com::{ComError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AllocationStrategy {
    Unset,
    Dynamic,
    PreAllocated,
}

/// One event of one offered service instance, fanning out to 0..n backends.
pub struct SkeletonEvent<T> {
    offer_state: Arc<ServiceOfferState>,
    backends: Vec<Arc<dyn EventBackend<T>>>,
    strategy: Mutex<AllocationStrategy>,
}

impl<T> SkeletonEvent<T> {
    pub(super) fn new(
        offer_state: Arc<ServiceOfferState>,
        backends: Vec<Arc<dyn EventBackend<T>>>,
    ) -> Self {
        Self {
            offer_state,
            backends,
            strategy: Mutex::new(AllocationStrategy::Unset),
        }
    }

    /// Send a sample by reference to every backend.
    ///
    /// Blocks on an in-flight offer transition, then fails with
    /// [`ComError::ServiceNotOffered`] when the service is not visible; no
    /// backend is invoked in that case. Across backends the first failure
    /// wins and is returned as-is; per-binding partial delivery is treated
    /// as equally fatal to the caller.
    pub fn send(&self, value: &T) -> Result<()> {
        self.enter_strategy(AllocationStrategy::Dynamic);
        if !self.offer_state.is_offered_sync() {
            return Err(ComError::ServiceNotOffered);
        }
        for backend in &self.backends {
            backend.send(value)?;
        }
        Ok(())
    }

    /// Allocate a sample slot from the backend.
    ///
    /// Only defined for a single-backend event: one sample cannot live in
    /// n different backend-specific buffers at once. Not-offered and
    /// multi-backend topologies are recoverable errors, not fatal.
    pub fn allocate(&self) -> Result<SampleBox<T>> {
        self.enter_strategy(AllocationStrategy::Dynamic);
        if !self.offer_state.is_offered_sync() {
            return Err(ComError::ServiceNotOffered);
        }
        if self.backends.len() != 1 {
            log::warn!(
                "[skeleton] allocate with {} backends has no defined semantics",
                self.backends.len()
            );
            return Err(ComError::SampleAllocationFailure);
        }
        self.backends[0].allocate()
    }

    /// Send a sample previously obtained from [`allocate`](Self::allocate).
    pub fn send_allocated(&self, sample: SampleBox<T>) -> Result<()> {
        self.enter_strategy(AllocationStrategy::Dynamic);
        if !self.offer_state.is_offered_sync() {
            return Err(ComError::ServiceNotOffered);
        }
        if self.backends.len() != 1 {
            return Err(ComError::SampleAllocationFailure);
        }
        self.backends[0].send_allocated(sample)
    }

    /// Reserve `count` samples per backend for the preallocated strategy.
    ///
    /// Callable before the service is offered (the budget is part of the
    /// instance setup, not of traffic).
    pub fn pre_allocate(&self, count: usize) -> Result<()> {
        self.enter_strategy(AllocationStrategy::PreAllocated);
        for backend in &self.backends {
            backend.pre_allocate(count)?;
        }
        Ok(())
    }

    /// Send drawing from the preallocated sample budget.
    #[deprecated(note = "preallocated sends are superseded by allocate/send_allocated")]
    pub fn try_send(&self, value: &T) -> Result<()> {
        self.enter_strategy(AllocationStrategy::PreAllocated);
        if !self.offer_state.is_offered_sync() {
            return Err(ComError::ServiceNotOffered);
        }
        for backend in &self.backends {
            backend.send(value)?;
        }
        Ok(())
    }

    /// Pin (or verify) the event's allocation strategy. Mixing strategies
    /// on one instance is a programming error and fatal.
    fn enter_strategy(&self, wanted: AllocationStrategy) {
        let mut strategy = self.strategy.lock();
        if *strategy == AllocationStrategy::Unset {
            *strategy = wanted;
            return;
        }
        if *strategy != wanted {
            log::error!(
                "[skeleton] allocation strategies mixed on one event ({:?} then {:?})",
                *strategy,
                wanted
            );
            panic!("incompatible event memory strategies mixed on one event instance");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::StubEventBackend;
    use super::*;
    use crate::skeleton::test_support::StubSkeletonBackend;
    use crate::skeleton::Skeleton;
    use std::sync::atomic::Ordering;

    fn offered_skeleton() -> Skeleton {
        let skeleton = Skeleton::new(vec![Arc::new(StubSkeletonBackend::new("Ipc:1"))]);
        skeleton.offer_service().expect("offer");
        skeleton
    }

    #[test]
    fn test_send_before_offer_reaches_no_backend() {
        let skeleton = Skeleton::new(vec![Arc::new(StubSkeletonBackend::new("Ipc:1"))]);
        let backend = Arc::new(StubEventBackend::new());
        let event = skeleton.event::<u32>(vec![backend.clone()]);

        assert!(matches!(event.send(&1), Err(ComError::ServiceNotOffered)));
        assert_eq!(backend.sends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_send_fans_out_to_all_backends() {
        let skeleton = offered_skeleton();
        let a = Arc::new(StubEventBackend::new());
        let b = Arc::new(StubEventBackend::new());
        let event = skeleton.event::<u32>(vec![a.clone(), b.clone()]);

        event.send(&7).expect("offered");
        assert_eq!(a.sends.load(Ordering::SeqCst), 1);
        assert_eq!(b.sends.load(Ordering::SeqCst), 1);
        skeleton.stop_offer_service();
    }

    #[test]
    fn test_first_backend_error_wins() {
        let skeleton = offered_skeleton();
        let failing = Arc::new(StubEventBackend::failing());
        let second = Arc::new(StubEventBackend::new());
        let event = skeleton.event::<u32>(vec![failing.clone(), second.clone()]);

        assert!(matches!(event.send(&7), Err(ComError::QueueSizeExceeded)));
        // Fail-fast: the second backend was never reached.
        assert_eq!(second.sends.load(Ordering::SeqCst), 0);
        skeleton.stop_offer_service();
    }

    #[test]
    fn test_allocate_roundtrip_single_backend() {
        let skeleton = offered_skeleton();
        let backend = Arc::new(StubEventBackend::new());
        let event = skeleton.event::<u32>(vec![backend.clone()]);

        let mut sample = event.allocate().expect("single backend");
        *sample = 42;
        event.send_allocated(sample).expect("send allocated");
        assert_eq!(backend.allocates.load(Ordering::SeqCst), 1);
        assert_eq!(backend.sends.load(Ordering::SeqCst), 1);
        skeleton.stop_offer_service();
    }

    #[test]
    fn test_allocate_with_multiple_backends_is_an_error() {
        let skeleton = offered_skeleton();
        let event = skeleton.event::<u32>(vec![
            Arc::new(StubEventBackend::new()),
            Arc::new(StubEventBackend::new()),
        ]);

        assert!(matches!(
            event.allocate(),
            Err(ComError::SampleAllocationFailure)
        ));
        skeleton.stop_offer_service();
    }

    #[test]
    fn test_pre_allocate_then_try_send() {
        let skeleton = offered_skeleton();
        let backend = Arc::new(StubEventBackend::new());
        let event = skeleton.event::<u32>(vec![backend.clone()]);

        event.pre_allocate(8).expect("budget reserved");
        assert_eq!(backend.pre_allocations.load(Ordering::SeqCst), 8);
        #[allow(deprecated)]
        event.try_send(&3).expect("preallocated send");
        assert_eq!(backend.sends.load(Ordering::SeqCst), 1);
        skeleton.stop_offer_service();
    }

    // The strategy latch trips before any offer-state check, so the fatal
    // mixing tests run on a never-offered skeleton (whose drop is clean).

    #[test]
    #[should_panic(expected = "memory strategies mixed")]
    fn test_pre_allocate_then_send_is_fatal() {
        let skeleton = Skeleton::new(vec![Arc::new(StubSkeletonBackend::new("Ipc:1"))]);
        let event = skeleton.event::<u32>(vec![Arc::new(StubEventBackend::new())]);

        event.pre_allocate(4).expect("budget reserved");
        let _ = event.send(&1);
    }

    #[test]
    #[should_panic(expected = "memory strategies mixed")]
    fn test_send_then_pre_allocate_is_fatal() {
        let skeleton = Skeleton::new(vec![Arc::new(StubSkeletonBackend::new("Ipc:1"))]);
        let event = skeleton.event::<u32>(vec![Arc::new(StubEventBackend::new())]);

        // Not offered: the send is rejected, but it still pins the dynamic
        // strategy.
        assert!(matches!(event.send(&1), Err(ComError::ServiceNotOffered)));
        let _ = event.pre_allocate(4);
    }
}
