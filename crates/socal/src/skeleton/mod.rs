// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server-side service objects.
//!
//! A [`Skeleton`] represents one offered service instance and fans its
//! lifecycle out to every registered transport backend. Events and fields
//! ([`SkeletonEvent`], [`SkeletonField`]) share the skeleton's offer state:
//! their send paths block on an in-flight offer transition before deciding
//! whether the service is visible, which closes the race between "write the
//! field initial value" and a subscriber arriving mid-offer.
//!
//! # Ordering contract
//!
//! Per-instance send/allocate/update calls are not thread-safe against each
//! other on the *same* event or field instance, but are safe across
//! different instances. `offer_service`/`stop_offer_service` must never run
//! concurrently with a send/allocate on events of that skeleton.

/// Binding-facing backend traits.
pub mod backend;
/// Event send/allocate dispatch.
pub mod event;
/// Field get/set/notify dispatch.
pub mod field;

pub use backend::{EventBackend, SampleBox, SkeletonBackend};
pub use event::SkeletonEvent;
pub use field::{FieldCapabilities, SkeletonField};

use crate::com::Result;
use crate::runtime::ObjectTracker;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OfferPhase {
    NotOffered,
    /// An offer or stop-offer is mid-flight; readers wait for it to settle.
    Transitioning,
    Offered,
}

/// Shared offer state between a skeleton and its events/fields.
pub struct ServiceOfferState {
    phase: Mutex<OfferPhase>,
    settled: Condvar,
}

impl ServiceOfferState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            phase: Mutex::new(OfferPhase::NotOffered),
            settled: Condvar::new(),
        })
    }

    /// Wait for any in-flight transition to settle, then report whether the
    /// service is offered.
    pub fn is_offered_sync(&self) -> bool {
        let mut phase = self.phase.lock();
        while *phase == OfferPhase::Transitioning {
            self.settled.wait(&mut phase);
        }
        *phase == OfferPhase::Offered
    }

    /// Enter the transitioning phase, returning the settled phase it
    /// replaced.
    fn begin_transition(&self) -> OfferPhase {
        let mut phase = self.phase.lock();
        while *phase == OfferPhase::Transitioning {
            self.settled.wait(&mut phase);
        }
        let previous = *phase;
        *phase = OfferPhase::Transitioning;
        previous
    }

    fn settle(&self, phase: OfferPhase) {
        *self.phase.lock() = phase;
        self.settled.notify_all();
    }
}

/// One offered service instance, fanning out to 0..n transport backends.
pub struct Skeleton {
    backends: Vec<Arc<dyn SkeletonBackend>>,
    offer_state: Arc<ServiceOfferState>,
    _tracker: Option<ObjectTracker>,
}

impl Skeleton {
    pub fn new(backends: Vec<Arc<dyn SkeletonBackend>>) -> Self {
        Self {
            backends,
            offer_state: ServiceOfferState::new(),
            _tracker: None,
        }
    }

    /// Attach a runtime object tracker so the runtime refuses teardown
    /// while this skeleton lives.
    pub fn with_tracker(mut self, tracker: ObjectTracker) -> Self {
        self._tracker = Some(tracker);
        self
    }

    /// The shared offer state, used to wire up events and fields.
    pub fn offer_state(&self) -> Arc<ServiceOfferState> {
        Arc::clone(&self.offer_state)
    }

    /// Offer the instance on every backend.
    ///
    /// Re-offering an already offered instance is an idempotent no-op. A
    /// backend failure rolls the already-offered backends back and returns
    /// the failing backend's error.
    pub fn offer_service(&self) -> Result<()> {
        let previous = self.offer_state.begin_transition();
        if previous == OfferPhase::Offered {
            log::debug!("[skeleton] offer_service on an already offered instance");
            self.offer_state.settle(OfferPhase::Offered);
            return Ok(());
        }

        for (index, backend) in self.backends.iter().enumerate() {
            if let Err(e) = backend.offer() {
                log::warn!(
                    "[skeleton] offer failed on backend '{}': {}",
                    backend.instance_identifier(),
                    e
                );
                for offered in self.backends[..index].iter().rev() {
                    offered.stop_offer();
                }
                self.offer_state.settle(OfferPhase::NotOffered);
                return Err(e);
            }
        }
        self.offer_state.settle(OfferPhase::Offered);
        Ok(())
    }

    /// Withdraw the instance from every backend (reverse registration
    /// order). Stopping a not-offered instance is a no-op.
    pub fn stop_offer_service(&self) {
        let previous = self.offer_state.begin_transition();
        if previous == OfferPhase::Offered {
            for backend in self.backends.iter().rev() {
                backend.stop_offer();
            }
        }
        self.offer_state.settle(OfferPhase::NotOffered);
    }

    /// Blocking query of the offer state (see [`ServiceOfferState`]).
    pub fn is_offered(&self) -> bool {
        self.offer_state.is_offered_sync()
    }

    /// Create an event bound to this skeleton's offer state.
    pub fn event<T>(&self, backends: Vec<Arc<dyn EventBackend<T>>>) -> SkeletonEvent<T> {
        SkeletonEvent::new(self.offer_state(), backends)
    }
}

impl Drop for Skeleton {
    fn drop(&mut self) {
        // Destroying an offered skeleton would leave the instance announced
        // on the wire with nothing behind it.
        if self.offer_state.is_offered_sync() {
            log::error!("[skeleton] skeleton dropped while still offered");
            panic!("skeleton dropped while service is still offered");
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::com::ComError;
    use crate::registry::InstanceIdentifier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counting stub backend; optionally fails `offer`.
    pub struct StubSkeletonBackend {
        identifier: InstanceIdentifier,
        pub offers: AtomicUsize,
        pub stops: AtomicUsize,
        pub fail_offer: bool,
    }

    impl StubSkeletonBackend {
        pub fn new(identifier: &str) -> Self {
            Self {
                identifier: InstanceIdentifier::new(identifier).expect("valid identifier"),
                offers: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                fail_offer: false,
            }
        }

        pub fn failing(identifier: &str) -> Self {
            Self {
                fail_offer: true,
                ..Self::new(identifier)
            }
        }
    }

    impl SkeletonBackend for StubSkeletonBackend {
        fn instance_identifier(&self) -> &InstanceIdentifier {
            &self.identifier
        }

        fn offer(&self) -> Result<()> {
            self.offers.fetch_add(1, Ordering::SeqCst);
            if self.fail_offer {
                return Err(ComError::SampleAllocationFailure);
            }
            Ok(())
        }

        fn stop_offer(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::StubSkeletonBackend;
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_offer_stop_cycle() {
        let backend = Arc::new(StubSkeletonBackend::new("Ipc:1"));
        let skeleton = Skeleton::new(vec![backend.clone()]);

        assert!(!skeleton.is_offered());
        skeleton.offer_service().expect("offer succeeds");
        assert!(skeleton.is_offered());
        assert_eq!(backend.offers.load(Ordering::SeqCst), 1);

        // Idempotent re-offer.
        skeleton.offer_service().expect("re-offer is a no-op");
        assert_eq!(backend.offers.load(Ordering::SeqCst), 1);

        skeleton.stop_offer_service();
        assert!(!skeleton.is_offered());
        assert_eq!(backend.stops.load(Ordering::SeqCst), 1);

        // Stop on a not-offered instance is a no-op.
        skeleton.stop_offer_service();
        assert_eq!(backend.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_offer_rolls_back() {
        let good = Arc::new(StubSkeletonBackend::new("Ipc:1"));
        let bad = Arc::new(StubSkeletonBackend::failing("Someip:2"));
        let skeleton = Skeleton::new(vec![good.clone(), bad.clone()]);

        skeleton.offer_service().expect_err("second backend fails");
        assert!(!skeleton.is_offered());
        assert_eq!(good.offers.load(Ordering::SeqCst), 1);
        assert_eq!(good.stops.load(Ordering::SeqCst), 1, "rollback stops the first");
        assert_eq!(bad.stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[should_panic(expected = "still offered")]
    fn test_drop_while_offered_is_fatal() {
        let skeleton = Skeleton::new(vec![Arc::new(StubSkeletonBackend::new("Ipc:1"))]);
        skeleton.offer_service().expect("offer");
        drop(skeleton);
    }
}
