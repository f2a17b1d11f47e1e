// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Skeleton event dispatch into a deterministic-memory backend.
//!
//! Exercises the seam the transport bindings implement: an event backend
//! that serializes samples into buffers drawn from a pre-reserved
//! deterministic allocator, with no heap traffic per send.

use parking_lot::Mutex;
use socal::{
    ComError, DeterministicBuffer, DeterministicBufferAllocator, EventBackend,
    InstanceIdentifier, Result, SampleBox, Skeleton, SkeletonBackend,
};
use std::sync::Arc;

struct StubTransport {
    identifier: InstanceIdentifier,
}

impl SkeletonBackend for StubTransport {
    fn instance_identifier(&self) -> &InstanceIdentifier {
        &self.identifier
    }

    fn offer(&self) -> Result<()> {
        Ok(())
    }

    fn stop_offer(&self) {}
}

/// Event backend writing each sample into a deterministic buffer, keeping
/// the "transmitted" frames for inspection.
struct PooledEventBackend {
    allocator: DeterministicBufferAllocator,
    transmitted: Mutex<Vec<DeterministicBuffer>>,
}

impl PooledEventBackend {
    fn new(n_buffers: usize, buffer_size: usize) -> Self {
        Self {
            allocator: DeterministicBufferAllocator::new(n_buffers, buffer_size),
            transmitted: Mutex::new(Vec::new()),
        }
    }
}

impl EventBackend<u32> for PooledEventBackend {
    fn send(&self, value: &u32) -> Result<()> {
        // Worst-case frame, then shrink to the bytes actually used.
        let mut buffer = self.allocator.allocate(16)?;
        buffer.as_mut_slice()[..4].copy_from_slice(&value.to_le_bytes());
        buffer.reduce_size(4);
        self.transmitted.lock().push(buffer);
        Ok(())
    }

    fn allocate(&self) -> Result<SampleBox<u32>> {
        Ok(SampleBox::new(0))
    }

    fn send_allocated(&self, sample: SampleBox<u32>) -> Result<()> {
        self.send(&sample)
    }

    fn pre_allocate(&self, _count: usize) -> Result<()> {
        Ok(())
    }
}

#[test]
fn samples_flow_through_the_pool() {
    let backend = Arc::new(PooledEventBackend::new(4, 16));
    let skeleton = Skeleton::new(vec![Arc::new(StubTransport {
        identifier: InstanceIdentifier::new("Ipc:1").expect("valid identifier"),
    })]);
    let event = skeleton.event::<u32>(vec![backend.clone()]);

    // Nothing leaves before the offer.
    assert!(matches!(
        event.send(&0xAABBCCDD),
        Err(ComError::ServiceNotOffered)
    ));
    assert!(!backend.allocator.has_allocations());

    skeleton.offer_service().expect("offer");
    for value in [1u32, 2, 3, 4] {
        event.send(&value).expect("pool has room");
    }

    // Pool of 4 is exhausted while all frames are held.
    assert!(matches!(
        event.send(&5),
        Err(ComError::SampleAllocationFailure)
    ));

    {
        let frames = backend.transmitted.lock();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].view(0), 1u32.to_le_bytes().as_slice());
        assert_eq!(frames[3].view(0), 4u32.to_le_bytes().as_slice());
        assert_eq!(frames[0].size(), 4, "visible size shrunk to payload");
        assert_eq!(frames[0].capacity(), 16);
    }

    // Releasing the frames returns every chunk to the allocator.
    backend.transmitted.lock().clear();
    assert!(!backend.allocator.has_allocations());
    event.send(&6).expect("chunks recycled");

    backend.transmitted.lock().clear();
    skeleton.stop_offer_service();
}
