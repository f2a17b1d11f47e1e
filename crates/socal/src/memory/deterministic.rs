// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte buffers with allocator-owned deallocation slots.
//!
//! A [`DeterministicBuffer`] is owned by the caller, but the chunk it lives
//! in belongs to the allocator: dropping the buffer returns the chunk
//! through a shared back-reference. The visible size can only shrink after
//! construction (`reduce_size`), which supports the "write a worst-case
//! sized frame, then report only the bytes actually used" pattern.

use super::buffer_provider::{BufferHandle, BufferProvider};
use crate::com::{ComError, Result};
use std::sync::Arc;

/// Allocator handing out fixed-capacity byte buffers from a pre-reserved
/// pool. Allocation failure is a recoverable error; leaking buffers past
/// the allocator's lifetime is not.
pub struct DeterministicBufferAllocator {
    provider: Arc<BufferProvider<u8>>,
}

impl DeterministicBufferAllocator {
    /// Reserve `n_buffers` chunks of `buffer_size` bytes up front.
    pub fn new(n_buffers: usize, buffer_size: usize) -> Self {
        let provider = Arc::new(BufferProvider::new());
        provider.reserve(n_buffers, buffer_size);
        Self { provider }
    }

    /// Allocate a buffer of `size` bytes.
    ///
    /// Fails with [`ComError::SampleAllocationFailure`] when `size` exceeds
    /// the reserved chunk size or the pool is exhausted; the caller decides
    /// whether to retry, drop the sample, or back off.
    pub fn allocate(&self, size: usize) -> Result<DeterministicBuffer> {
        match self.provider.allocate(size) {
            Some((handle, _chunk)) => Ok(DeterministicBuffer {
                provider: Arc::clone(&self.provider),
                handle,
                capacity: size,
                size,
            }),
            None => Err(ComError::SampleAllocationFailure),
        }
    }

    /// Whether any buffer is still outstanding.
    pub fn has_allocations(&self) -> bool {
        self.provider.has_allocations()
    }
}

impl Drop for DeterministicBufferAllocator {
    fn drop(&mut self) {
        // Fail loud at teardown: an outstanding buffer would write into a
        // chunk whose pool the owner believes is gone.
        if self.provider.has_allocations() {
            log::error!("[memory] deterministic allocator dropped with outstanding buffers");
            panic!("deterministic allocator dropped with outstanding buffers");
        }
    }
}

/// Contiguous byte range whose deallocation slot is owned by the allocator
/// that produced it.
pub struct DeterministicBuffer {
    provider: Arc<BufferProvider<u8>>,
    handle: BufferHandle,
    capacity: usize,
    size: usize,
}

impl DeterministicBuffer {
    /// Currently visible size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Capacity fixed at allocation time.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Shrink the visible size. Growing is not possible; a larger value is
    /// clamped to the current size.
    pub fn reduce_size(&mut self, new_size: usize) {
        self.size = self.size.min(new_size);
    }

    /// View from `offset` to the visible size (never into spare capacity).
    /// Empty when `offset` is at or past the visible size.
    pub fn view(&self, offset: usize) -> &[u8] {
        if offset >= self.size {
            return &[];
        }
        &self.provider.chunk(self.handle)[offset..self.size]
    }

    /// Writable access to the full capacity. Writing past the visible size
    /// is allowed; the extra bytes stay invisible until construction of the
    /// next buffer (the size never grows back).
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.provider.chunk_mut(self.handle)[..self.capacity]
    }
}

impl Drop for DeterministicBuffer {
    fn drop(&mut self) {
        self.provider.deallocate(self.handle);
    }
}
