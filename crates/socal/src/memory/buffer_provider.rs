// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot chunked buffer pool.
//!
//! `BufferProvider<T>` reserves `n_buffers` chunks of `n_elements` each in a
//! single allocation phase. Afterwards `allocate`/`deallocate` only flip
//! slot-table entries under a coarse mutex; the backing storage is never
//! resized. Buffer counts are bounded by configuration, not runtime traffic,
//! so a single lock is sufficient here.
//!
//! Misuse is fatal by contract: re-reserving with a larger requirement, or
//! deallocating a handle that is not currently allocated, terminates the
//! process. Exhaustion during `allocate` is NOT misuse and reports `None`.

use crate::containers::{HasKey, StaticMap};
use parking_lot::Mutex;
use std::cell::UnsafeCell;

/// Handle to an allocated chunk (its index in the reserved storage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u32);

impl BufferHandle {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// One slot-table entry: chunk index plus in-use flag.
struct ChunkSlot {
    index: u32,
    in_use: bool,
}

impl HasKey for ChunkSlot {
    type Key = u32;
    fn key(&self) -> &u32 {
        &self.index
    }
}

struct TableState {
    slots: Option<StaticMap<ChunkSlot>>,
    n_buffers: usize,
    n_elements: usize,
}

impl TableState {
    fn reserved_total(&self) -> usize {
        self.n_buffers * self.n_elements
    }
}

/// Fixed pool of equally sized chunks with at most one allocation phase.
pub struct BufferProvider<T> {
    /// Chunk storage. Exclusivity of a chunk is guaranteed by its slot-table
    /// entry: a chunk slice is only handed out while the slot flips from
    /// free to in-use under the table mutex.
    storage: UnsafeCell<Vec<T>>,
    table: Mutex<TableState>,
}

// SAFETY: the storage cell is only touched for chunks whose slot-table entry
// grants exclusive (in-use) or shared-read access, and every table mutation
// happens under the mutex. No two threads can claim the same chunk.
unsafe impl<T: Send> Send for BufferProvider<T> {}
unsafe impl<T: Send> Sync for BufferProvider<T> {}

impl<T: Default + Clone + Send> BufferProvider<T> {
    /// Create an empty provider; call [`reserve`](Self::reserve) before use.
    pub fn new() -> Self {
        Self {
            storage: UnsafeCell::new(Vec::new()),
            table: Mutex::new(TableState {
                slots: None,
                n_buffers: 0,
                n_elements: 0,
            }),
        }
    }

    /// Reserve `n_buffers` chunks of `n_elements` each.
    ///
    /// The first successful call fixes the pool geometry. Later calls whose
    /// total requirement fits the existing reservation are no-ops; a call
    /// that needs strictly more memory is fatal: the sizing promise made by
    /// configuration has been broken and continuing would re-enter the
    /// system allocator on the hot path.
    pub fn reserve(&self, n_buffers: usize, n_elements: usize) {
        let mut table = self.table.lock();

        if table.slots.is_some() {
            if n_buffers * n_elements <= table.reserved_total() {
                return;
            }
            log::error!(
                "[memory] buffer provider re-reserve grew from {} to {} elements",
                table.reserved_total(),
                n_buffers * n_elements
            );
            panic!("buffer provider already reserved with a smaller capacity");
        }

        // SAFETY: no chunk has been handed out yet (slots is None) and the
        // table mutex is held, so no other thread observes the storage while
        // it is being sized.
        unsafe {
            *self.storage.get() = vec![T::default(); n_buffers * n_elements];
        }

        let mut slots = StaticMap::with_capacity(n_buffers);
        for index in 0..n_buffers {
            let inserted = slots.insert(ChunkSlot {
                index: index as u32,
                in_use: false,
            });
            debug_assert!(inserted.is_ok(), "chunk indices are unique");
        }
        table.slots = Some(slots);
        table.n_buffers = n_buffers;
        table.n_elements = n_elements;
    }

    /// Claim a free chunk able to hold `n` elements.
    ///
    /// Returns `None` (not an error) when `n` exceeds the per-chunk element
    /// count, when nothing was reserved, or when every chunk is in use. The
    /// lowest free chunk index wins, so releasing a chunk and allocating
    /// again with no interleaving reuses the same chunk.
    #[allow(clippy::mut_from_ref)]
    pub fn allocate(&self, n: usize) -> Option<(BufferHandle, &mut [T])> {
        let mut table = self.table.lock();
        if n > table.n_elements {
            return None;
        }
        let n_elements = table.n_elements;
        let slots = table.slots.as_mut()?;

        // In-order iteration is ascending by chunk index: first-fit, lowest
        // index.
        let index = slots.iter().find(|slot| !slot.in_use).map(|slot| slot.index)?;
        slots
            .get_by_key_mut(&index)
            .expect("slot found during scan")
            .in_use = true;

        let offset = index as usize * n_elements;
        // SAFETY:
        // 1. The storage vector was sized in reserve() and is never resized
        //    afterwards, so the chunk range stays inside the allocation.
        // 2. The slot just flipped to in-use under the table mutex; no other
        //    thread can claim this chunk until it is deallocated.
        // 3. The returned slice covers exactly this chunk, so distinct
        //    handles never alias.
        let data = unsafe { &mut *self.storage.get() };
        Some((
            BufferHandle(index),
            &mut data[offset..offset + n_elements],
        ))
    }

    /// Read access to an allocated chunk.
    ///
    /// The handle must be currently allocated; anything else is a caller
    /// error and fatal.
    pub fn chunk(&self, handle: BufferHandle) -> &[T] {
        let table = self.table.lock();
        self.assert_allocated(&table, handle);
        let offset = handle.0 as usize * table.n_elements;
        // SAFETY: the slot is in-use, so the chunk range is initialized and
        // inside the fixed storage; shared reads of the owning chunk are the
        // handle owner's to coordinate.
        let data = unsafe { &*self.storage.get() };
        &data[offset..offset + table.n_elements]
    }

    /// Exclusive access to an allocated chunk.
    ///
    /// The caller must be the sole owner of `handle` (the allocation
    /// contract), which is what makes handing out `&mut` sound here.
    #[allow(clippy::mut_from_ref)]
    pub fn chunk_mut(&self, handle: BufferHandle) -> &mut [T] {
        let table = self.table.lock();
        self.assert_allocated(&table, handle);
        let offset = handle.0 as usize * table.n_elements;
        // SAFETY: as in chunk(); exclusivity follows from single ownership
        // of the handle between allocate() and deallocate().
        let data = unsafe { &mut *self.storage.get() };
        &mut data[offset..offset + table.n_elements]
    }

    /// Return a chunk to the pool.
    ///
    /// A handle that is not currently allocated is a caller error: the
    /// bookkeeping can no longer be trusted, so this is fatal rather than
    /// silently swallowed.
    pub fn deallocate(&self, handle: BufferHandle) {
        let mut table = self.table.lock();
        let known = table
            .slots
            .as_mut()
            .and_then(|slots| slots.get_by_key_mut(&handle.0))
            .filter(|slot| slot.in_use);
        match known {
            Some(slot) => slot.in_use = false,
            None => {
                log::error!(
                    "[memory] deallocate of unknown or free chunk {}",
                    handle.0
                );
                panic!("deallocate of unknown or free buffer chunk {}", handle.0);
            }
        }
    }

    /// Whether any chunk is currently allocated. Callers use this to decide
    /// if the provider can be safely torn down.
    pub fn has_allocations(&self) -> bool {
        let table = self.table.lock();
        table
            .slots
            .as_ref()
            .is_some_and(|slots| slots.iter().any(|slot| slot.in_use))
    }

    /// Reserved per-chunk element count (0 before `reserve`).
    pub fn elements_per_buffer(&self) -> usize {
        self.table.lock().n_elements
    }

    fn assert_allocated(&self, table: &TableState, handle: BufferHandle) {
        let allocated = table
            .slots
            .as_ref()
            .and_then(|slots| slots.get_by_key(&handle.0))
            .is_some_and(|slot| slot.in_use);
        assert!(
            allocated,
            "buffer chunk {} accessed while not allocated",
            handle.0
        );
    }
}

impl<T: Default + Clone + Send> Default for BufferProvider<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for BufferProvider<T> {
    fn drop(&mut self) {
        let table = self.table.get_mut();
        let outstanding = table
            .slots
            .as_ref()
            .is_some_and(|slots| slots.iter().any(|slot| slot.in_use));
        if outstanding {
            log::error!("[memory] buffer provider dropped with outstanding allocations");
            panic!("buffer provider dropped with outstanding allocations");
        }
    }
}
