// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end buffer pool scenario: reserve once, exhaust, recycle.

use socal::BufferProvider;

#[test]
fn reserve_exhaust_recycle_cycle() {
    let provider: BufferProvider<u8> = BufferProvider::new();
    provider.reserve(4, 16);

    // Fill the pool.
    let mut handles = Vec::new();
    for i in 0..4u8 {
        let (handle, chunk) = provider.allocate(16).expect("pool has room");
        chunk.fill(i);
        handles.push(handle);
    }
    assert!(provider.has_allocations());

    // Exhausted: the 5th allocation reports None, not an error.
    assert!(provider.allocate(16).is_none());

    // Releasing one chunk makes the next allocation succeed again.
    let released = handles.remove(1);
    provider.deallocate(released);
    let (reused, _) = provider.allocate(8).expect("freed chunk is available");
    assert_eq!(reused, released);

    // Chunk contents are per-chunk, not shared.
    assert_eq!(provider.chunk(handles[0]), &[0u8; 16]);
    assert_eq!(provider.chunk(handles[2]), &[3u8; 16]);

    // Outstanding allocations keep the provider busy until the last one
    // goes back.
    provider.deallocate(reused);
    for handle in handles {
        assert!(provider.has_allocations());
        provider.deallocate(handle);
    }
    assert!(!provider.has_allocations());
}
