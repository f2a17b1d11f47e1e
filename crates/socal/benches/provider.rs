// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hot-path benchmark for the deterministic buffer pool.
//!
//! Measures one allocate/deallocate cycle under the coarse table lock:
//! the per-sample cost every event send pays in a pooled backend.

use criterion::{criterion_group, criterion_main, Criterion};
use socal::BufferProvider;

fn provider_cycle(c: &mut Criterion) {
    let provider: BufferProvider<u8> = BufferProvider::new();
    provider.reserve(64, 1024);

    c.bench_function("provider_allocate_deallocate_1k", |b| {
        b.iter(|| {
            let (handle, chunk) = provider.allocate(1024).expect("pool sized for the bench");
            std::hint::black_box(&chunk[0]);
            provider.deallocate(handle);
        });
    });

    // Worst case: the pool is nearly full, the free-slot scan walks the
    // table.
    let mut held = Vec::new();
    for _ in 0..63 {
        let (handle, _) = provider.allocate(1024).expect("fill");
        held.push(handle);
    }
    c.bench_function("provider_allocate_deallocate_nearly_full", |b| {
        b.iter(|| {
            let (handle, _) = provider.allocate(1024).expect("one slot left");
            provider.deallocate(handle);
        });
    });
    for handle in held {
        provider.deallocate(handle);
    }
}

criterion_group!(benches, provider_cycle);
criterion_main!(benches);
