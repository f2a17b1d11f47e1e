// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # SOCAL - Service-Oriented Communication Abstraction Layer
//!
//! A deterministic communication runtime for adaptive automotive platforms:
//! service skeletons with event/field dispatch over pluggable transport
//! backends, a reactor-based event loop (thread-driven or polling), and an
//! allocation-free hot path for message buffers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use socal::{Configuration, LifecycleManager, PollReactorFactory, Runtime};
//!
//! fn main() -> socal::Result<()> {
//!     let config = Configuration::builder().build()?;
//!     let runtime = Runtime::initialize(config, &PollReactorFactory, LifecycleManager::new())?;
//!
//!     // Application runs; in polling mode, drive the reactor explicitly:
//!     while runtime.is_running() {
//!         if !runtime.process_polling()? {
//!             std::thread::sleep(std::time::Duration::from_millis(1));
//!         }
//!         # break;
//!     }
//!
//!     runtime.deinitialize();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Application Layer                           |
//! |        generated service code -> Skeleton / Proxy objects         |
//! +--------------------------------------------------------------------+
//! |                           Runtime                                  |
//! |  Reactor | Steady timers | Lookup tables | Worker pools | Config  |
//! +--------------------------------------------------------------------+
//! |                      Deterministic memory                          |
//! |      ArenaMap / StaticMap | BufferProvider | byte allocator       |
//! +--------------------------------------------------------------------+
//! |                     Transport bindings (pluggable)                 |
//! |        shared-memory IPC | SOME/IP | any backend impl             |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Runtime`] | Context object owning reactor, timers, and lookup tables |
//! | [`Skeleton`] | Server-side object for one offered service instance |
//! | [`SkeletonEvent`] | Event send/allocate dispatch across backends |
//! | [`SkeletonField`] | Field get/set/notify with wiring validation |
//! | [`BufferProvider`] | One-shot chunk pool, allocation-free afterwards |
//! | [`LoggerBase`] | Reactor-driven logging core with bounded queueing |
//!
//! ## Error model
//!
//! Recoverable runtime conditions surface as [`ComError`]; violated
//! preconditions (duplicate runtime construction, mixed event memory
//! strategies, allocator misuse) log a fatal diagnostic and panic. See the
//! [`com`] module docs.

/// Public error model.
pub mod com;
/// Runtime configuration aggregate and builder.
pub mod config;
/// Deterministic lookup containers (arena map, static map).
pub mod containers;
/// Logging and tracing core.
pub mod logging;
/// Deterministic message-buffer memory.
pub mod memory;
/// Instance specifier / identifier lookup.
pub mod registry;
/// Communication runtime (reactor, timers, pools, lifecycle).
pub mod runtime;
/// Server-side service objects (skeleton, event, field).
pub mod skeleton;

pub use com::{ComError, Result};
pub use config::{
    Configuration, ConfigurationBuilder, RuntimeProcessingMode, ServiceInstanceMapping,
    ThreadPoolConfig, DEFAULT_POOL_ID,
};
pub use containers::{ArenaMap, HasKey, NodeHandle, StaticMap};
pub use logging::{ConsoleSink, FileSink, LogRecord, Logger, LoggerBase, Severity, Sink};
pub use memory::{
    BufferHandle, BufferProvider, DeterministicBuffer, DeterministicBufferAllocator,
};
pub use registry::{InstanceIdentifier, InstanceSpecifier, InstanceSpecifierLookupTable};
pub use runtime::{
    ComFuture, LifecycleManager, LifecycleStage, ObjectTracker, PollReactorFactory, Promise,
    Reactor, ReactorFactory, Runtime, SteadyTimerManager, UnblockReason, WorkerPool,
    WorkerPoolManager,
};
pub use skeleton::{
    EventBackend, FieldCapabilities, SampleBox, Skeleton, SkeletonBackend, SkeletonEvent,
    SkeletonField,
};

/// SOCAL version string.
pub const VERSION: &str = "0.3.2";
