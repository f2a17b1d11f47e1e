// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Communication runtime.
//!
//! The [`Runtime`] is the synchronization point everything else depends on:
//! it owns the reactor, the steady timer manager, both instance lookup
//! tables, the configuration snapshot, and the worker pools. It is an
//! explicit context object, constructed once at process start and passed
//! to whoever needs it; there is no hidden global instance. A process-wide
//! liveness latch still enforces the construct-once / destroy-once
//! lifecycle: building a second runtime while one is alive is fatal.
//!
//! # Architecture
//!
//! ```text
//! LifecycleManager -> Runtime (reactor + lookup tables + pools)
//!        v
//! Skeleton / Proxy objects -> SkeletonEvent / SkeletonField
//!        v
//! backend interfaces (transport bindings, pluggable)
//! ```
//!
//! # Processing modes
//!
//! - `ThreadDriven`: a dedicated runtime thread drives the reactor and the
//!   timer manager; events dispatch as they arrive.
//! - `Polling`: the application calls [`Runtime::process_polling`]; the
//!   dedicated polling lock serializes concurrent callers, and future
//!   continuations (`then`) are rejected.

/// Promise/future pairs.
pub mod future;
/// Ordered singleton construction/destruction.
pub mod lifecycle;
/// Worker thread pools.
pub mod pool;
/// OS event-loop abstraction.
pub mod reactor;
/// Steady timer management.
pub mod timer;

pub use future::{ComFuture, Promise};
pub use lifecycle::{LifecycleManager, LifecycleStage};
pub use pool::{WorkerPool, WorkerPoolManager};
pub use reactor::{
    PollReactor, PollReactorFactory, Reactor, ReactorFactory, ReactorToken, ReactorWaker,
    UnblockReason,
};
pub use timer::{SteadyTimerManager, TimerHandle};

use crate::com::{ComError, Result};
use crate::config::{Configuration, RuntimeProcessingMode};
use crate::registry::InstanceSpecifierLookupTable;
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Callback slots preconstructed for the reactor. Bindings register their
/// event sources against this budget.
const REACTOR_CALLBACK_SLOTS: usize = 64;

/// Upper bound for one reactor-thread poll cycle; keeps the running flag
/// responsive even with no timers registered.
const REACTOR_IDLE_TIMEOUT: Duration = Duration::from_millis(100);

/// Process-wide construct-once latch.
static RUNTIME_LIVE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuntimeState {
    Initializing,
    Running,
    ShuttingDown,
    Uninitialized,
}

/// Counts a live communication object (skeleton, proxy, find-service watch).
///
/// The runtime refuses orderly de-initialization while trackers are alive.
pub struct ObjectTracker {
    counter: Arc<AtomicUsize>,
}

impl ObjectTracker {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Clone for ObjectTracker {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.counter))
    }
}

impl Drop for ObjectTracker {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ReactorThread {
    running: Arc<AtomicBool>,
    waker: ReactorWaker,
    handle: JoinHandle<()>,
}

impl ReactorThread {
    fn stop(self) {
        self.running.store(false, Ordering::Release);
        if self.waker.wake().is_err() {
            log::warn!("[runtime] reactor waker failed during shutdown");
        }
        if self.handle.join().is_err() {
            log::error!("[runtime] reactor thread panicked");
        }
    }
}

/// The communication runtime context.
pub struct Runtime {
    state: Mutex<RuntimeState>,
    processing_mode: RuntimeProcessingMode,
    config: ArcSwap<Configuration>,
    provided: RwLock<InstanceSpecifierLookupTable>,
    required: RwLock<InstanceSpecifierLookupTable>,
    timers: Arc<SteadyTimerManager>,
    /// Polling mode: owns the reactor and serializes `process_polling`
    /// callers. Thread-driven mode keeps `None` here (the thread owns it).
    process_polling_lock: Mutex<Option<Box<dyn Reactor>>>,
    reactor_thread: Mutex<Option<ReactorThread>>,
    lifecycle: Mutex<LifecycleManager>,
    pools: Arc<Mutex<Option<WorkerPoolManager>>>,
    live_objects: Arc<AtomicUsize>,
}

impl Runtime {
    /// Initialize the communication runtime.
    ///
    /// Must run in the process init context (single-threaded); building a
    /// second runtime while one is alive is fatal. Reactor construction
    /// failure is fatal too; nothing in the system works without it.
    ///
    /// `lifecycle` carries the generated skeleton/proxy registrants; the
    /// runtime appends its worker-pool stage and runs the whole chain
    /// (skeletons, then proxies, then pools).
    pub fn initialize(
        config: Configuration,
        factory: &dyn ReactorFactory,
        mut lifecycle: LifecycleManager,
    ) -> Result<Runtime> {
        if RUNTIME_LIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::error!("[runtime] initialize called while a runtime is alive");
            panic!("communication runtime already initialized");
        }

        let token = match factory.preconstruct(REACTOR_CALLBACK_SLOTS) {
            Ok(token) => token,
            Err(e) => {
                log::error!("[runtime] reactor preconstruction failed: {}", e);
                RUNTIME_LIVE.store(false, Ordering::SeqCst);
                panic!("reactor construction failed: {}", e);
            }
        };
        let reactor = factory.construct(token);

        let mut provided = InstanceSpecifierLookupTable::new();
        let mut required = InstanceSpecifierLookupTable::new();
        Self::populate_table(&mut provided, config.provided_instances());
        Self::populate_table(&mut required, config.required_instances());

        // The worker-pool manager is the last init stage and therefore the
        // first deinit stage.
        let pools: Arc<Mutex<Option<WorkerPoolManager>>> = Arc::new(Mutex::new(None));
        {
            let init_slot = Arc::clone(&pools);
            let deinit_slot = Arc::clone(&pools);
            let pool_config = config.clone();
            lifecycle.register(
                LifecycleStage::WorkerPools,
                "worker-pool-manager",
                Box::new(move || {
                    *init_slot.lock() = Some(WorkerPoolManager::from_configuration(&pool_config)?);
                    Ok(())
                }),
                Box::new(move || {
                    if let Some(manager) = deinit_slot.lock().take() {
                        manager.shutdown();
                    }
                }),
            );
        }
        if let Err(e) = lifecycle.run_init() {
            RUNTIME_LIVE.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let runtime = Runtime {
            state: Mutex::new(RuntimeState::Initializing),
            processing_mode: config.processing_mode(),
            config: ArcSwap::from_pointee(config),
            provided: RwLock::new(provided),
            required: RwLock::new(required),
            timers: Arc::new(SteadyTimerManager::new()),
            process_polling_lock: Mutex::new(None),
            reactor_thread: Mutex::new(None),
            lifecycle: Mutex::new(lifecycle),
            pools,
            live_objects: Arc::new(AtomicUsize::new(0)),
        };

        match runtime.processing_mode {
            RuntimeProcessingMode::Polling => {
                *runtime.process_polling_lock.lock() = Some(reactor);
            }
            RuntimeProcessingMode::ThreadDriven => {
                let thread = runtime.spawn_reactor_thread(reactor);
                *runtime.reactor_thread.lock() = Some(thread);
            }
        }

        *runtime.state.lock() = RuntimeState::Running;
        log::info!(
            "[runtime] initialized ({:?} mode)",
            runtime.processing_mode
        );
        Ok(runtime)
    }

    fn populate_table(
        table: &mut InstanceSpecifierLookupTable,
        mappings: &[crate::config::ServiceInstanceMapping],
    ) {
        for mapping in mappings {
            table.add_instance_specifier(mapping.specifier.clone(), &mapping.shortname_path);
            for identifier in &mapping.identifiers {
                let mapped = table
                    .map_instance_specifier_to_instance_id(&mapping.specifier, identifier.clone());
                if !mapped {
                    log::error!(
                        "[runtime] duplicate instance mapping {} -> {}",
                        mapping.specifier,
                        identifier
                    );
                    panic!(
                        "configuration maps ({}, {}) twice",
                        mapping.specifier, identifier
                    );
                }
            }
        }
    }

    fn spawn_reactor_thread(&self, mut reactor: Box<dyn Reactor>) -> ReactorThread {
        let running = Arc::new(AtomicBool::new(true));
        let run_flag = Arc::clone(&running);
        let timers = Arc::clone(&self.timers);
        let waker = reactor.waker();

        let handle = std::thread::Builder::new()
            .name("socal-reactor".to_string())
            .spawn(move || {
                while run_flag.load(Ordering::Acquire) {
                    let timeout = timers
                        .next_deadline()
                        .map(|deadline| {
                            deadline
                                .saturating_duration_since(std::time::Instant::now())
                                .min(REACTOR_IDLE_TIMEOUT)
                        })
                        .unwrap_or(REACTOR_IDLE_TIMEOUT);
                    if let Err(e) = reactor.handle_events(Some(timeout)) {
                        log::error!("[runtime] reactor poll failed: {}", e);
                        break;
                    }
                    timers.fire_due();
                }
            })
            .expect("spawning the reactor thread");

        ReactorThread {
            running,
            waker,
            handle,
        }
    }

    /// Drive one reactor step in polling mode.
    ///
    /// Thread-safe: concurrent callers are serialized by the polling lock.
    /// Returns whether any event or timer was actually processed, so the
    /// caller can implement its own backoff around the poll loop. In
    /// thread-driven mode this is a documented no-op returning `Ok(false)`.
    pub fn process_polling(&self) -> Result<bool> {
        if self.processing_mode == RuntimeProcessingMode::ThreadDriven {
            log::debug!("[runtime] process_polling ignored in thread-driven mode");
            return Ok(false);
        }

        let mut guard = self.process_polling_lock.lock();
        let Some(reactor) = guard.as_mut() else {
            return Ok(false);
        };
        let reason = reactor
            .handle_events(Some(Duration::ZERO))
            .map_err(ComError::from)?;
        let fired = self.timers.fire_due();
        Ok(reason == UnblockReason::EventsHandled || fired > 0)
    }

    /// Orderly teardown.
    ///
    /// Preconditions: every skeleton/proxy/find-service object tracked via
    /// [`Runtime::track_object`] has been dropped; anything else is fatal.
    /// Order: lifecycle deinit chain (pools, proxies, skeletons), reactor
    /// thread stop, timer manager teardown, reactor release.
    pub fn deinitialize(self) {
        let outstanding = self.live_objects.load(Ordering::SeqCst);
        if outstanding != 0 {
            log::error!(
                "[runtime] deinitialize with {} live communication objects",
                outstanding
            );
            panic!(
                "runtime deinitialized while {} communication objects are alive",
                outstanding
            );
        }

        *self.state.lock() = RuntimeState::ShuttingDown;
        self.teardown();
        *self.state.lock() = RuntimeState::Uninitialized;
        log::info!("[runtime] deinitialized");
    }

    fn teardown(&self) {
        self.lifecycle.lock().run_deinit();
        if let Some(thread) = self.reactor_thread.lock().take() {
            thread.stop();
        }
        // The timer manager must be emptied before the reactor goes away;
        // its deadlines feed the reactor's poll timeouts.
        self.timers.clear();
        *self.process_polling_lock.lock() = None;
        self.provided.write().clear();
        self.required.write().clear();
        RUNTIME_LIVE.store(false, Ordering::SeqCst);
    }

    /// Whether the runtime is between initialize and deinitialize.
    pub fn is_running(&self) -> bool {
        *self.state.lock() == RuntimeState::Running
    }

    pub fn processing_mode(&self) -> RuntimeProcessingMode {
        self.processing_mode
    }

    /// The immutable configuration snapshot.
    pub fn configuration(&self) -> Arc<Configuration> {
        self.config.load_full()
    }

    /// Lookup table for provided (P-Port) instances.
    pub fn provided_instances(&self) -> RwLockReadGuard<'_, InstanceSpecifierLookupTable> {
        self.provided.read()
    }

    /// Lookup table for required (R-Port) instances.
    pub fn required_instances(&self) -> RwLockReadGuard<'_, InstanceSpecifierLookupTable> {
        self.required.read()
    }

    /// The steady timer manager shared with the reactor.
    pub fn timer_manager(&self) -> &Arc<SteadyTimerManager> {
        &self.timers
    }

    /// Worker pools (present between init and deinit).
    pub fn worker_pools(&self) -> Arc<Mutex<Option<WorkerPoolManager>>> {
        Arc::clone(&self.pools)
    }

    /// Register a live communication object; the returned tracker blocks
    /// de-initialization until dropped.
    pub fn track_object(&self) -> ObjectTracker {
        ObjectTracker::new(Arc::clone(&self.live_objects))
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // RAII fallback for a runtime dropped without deinitialize(): tear
        // down best-effort and release the liveness latch. The strict
        // precondition checks live on the explicit deinitialize() path.
        let state = *self.state.lock();
        if state == RuntimeState::Running {
            log::warn!("[runtime] dropped without deinitialize; tearing down");
            self.teardown();
        }
    }
}
