// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Worker thread pools for method dispatch.
//!
//! Each configured pool runs `thread_count` OS threads draining a bounded
//! channel. Enqueueing past the configured queue capacity is a recoverable
//! error (`QueueSizeExceeded`), letting the caller shed load or back off.
//! Tasks are panic-isolated: one misbehaving handler does not take the pool
//! down.

use crate::com::{ComError, Result};
use crate::config::{Configuration, ThreadPoolConfig, DEFAULT_POOL_ID};
use crossbeam::channel::{bounded, Sender, TrySendError};
use std::thread::JoinHandle;

/// Unit of work dispatched to a pool.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// One worker pool.
pub struct WorkerPool {
    pool_id: u8,
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn the pool's threads per `config`.
    pub fn spawn(config: &ThreadPoolConfig) -> Result<Self> {
        let (sender, receiver) = bounded::<Task>(config.max_task_count);
        let prefix = config
            .os_thread_name
            .clone()
            .unwrap_or_else(|| format!("socal-pool-{}", config.pool_id));

        let mut workers = Vec::with_capacity(config.thread_count);
        for worker_index in 0..config.thread_count {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", prefix, worker_index))
                .spawn(move || {
                    while let Ok(task) = receiver.recv() {
                        // Panic isolation: a handler panic is logged, not
                        // propagated into the pool.
                        let outcome =
                            std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
                        if outcome.is_err() {
                            log::error!("[pool] worker task panicked; continuing");
                        }
                    }
                })?;
            workers.push(handle);
        }

        log::debug!(
            "[pool] pool {} started ({} threads, {} queue slots)",
            config.pool_id,
            config.thread_count,
            config.max_task_count
        );
        Ok(Self {
            pool_id: config.pool_id,
            sender: Some(sender),
            workers,
        })
    }

    pub fn pool_id(&self) -> u8 {
        self.pool_id
    }

    /// Enqueue a task for execution.
    ///
    /// Fails with [`ComError::QueueSizeExceeded`] when the bounded queue is
    /// at capacity; the task is handed back untouched inside the error path
    /// (it is simply dropped here, the caller still owns the decision to
    /// retry with fresh work).
    pub fn enqueue(&self, task: Task) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or(ComError::QueueSizeExceeded)?;
        match sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ComError::QueueSizeExceeded),
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("[pool] enqueue on pool {} after shutdown", self.pool_id);
                Err(ComError::QueueSizeExceeded)
            }
        }
    }

    /// Drain remaining tasks and join every worker.
    pub fn shutdown(mut self) {
        self.shutdown_in_place();
    }

    fn shutdown_in_place(&mut self) {
        // Dropping the sender closes the channel; workers exit after
        // draining what is already queued.
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("[pool] worker thread of pool {} panicked", self.pool_id);
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown_in_place();
    }
}

/// All configured pools, indexed by pool id, plus the per-instance
/// dispatch assignments.
pub struct WorkerPoolManager {
    pools: Vec<WorkerPool>,
    assignments: Vec<(crate::registry::InstanceSpecifier, u8)>,
    p_port_pool: u8,
}

impl WorkerPoolManager {
    /// Spawn every pool named in the configuration. The configuration
    /// validator guarantees a default pool exists.
    pub fn from_configuration(config: &Configuration) -> Result<Self> {
        let mut pools = Vec::with_capacity(config.thread_pools().len());
        let mut assignments = Vec::new();
        for pool_config in config.thread_pools() {
            pools.push(WorkerPool::spawn(pool_config)?);
            for specifier in &pool_config.assignments {
                assignments.push((specifier.clone(), pool_config.pool_id));
            }
        }
        Ok(Self {
            pools,
            assignments,
            p_port_pool: config.default_p_port_pool(),
        })
    }

    /// Look up a pool by id.
    pub fn pool(&self, pool_id: u8) -> Option<&WorkerPool> {
        self.pools.iter().find(|pool| pool.pool_id() == pool_id)
    }

    /// The default / continuation pool (id [`DEFAULT_POOL_ID`]).
    pub fn default_pool(&self) -> &WorkerPool {
        self.pool(DEFAULT_POOL_ID)
            .expect("configuration validation guarantees a default pool")
    }

    /// The dispatch pool for a service instance: its assignment when one
    /// exists, the default P-Port pool otherwise.
    pub fn pool_for(&self, specifier: &crate::registry::InstanceSpecifier) -> &WorkerPool {
        let pool_id = self
            .assignments
            .iter()
            .find(|(assigned, _)| assigned == specifier)
            .map(|&(_, pool_id)| pool_id)
            .unwrap_or(self.p_port_pool);
        self.pool(pool_id)
            .or_else(|| self.pool(DEFAULT_POOL_ID))
            .expect("configuration validation guarantees a default pool")
    }

    /// Shut pools down in reverse creation order.
    pub fn shutdown(mut self) {
        while let Some(pool) = self.pools.pop() {
            pool.shutdown();
        }
    }
}
