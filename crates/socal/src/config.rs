// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime configuration.
//!
//! A [`Configuration`] aggregates everything the runtime needs at
//! initialization: worker-pool definitions, the processing mode, and the
//! per-service provided/required instance mappings used to seed the lookup
//! tables. It is built once through [`Configuration::builder`] and immutable
//! afterwards; the runtime keeps it as an atomic snapshot.

use crate::com::{ComError, Result};
use crate::registry::{InstanceIdentifier, InstanceSpecifier};

/// Reserved pool id for the default / continuation worker pool.
///
/// Method continuations and unassigned services are dispatched here.
pub const DEFAULT_POOL_ID: u8 = 0;

/// How the runtime drives its reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeProcessingMode {
    /// The application thread steps the reactor explicitly via
    /// `Runtime::process_polling`. Future callback chaining is rejected in
    /// this mode (single-poller deadlock hazard).
    Polling,
    /// A dedicated runtime thread drives the reactor; events are dispatched
    /// as they arrive.
    ThreadDriven,
}

/// One worker thread pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Pool id; [`DEFAULT_POOL_ID`] is reserved for the default pool.
    pub pool_id: u8,
    /// Number of OS threads.
    pub thread_count: usize,
    /// Bounded task queue capacity; enqueue past this fails with
    /// `QueueSizeExceeded`.
    pub max_task_count: usize,
    /// Instance specifiers whose method dispatch is pinned to this pool.
    pub assignments: Vec<InstanceSpecifier>,
    /// Optional OS thread name prefix.
    pub os_thread_name: Option<String>,
}

impl ThreadPoolConfig {
    /// Convenience constructor with no assignments and no thread name.
    pub fn new(pool_id: u8, thread_count: usize, max_task_count: usize) -> Self {
        Self {
            pool_id,
            thread_count,
            max_task_count,
            assignments: Vec::new(),
            os_thread_name: None,
        }
    }
}

/// One service's instance wiring: which specifiers exist for the service and
/// which binding identifiers each specifier maps to.
#[derive(Debug, Clone)]
pub struct ServiceInstanceMapping {
    pub shortname_path: String,
    pub specifier: InstanceSpecifier,
    pub identifiers: Vec<InstanceIdentifier>,
}

/// Immutable configuration aggregate.
#[derive(Debug, Clone)]
pub struct Configuration {
    processing_mode: RuntimeProcessingMode,
    thread_pools: Vec<ThreadPoolConfig>,
    default_p_port_pool: Option<u8>,
    default_r_port_pool: Option<u8>,
    provided: Vec<ServiceInstanceMapping>,
    required: Vec<ServiceInstanceMapping>,
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    pub fn processing_mode(&self) -> RuntimeProcessingMode {
        self.processing_mode
    }

    pub fn thread_pools(&self) -> &[ThreadPoolConfig] {
        &self.thread_pools
    }

    /// Pool handling provided-service (P-Port) method dispatch when no
    /// per-instance assignment matches; [`DEFAULT_POOL_ID`] when unset.
    pub fn default_p_port_pool(&self) -> u8 {
        self.default_p_port_pool.unwrap_or(DEFAULT_POOL_ID)
    }

    /// Pool handling required-service (R-Port) continuations when no
    /// per-instance assignment matches; [`DEFAULT_POOL_ID`] when unset.
    pub fn default_r_port_pool(&self) -> u8 {
        self.default_r_port_pool.unwrap_or(DEFAULT_POOL_ID)
    }

    /// Provided (P-Port) instance mappings.
    pub fn provided_instances(&self) -> &[ServiceInstanceMapping] {
        &self.provided
    }

    /// Required (R-Port) instance mappings.
    pub fn required_instances(&self) -> &[ServiceInstanceMapping] {
        &self.required
    }
}

impl Default for Configuration {
    /// Polling-mode configuration with a single one-thread default pool.
    fn default() -> Self {
        Self {
            processing_mode: RuntimeProcessingMode::Polling,
            thread_pools: vec![ThreadPoolConfig::new(DEFAULT_POOL_ID, 1, 64)],
            default_p_port_pool: None,
            default_r_port_pool: None,
            provided: Vec::new(),
            required: Vec::new(),
        }
    }
}

/// Builder for [`Configuration`].
#[derive(Debug, Default)]
pub struct ConfigurationBuilder {
    processing_mode: Option<RuntimeProcessingMode>,
    thread_pools: Vec<ThreadPoolConfig>,
    default_p_port_pool: Option<u8>,
    default_r_port_pool: Option<u8>,
    provided: Vec<ServiceInstanceMapping>,
    required: Vec<ServiceInstanceMapping>,
}

impl ConfigurationBuilder {
    pub fn processing_mode(mut self, mode: RuntimeProcessingMode) -> Self {
        self.processing_mode = Some(mode);
        self
    }

    /// Add a worker pool definition.
    pub fn thread_pool(mut self, config: ThreadPoolConfig) -> Self {
        self.thread_pools.push(config);
        self
    }

    /// Designate the default P-Port dispatch pool (must be a declared pool
    /// id).
    pub fn default_p_port_pool(mut self, pool_id: u8) -> Self {
        self.default_p_port_pool = Some(pool_id);
        self
    }

    /// Designate the default R-Port continuation pool (must be a declared
    /// pool id).
    pub fn default_r_port_pool(mut self, pool_id: u8) -> Self {
        self.default_r_port_pool = Some(pool_id);
        self
    }

    /// Declare a provided service instance and its binding identifiers.
    pub fn provide_instance(
        mut self,
        shortname_path: impl Into<String>,
        specifier: InstanceSpecifier,
        identifiers: Vec<InstanceIdentifier>,
    ) -> Self {
        self.provided.push(ServiceInstanceMapping {
            shortname_path: shortname_path.into(),
            specifier,
            identifiers,
        });
        self
    }

    /// Declare a required service instance and its binding identifiers.
    pub fn require_instance(
        mut self,
        shortname_path: impl Into<String>,
        specifier: InstanceSpecifier,
        identifiers: Vec<InstanceIdentifier>,
    ) -> Self {
        self.required.push(ServiceInstanceMapping {
            shortname_path: shortname_path.into(),
            specifier,
            identifiers,
        });
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// Configuration is operator input, so violations are recoverable
    /// errors, not fatal: duplicate pool ids, zero thread counts, and zero
    /// queue capacities are rejected. A default pool is synthesized when
    /// none was declared.
    pub fn build(mut self) -> Result<Configuration> {
        if !self
            .thread_pools
            .iter()
            .any(|pool| pool.pool_id == DEFAULT_POOL_ID)
        {
            self.thread_pools
                .insert(0, ThreadPoolConfig::new(DEFAULT_POOL_ID, 1, 64));
        }

        let mut seen = std::collections::HashSet::new();
        for pool in &self.thread_pools {
            if !seen.insert(pool.pool_id) {
                return Err(ComError::InvalidConfiguration(format!(
                    "duplicate thread pool id {}",
                    pool.pool_id
                )));
            }
            if pool.thread_count == 0 {
                return Err(ComError::InvalidConfiguration(format!(
                    "thread pool {} has zero threads",
                    pool.pool_id
                )));
            }
            if pool.max_task_count == 0 {
                return Err(ComError::InvalidConfiguration(format!(
                    "thread pool {} has zero task capacity",
                    pool.pool_id
                )));
            }
        }

        for (role, pool_id) in [
            ("P-Port", self.default_p_port_pool),
            ("R-Port", self.default_r_port_pool),
        ] {
            if let Some(pool_id) = pool_id {
                if !seen.contains(&pool_id) {
                    return Err(ComError::InvalidConfiguration(format!(
                        "default {} pool {} is not a declared pool",
                        role, pool_id
                    )));
                }
            }
        }

        Ok(Configuration {
            processing_mode: self
                .processing_mode
                .unwrap_or(RuntimeProcessingMode::Polling),
            thread_pools: self.thread_pools,
            default_p_port_pool: self.default_p_port_pool,
            default_r_port_pool: self.default_r_port_pool,
            provided: self.provided,
            required: self.required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_synthesized() {
        let config = Configuration::builder().build().expect("valid config");
        assert_eq!(config.thread_pools().len(), 1);
        assert_eq!(config.thread_pools()[0].pool_id, DEFAULT_POOL_ID);
        assert_eq!(config.processing_mode(), RuntimeProcessingMode::Polling);
    }

    #[test]
    fn test_duplicate_pool_id_rejected() {
        let result = Configuration::builder()
            .thread_pool(ThreadPoolConfig::new(3, 2, 16))
            .thread_pool(ThreadPoolConfig::new(3, 1, 16))
            .build();
        assert!(matches!(result, Err(ComError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(Configuration::builder()
            .thread_pool(ThreadPoolConfig::new(1, 0, 16))
            .build()
            .is_err());
        assert!(Configuration::builder()
            .thread_pool(ThreadPoolConfig::new(1, 1, 0))
            .build()
            .is_err());
    }

    #[test]
    fn test_default_port_pools() {
        let config = Configuration::builder()
            .thread_pool(ThreadPoolConfig::new(2, 2, 32))
            .thread_pool(ThreadPoolConfig::new(3, 1, 32))
            .default_p_port_pool(2)
            .default_r_port_pool(3)
            .build()
            .expect("valid config");
        assert_eq!(config.default_p_port_pool(), 2);
        assert_eq!(config.default_r_port_pool(), 3);

        // Unset designations fall back to the default pool.
        let config = Configuration::builder().build().expect("valid config");
        assert_eq!(config.default_p_port_pool(), DEFAULT_POOL_ID);
        assert_eq!(config.default_r_port_pool(), DEFAULT_POOL_ID);

        // A designation must reference a declared pool.
        assert!(Configuration::builder()
            .default_p_port_pool(9)
            .build()
            .is_err());
    }

    #[test]
    fn test_instance_mappings_carried() {
        let specifier = InstanceSpecifier::new("rootSwc/pport0").expect("valid");
        let identifier = InstanceIdentifier::new("Ipc:1").expect("valid");
        let config = Configuration::builder()
            .processing_mode(RuntimeProcessingMode::ThreadDriven)
            .provide_instance("/Services/Foo", specifier.clone(), vec![identifier])
            .build()
            .expect("valid config");

        assert_eq!(config.provided_instances().len(), 1);
        assert_eq!(config.provided_instances()[0].specifier, specifier);
        assert!(config.required_instances().is_empty());
    }
}
