// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ordered construction and destruction of service singletons.
//!
//! Generated service code registers one entry per skeleton/proxy singleton;
//! the runtime appends its own worker-pool stage. Initialization runs in
//! strict stage order (skeletons, then proxies, then worker pools),
//! de-initialization in the exact reverse order of what was initialized.

use crate::com::Result;

/// Initialization stages, in init order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleStage {
    /// Provided-service singletons.
    Skeletons,
    /// Required-service singletons.
    Proxies,
    /// Worker-pool manager (always last on init, first on deinit).
    WorkerPools,
}

type InitFn = Box<dyn FnOnce() -> Result<()> + Send>;
type DeinitFn = Box<dyn FnOnce() + Send>;

struct Registrant {
    stage: LifecycleStage,
    name: String,
    init: Option<InitFn>,
    deinit: Option<DeinitFn>,
}

/// Registry of lifecycle entries with ordered init/deinit execution.
pub struct LifecycleManager {
    registrants: Vec<Registrant>,
    /// Indices into `registrants` in the order their init ran.
    initialized: Vec<usize>,
    init_ran: bool,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            registrants: Vec::new(),
            initialized: Vec::new(),
            init_ran: false,
        }
    }

    /// Register a named entry for `stage`.
    ///
    /// A duplicate name means the same singleton would be constructed
    /// twice, which is fatal.
    pub fn register(
        &mut self,
        stage: LifecycleStage,
        name: impl Into<String>,
        init: InitFn,
        deinit: DeinitFn,
    ) {
        let name = name.into();
        if self.registrants.iter().any(|r| r.name == name) {
            log::error!("[lifecycle] duplicate registrant '{}'", name);
            panic!("lifecycle registrant '{}' registered twice", name);
        }
        self.registrants.push(Registrant {
            stage,
            name,
            init: Some(init),
            deinit: Some(deinit),
        });
    }

    /// Run every init in stage order (registration order within a stage).
    ///
    /// On failure the already-initialized entries are de-initialized in
    /// reverse before the error is returned. Running the chain twice is
    /// fatal.
    pub fn run_init(&mut self) -> Result<()> {
        if self.init_ran {
            log::error!("[lifecycle] init chain invoked twice");
            panic!("lifecycle init chain must only run once");
        }
        self.init_ran = true;

        let mut order: Vec<usize> = (0..self.registrants.len()).collect();
        order.sort_by_key(|&i| self.registrants[i].stage);

        for index in order {
            let registrant = &mut self.registrants[index];
            let name = registrant.name.clone();
            let init = registrant.init.take().expect("init consumed only here");
            log::debug!("[lifecycle] init '{}'", name);
            if let Err(e) = init() {
                log::error!("[lifecycle] init '{}' failed: {}; rolling back", name, e);
                self.run_deinit();
                return Err(e);
            }
            self.initialized.push(index);
        }
        Ok(())
    }

    /// De-initialize in the exact reverse of the init order. Entries whose
    /// init never ran are skipped.
    pub fn run_deinit(&mut self) {
        while let Some(index) = self.initialized.pop() {
            let registrant = &mut self.registrants[index];
            log::debug!("[lifecycle] deinit '{}'", registrant.name);
            if let Some(deinit) = registrant.deinit.take() {
                deinit();
            }
        }
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.registrants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrants.is_empty()
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
