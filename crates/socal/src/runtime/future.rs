// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot promise/future pairs.
//!
//! All asynchrony in the public API is expressed through these pairs; no
//! public call blocks beyond short lock sections. The implementation is a
//! condvar-backed value slot with an optional continuation callback.
//!
//! Continuations are mode-gated: a future minted under
//! [`RuntimeProcessingMode::Polling`] rejects `then()` fatally, because a
//! callback chained onto the single polling thread can deadlock it.

use crate::com::{ComError, Result};
use crate::config::RuntimeProcessingMode;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

type ThenCallback<T> = Box<dyn FnOnce(Result<T>) + Send>;

struct State<T> {
    value: Option<Result<T>>,
    callback: Option<ThenCallback<T>>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    cond: Condvar,
}

/// Producer half of a one-shot value channel.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
    completed: bool,
}

/// Consumer half; returned to callers of asynchronous APIs.
pub struct ComFuture<T> {
    shared: Arc<Shared<T>>,
    mode: RuntimeProcessingMode,
}

impl<T> Promise<T> {
    /// Create a connected promise/future pair. The mode controls the
    /// future's continuation policy (see module docs).
    pub fn pair(mode: RuntimeProcessingMode) -> (Promise<T>, ComFuture<T>) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                value: None,
                callback: None,
            }),
            cond: Condvar::new(),
        });
        (
            Promise {
                shared: Arc::clone(&shared),
                completed: false,
            },
            ComFuture { shared, mode },
        )
    }

    /// Fulfill the future.
    pub fn set_value(mut self, value: T) {
        self.completed = true;
        self.complete(Ok(value));
    }

    /// Fail the future.
    pub fn set_error(mut self, error: ComError) {
        self.completed = true;
        self.complete(Err(error));
    }

    fn complete(&self, result: Result<T>) {
        let callback = {
            let mut state = self.shared.state.lock();
            match state.callback.take() {
                Some(callback) => Some((callback, result)),
                None => {
                    state.value = Some(result);
                    self.shared.cond.notify_all();
                    None
                }
            }
        };
        // Continuations run without the state lock held.
        if let Some((callback, result)) = callback {
            callback(result);
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        // An abandoned promise must not strand a waiter forever.
        if !self.completed {
            self.complete(Err(ComError::HandlerFailed(
                "promise dropped without a value".to_string(),
            )));
        }
    }
}

impl<T> ComFuture<T> {
    /// A future that is already resolved.
    pub fn ready(result: Result<T>, mode: RuntimeProcessingMode) -> Self {
        let (promise, future) = Promise::pair(mode);
        match result {
            Ok(value) => promise.set_value(value),
            Err(error) => promise.set_error(error),
        }
        future
    }

    /// Block until the value arrives.
    pub fn wait(self) -> Result<T> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(result) = state.value.take() {
                return result;
            }
            self.shared.cond.wait(&mut state);
        }
    }

    /// Block up to `timeout`; the future is handed back on expiry so the
    /// caller can keep waiting later.
    pub fn wait_for(self, timeout: Duration) -> std::result::Result<Result<T>, Self> {
        {
            let mut state = self.shared.state.lock();
            let deadline = std::time::Instant::now() + timeout;
            loop {
                if let Some(result) = state.value.take() {
                    return Ok(result);
                }
                if self.shared.cond.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
        }
        Err(self)
    }

    /// Non-blocking probe; `None` while still pending.
    pub fn try_take(&mut self) -> Option<Result<T>> {
        self.shared.state.lock().value.take()
    }

    /// Attach a continuation running when the value arrives (immediately if
    /// it already has).
    ///
    /// Fatal under polling mode: the continuation would run on whichever
    /// thread completes the promise, and with a single polling thread that
    /// is a deadlock waiting to happen.
    pub fn then<F>(self, callback: F)
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        if self.mode == RuntimeProcessingMode::Polling {
            log::error!("[future] then() is not available in polling mode");
            panic!("ComFuture::then() must not be used in polling processing mode");
        }

        let ready = {
            let mut state = self.shared.state.lock();
            match state.value.take() {
                Some(result) => Some((result, callback)),
                None => {
                    state.callback = Some(Box::new(callback));
                    None
                }
            }
        };
        if let Some((result, callback)) = ready {
            callback(result);
        }
    }
}
