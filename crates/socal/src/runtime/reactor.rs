// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OS event-loop abstraction.
//!
//! The reactor wraps an epoll-like poller (`mio::Poll`) behind a small
//! trait so the runtime can drive it either from a dedicated thread or from
//! the application's polling calls. Construction is two-phase, mirroring the
//! "size everything first" discipline of the rest of the core:
//!
//! 1. [`ReactorFactory::preconstruct`] performs every fallible step (poller
//!    creation, waker registration, callback-table sizing) and yields a
//!    token;
//! 2. [`ReactorFactory::construct`] turns the token into a live reactor and
//!    cannot fail.
//!
//! # Single-driver contract
//!
//! `handle_events` must only ever be called by one thread at a time (the
//! dedicated reactor thread, or the polling caller serialized by the
//! runtime's polling lock). This is a documented precondition, not an
//! internal lock.

use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Why `handle_events` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnblockReason {
    /// At least one registered callback was dispatched.
    EventsHandled,
    /// The timeout elapsed without activity.
    Timeout,
    /// The waker fired (cross-thread unblock), nothing else was ready.
    Woken,
}

/// Callback dispatched when a registered event source becomes ready.
pub type EventCallback = Box<dyn FnMut() + Send>;

/// Handle for a registered callback slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackHandle(usize);

/// Cross-thread unblock handle for a reactor.
#[derive(Clone)]
pub struct ReactorWaker {
    inner: Arc<mio::Waker>,
}

impl ReactorWaker {
    /// Interrupt a blocking `handle_events` call.
    pub fn wake(&self) -> io::Result<()> {
        self.inner.wake()
    }
}

/// Event-loop driver. See the module docs for the single-driver contract.
pub trait Reactor: Send {
    /// Block for up to `timeout` (forever when `None`) and dispatch ready
    /// callbacks.
    fn handle_events(&mut self, timeout: Option<Duration>) -> io::Result<UnblockReason>;

    /// Obtain a waker usable from any thread.
    fn waker(&self) -> ReactorWaker;
}

/// Two-phase reactor construction.
pub trait ReactorFactory: Send {
    /// Fallible phase: allocate the poller and size the callback table for
    /// `n_callbacks` registrations.
    fn preconstruct(&self, n_callbacks: usize) -> io::Result<ReactorToken>;

    /// Infallible phase: assemble the reactor from a preconstructed token.
    fn construct(&self, token: ReactorToken) -> Box<dyn Reactor>;
}

/// Resources produced by [`ReactorFactory::preconstruct`].
pub struct ReactorToken {
    poll: mio::Poll,
    waker: Arc<mio::Waker>,
    capacity: usize,
}

/// Token reserved for the waker; callback slots use `0..capacity`.
const WAKER_TOKEN: mio::Token = mio::Token(usize::MAX);

/// Default factory producing [`PollReactor`] instances.
pub struct PollReactorFactory;

impl ReactorFactory for PollReactorFactory {
    fn preconstruct(&self, n_callbacks: usize) -> io::Result<ReactorToken> {
        let poll = mio::Poll::new()?;
        let waker = Arc::new(mio::Waker::new(poll.registry(), WAKER_TOKEN)?);
        Ok(ReactorToken {
            poll,
            waker,
            capacity: n_callbacks,
        })
    }

    fn construct(&self, token: ReactorToken) -> Box<dyn Reactor> {
        Box::new(PollReactor::from_token(token))
    }
}

/// `mio::Poll`-backed reactor with a fixed callback-slot table.
pub struct PollReactor {
    poll: mio::Poll,
    events: mio::Events,
    waker: Arc<mio::Waker>,
    callbacks: Vec<Option<EventCallback>>,
    free_slots: Vec<usize>,
}

impl PollReactor {
    fn from_token(token: ReactorToken) -> Self {
        let capacity = token.capacity.max(1);
        let mut callbacks = Vec::with_capacity(capacity);
        callbacks.resize_with(capacity, || None);
        Self {
            poll: token.poll,
            // One spare slot so the waker event never evicts a source event.
            events: mio::Events::with_capacity(capacity + 1),
            waker: token.waker,
            callbacks,
            free_slots: (0..capacity).rev().collect(),
        }
    }

    /// Register an event source with its dispatch callback.
    ///
    /// Fails with `Other` when the preconstructed slot table is full:
    /// `preconstruct` sized it, so running out means the sizing input was
    /// wrong.
    pub fn register<S: mio::event::Source>(
        &mut self,
        source: &mut S,
        interest: mio::Interest,
        callback: EventCallback,
    ) -> io::Result<CallbackHandle> {
        let slot = self.free_slots.pop().ok_or_else(|| {
            io::Error::other("reactor callback table full (preconstructed capacity exceeded)")
        })?;
        if let Err(e) = self
            .poll
            .registry()
            .register(source, mio::Token(slot), interest)
        {
            self.free_slots.push(slot);
            return Err(e);
        }
        self.callbacks[slot] = Some(callback);
        Ok(CallbackHandle(slot))
    }

    /// Deregister a source and release its callback slot.
    pub fn deregister<S: mio::event::Source>(
        &mut self,
        source: &mut S,
        handle: CallbackHandle,
    ) -> io::Result<()> {
        self.poll.registry().deregister(source)?;
        if self.callbacks[handle.0].take().is_some() {
            self.free_slots.push(handle.0);
        }
        Ok(())
    }
}

impl Reactor for PollReactor {
    fn handle_events(&mut self, timeout: Option<Duration>) -> io::Result<UnblockReason> {
        self.poll.poll(&mut self.events, timeout)?;

        // Collect tokens first; dispatching borrows the callback table.
        let tokens: Vec<mio::Token> = self.events.iter().map(|event| event.token()).collect();
        if tokens.is_empty() {
            return Ok(UnblockReason::Timeout);
        }

        let mut dispatched = false;
        let mut woken = false;
        for token in tokens {
            if token == WAKER_TOKEN {
                woken = true;
                continue;
            }
            if let Some(Some(callback)) = self.callbacks.get_mut(token.0) {
                callback();
                dispatched = true;
            } else {
                log::warn!("[reactor] event for unregistered slot {}", token.0);
            }
        }

        if dispatched {
            Ok(UnblockReason::EventsHandled)
        } else if woken {
            Ok(UnblockReason::Woken)
        } else {
            Ok(UnblockReason::Timeout)
        }
    }

    fn waker(&self) -> ReactorWaker {
        ReactorWaker {
            inner: Arc::clone(&self.waker),
        }
    }
}
