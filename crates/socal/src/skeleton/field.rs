// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Skeleton field dispatch.
//!
//! A field composes up to three independently optional capabilities
//! (getter, setter, notifier) declared in [`FieldCapabilities`]. The cached
//! value, both user handlers, and the notification path share one lock
//! (`field_data`) so "notify subscribers" and "update the cached value" are
//! atomic with respect to concurrent `get` calls.
//!
//! [`SkeletonField::is_valid`] is the post-construction wiring check run
//! before the owning service is offered.

use super::event::SkeletonEvent;
use crate::com::{ComError, Result};
use crate::config::RuntimeProcessingMode;
use crate::runtime::ComFuture;
use parking_lot::Mutex;

/// Which of the three field capabilities are configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldCapabilities {
    pub has_getter: bool,
    pub has_setter: bool,
    pub has_notifier: bool,
}

impl FieldCapabilities {
    pub fn all() -> Self {
        Self {
            has_getter: true,
            has_setter: true,
            has_notifier: true,
        }
    }
}

/// User get handler: produces the current field value.
pub type GetHandler<T> = Box<dyn Fn() -> Result<T> + Send>;
/// User set handler: validates a requested value and returns the effective
/// one.
pub type SetHandler<T> = Box<dyn Fn(&T) -> Result<T> + Send>;

struct FieldData<T> {
    value: Option<T>,
    get_handler: Option<GetHandler<T>>,
    set_handler: Option<SetHandler<T>>,
}

/// One field of one offered service instance.
pub struct SkeletonField<T> {
    capabilities: FieldCapabilities,
    mode: RuntimeProcessingMode,
    notifier: Option<SkeletonEvent<T>>,
    field_data: Mutex<FieldData<T>>,
}

impl<T: Clone> SkeletonField<T> {
    /// Wire up a field.
    ///
    /// A notifier capability requires the notification event (and vice
    /// versa); mismatched wiring is generated-code breakage and fatal.
    pub fn new(
        capabilities: FieldCapabilities,
        mode: RuntimeProcessingMode,
        notifier: Option<SkeletonEvent<T>>,
    ) -> Self {
        if capabilities.has_notifier != notifier.is_some() {
            log::error!("[skeleton] field notifier capability and event wiring disagree");
            panic!("field notifier capability requires exactly one notification event");
        }
        Self {
            capabilities,
            mode,
            notifier,
            field_data: Mutex::new(FieldData {
                value: None,
                get_handler: None,
                set_handler: None,
            }),
        }
    }

    pub fn capabilities(&self) -> FieldCapabilities {
        self.capabilities
    }

    /// Register the get handler (getter capability).
    pub fn set_get_handler(&self, handler: GetHandler<T>) {
        self.field_data.lock().get_handler = Some(handler);
    }

    /// Register the set handler (setter capability).
    pub fn set_set_handler(&self, handler: SetHandler<T>) {
        self.field_data.lock().set_handler = Some(handler);
    }

    /// Update the cached value and notify subscribers.
    ///
    /// Valid before the service is offered; that is how the mandatory
    /// initial field value is established; the notification is skipped
    /// silently in that case. A backend notification failure leaves the
    /// cached value unchanged.
    pub fn update(&self, value: T) -> Result<()> {
        let mut data = self.field_data.lock();
        if let Some(notifier) = &self.notifier {
            match notifier.send(&value) {
                Ok(()) | Err(ComError::ServiceNotOffered) => {}
                Err(e) => return Err(e),
            }
        }
        data.value = Some(value);
        Ok(())
    }

    /// Current field value as a future.
    ///
    /// Uses the get handler when one is registered (its failure resolves
    /// the future with the handler's error), otherwise the cached value;
    /// a field that was never updated fails with `FieldValueNotSet`.
    pub fn get(&self) -> ComFuture<T> {
        let data = self.field_data.lock();
        let result = match &data.get_handler {
            Some(handler) => handler(),
            None => match &data.value {
                Some(value) => Ok(value.clone()),
                None => Err(ComError::FieldValueNotSet),
            },
        };
        ComFuture::ready(result, self.mode)
    }

    /// Run the set handler for a requested value; the handler-returned
    /// effective value is cached, notified, and resolved into the future.
    pub fn set(&self, value: T) -> ComFuture<T> {
        let mut data = self.field_data.lock();
        let effective = match &data.set_handler {
            Some(handler) => handler(&value),
            None => Err(ComError::SetHandlerNotAvailable),
        };
        let result = effective.and_then(|effective| {
            if let Some(notifier) = &self.notifier {
                match notifier.send(&effective) {
                    Ok(()) | Err(ComError::ServiceNotOffered) => {}
                    Err(e) => return Err(e),
                }
            }
            data.value = Some(effective.clone());
            Ok(effective)
        });
        ComFuture::ready(result, self.mode)
    }

    /// Post-construction wiring check, run before the service is offered:
    /// a configured setter needs its handler, a notifier needs an initial
    /// `update`, and a getter without a handler needs one too.
    pub fn is_valid(&self) -> bool {
        let data = self.field_data.lock();
        if self.capabilities.has_setter && data.set_handler.is_none() {
            return false;
        }
        if self.capabilities.has_notifier && data.value.is_none() {
            return false;
        }
        if self.capabilities.has_getter && data.get_handler.is_none() && data.value.is_none() {
            return false;
        }
        true
    }
}
