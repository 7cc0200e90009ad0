// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Disposal handles for applied values and bindings.

use alloc::boxed::Box;
use core::cell::RefCell;
use core::fmt;

/// Removes a value or binding that was applied to an object.
///
/// Unlike [`Subscription`](crate::Subscription), dropping a handle does
/// *not* remove anything: applied values stay in effect until disposed, the
/// source completes, or the object goes away. Disposal is idempotent.
pub struct ValueHandle {
    dispose: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl ValueHandle {
    pub(crate) fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: RefCell::new(Some(Box::new(dispose))),
        }
    }

    /// Removes the value and recomputes the property.
    ///
    /// Calling this again does nothing.
    pub fn dispose(&self) {
        let dispose = self.dispose.borrow_mut().take();
        if let Some(dispose) = dispose {
            dispose();
        }
    }

    /// Returns `true` once [`dispose`](Self::dispose) has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.dispose.borrow().is_none()
    }
}

impl fmt::Debug for ValueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueHandle")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
