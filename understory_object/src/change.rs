// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change records delivered to listeners.

use core::cell::Cell;
use core::fmt;

use crate::id::{Property, PropertyId};
use crate::object::DependencyObject;
use crate::priority::BindingPriority;
use crate::value::{BindingError, BindingValue, ErasedValue, PropertyValue};

/// A change to one property on one object.
///
/// The record is shared by every subscriber of a channel. Its outdated flag
/// is only ever set: once a newer change for the same property is waiting
/// behind this one, subscribers that run from then on see
/// [`is_outdated`](Self::is_outdated) return `true`.
#[derive(Clone)]
pub struct PropertyChange<T> {
    sender: DependencyObject,
    property: Property<T>,
    old_value: Option<T>,
    new_value: BindingValue<T>,
    priority: BindingPriority,
    is_effective_value_change: bool,
    outdated: Cell<bool>,
}

impl<T: PropertyValue> PropertyChange<T> {
    pub(crate) fn new(
        sender: DependencyObject,
        property: Property<T>,
        old_value: Option<T>,
        new_value: BindingValue<T>,
        priority: BindingPriority,
        is_effective_value_change: bool,
    ) -> Self {
        Self {
            sender,
            property,
            old_value,
            new_value,
            priority,
            is_effective_value_change,
            outdated: Cell::new(false),
        }
    }

    /// The object whose property changed.
    #[must_use]
    pub fn sender(&self) -> &DependencyObject {
        &self.sender
    }

    /// The property that changed.
    #[must_use]
    pub fn property(&self) -> Property<T> {
        self.property
    }

    /// The value before the change, absent for the synthetic current-value
    /// change a new subscriber receives.
    #[must_use]
    pub fn old_value(&self) -> Option<&T> {
        self.old_value.as_ref()
    }

    /// The value after the change, possibly carrying a binding error.
    #[must_use]
    pub fn new_value(&self) -> &BindingValue<T> {
        &self.new_value
    }

    /// Shorthand for the plain new value.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.new_value.value()
    }

    /// The tier that produced the new value.
    #[must_use]
    pub fn priority(&self) -> BindingPriority {
        self.priority
    }

    /// `true` when the object's effective value changed; `false` for changes
    /// to the non-animated value while an animation shadows it.
    #[must_use]
    pub fn is_effective_value_change(&self) -> bool {
        self.is_effective_value_change
    }

    /// `true` once a newer change for this property is queued behind this one.
    #[must_use]
    pub fn is_outdated(&self) -> bool {
        self.outdated.get()
    }

    pub(crate) fn to_any(&self, name: &'static str) -> AnyPropertyChange {
        AnyPropertyChange {
            sender: self.sender.clone(),
            property: self.property.id(),
            name,
            old_value: self.old_value.clone().map(ErasedValue::new),
            new_value: self.new_value.value().cloned().map(ErasedValue::new),
            error: self.new_value.binding_error().cloned(),
            priority: self.priority,
            is_effective_value_change: self.is_effective_value_change,
            outdated: Cell::new(false),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PropertyChange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyChange")
            .field("sender", &self.sender)
            .field("property", &self.property)
            .field("old_value", &self.old_value)
            .field("new_value", &self.new_value)
            .field("priority", &self.priority)
            .field("is_effective_value_change", &self.is_effective_value_change)
            .field("outdated", &self.outdated.get())
            .finish()
    }
}

/// A type-erased change, delivered by
/// [`DependencyObject::on_property_changed`].
#[derive(Clone, Debug)]
pub struct AnyPropertyChange {
    sender: DependencyObject,
    property: PropertyId,
    name: &'static str,
    old_value: Option<ErasedValue>,
    new_value: Option<ErasedValue>,
    error: Option<BindingError>,
    priority: BindingPriority,
    is_effective_value_change: bool,
    outdated: Cell<bool>,
}

impl AnyPropertyChange {
    /// The object whose property changed.
    #[must_use]
    pub fn sender(&self) -> &DependencyObject {
        &self.sender
    }

    /// The property that changed.
    #[must_use]
    pub fn property(&self) -> PropertyId {
        self.property
    }

    /// The registered name of the property.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The value before the change.
    #[must_use]
    pub fn old_value(&self) -> Option<&ErasedValue> {
        self.old_value.as_ref()
    }

    /// The value after the change.
    #[must_use]
    pub fn new_value(&self) -> Option<&ErasedValue> {
        self.new_value.as_ref()
    }

    /// The binding error that accompanied the change, if any.
    #[must_use]
    pub fn error(&self) -> Option<&BindingError> {
        self.error.as_ref()
    }

    /// The tier that produced the new value.
    #[must_use]
    pub fn priority(&self) -> BindingPriority {
        self.priority
    }

    /// See [`PropertyChange::is_effective_value_change`].
    #[must_use]
    pub fn is_effective_value_change(&self) -> bool {
        self.is_effective_value_change
    }

    /// See [`PropertyChange::is_outdated`].
    #[must_use]
    pub fn is_outdated(&self) -> bool {
        self.outdated.get()
    }
}

/// Records that can be superseded while queued in a channel.
pub(crate) trait Outdatable {
    fn mark_outdated(&self);
}

impl<T> Outdatable for PropertyChange<T> {
    fn mark_outdated(&self) {
        self.outdated.set(true);
    }
}

impl Outdatable for AnyPropertyChange {
    fn mark_outdated(&self) {
        self.outdated.set(true);
    }
}
