// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-property change streams.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;

use crate::change::PropertyChange;
use crate::id::Property;
use crate::object::WeakDependencyObject;
use crate::priority::BindingPriority;
use crate::source::{SourceObserver, Subscription, ValueSource};
use crate::value::PropertyValue;

/// The change stream of one property on one object, created by
/// [`DependencyObject::listen`](crate::DependencyObject::listen).
///
/// The stream holds the object weakly. Subscribing to a stream whose object
/// is gone yields an inactive subscription and no events.
///
/// It is also a [`ValueSource`], emitting each new value, so one object's
/// property can be bound to another's.
pub struct PropertyObservable<T> {
    object: WeakDependencyObject,
    property: Property<T>,
    include_animations: bool,
}

impl<T: PropertyValue> PropertyObservable<T> {
    pub(crate) fn new(
        object: WeakDependencyObject,
        property: Property<T>,
        include_animations: bool,
    ) -> Self {
        Self {
            object,
            property,
            include_animations,
        }
    }

    /// The observed property.
    #[must_use]
    pub fn property(&self) -> Property<T> {
        self.property
    }

    /// Whether animated values are reported.
    #[must_use]
    pub fn includes_animations(&self) -> bool {
        self.include_animations
    }

    /// Calls `callback` with the current value and then with every change.
    ///
    /// The first record has no old value. Changes raised while callbacks are
    /// running are queued, so each subscriber observes them in order; check
    /// [`PropertyChange::is_outdated`] to skip work that a later change will
    /// redo anyway.
    pub fn subscribe(&self, callback: impl Fn(&PropertyChange<T>) + 'static) -> Subscription {
        let Some(object) = self.object.upgrade() else {
            return Subscription::empty();
        };
        let Some(initial) = object.current_change(self.property, self.include_animations) else {
            return Subscription::empty();
        };

        let filter: Box<dyn Fn(&PropertyChange<T>)> = if self.include_animations {
            Box::new(move |change: &PropertyChange<T>| {
                if change.is_effective_value_change() {
                    callback(change);
                }
            })
        } else {
            let last: RefCell<Option<T>> = RefCell::new(None);
            Box::new(move |change: &PropertyChange<T>| {
                if change.priority() == BindingPriority::Animation {
                    return;
                }
                let value = change.value().cloned();
                if *last.borrow() == value {
                    return;
                }
                *last.borrow_mut() = value;
                callback(change);
            })
        };

        let channel = object.channel_or_insert::<T>(self.property.id());
        let (subscriber, subscription) = channel.subscribe(filter);
        channel.signal_to(&subscriber, Rc::new(initial));
        subscription
    }
}

impl<T: PropertyValue> ValueSource<T> for PropertyObservable<T> {
    fn subscribe(&self, observer: SourceObserver<T>) -> Subscription {
        if self.object.upgrade().is_none() {
            observer.complete();
            return Subscription::empty();
        }
        Self::subscribe(self, move |change| observer.next(change.new_value().clone()))
    }
}

impl<T> Clone for PropertyObservable<T> {
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            property: self.property,
            include_animations: self.include_animations,
        }
    }
}

impl<T> fmt::Debug for PropertyObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyObservable")
            .field("object", &self.object)
            .field("property", &self.property)
            .field("include_animations", &self.include_animations)
            .finish()
    }
}
