// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Value sources: the push sequences that bindings consume.
//!
//! The object model depends on one small capability, [`ValueSource`]: hand
//! it a [`SourceObserver`] and get back a [`Subscription`] that cancels the
//! feed when dropped. Items are [`BindingValue`]s followed by at most one
//! completion.
//!
//! Two sources ship with the crate:
//!
//! - [`ValueSubject`]: a hot source you push into; new observers get the
//!   latest item straight away.
//! - [`SequenceSource`]: replays a fixed list of items, then completes.
//!
//! [`PropertyObservable`](crate::PropertyObservable) is a source as well, so
//! one object's property can feed another's.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;

use crate::value::BindingValue;

/// An event emitted by a value source.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceEvent<T> {
    /// The source produced an item.
    Next(BindingValue<T>),
    /// The source will not produce anything else.
    Completed,
}

/// RAII guard for a live subscription.
///
/// Dropping it (or calling [`cancel`](Self::cancel)) runs the cancel action
/// exactly once.
#[must_use = "dropping a Subscription cancels it immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Creates a subscription that runs `cancel` when dropped.
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Creates a subscription with nothing to cancel.
    ///
    /// Used by sources that complete synchronously inside `subscribe`.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// Cancels now.
    pub fn cancel(mut self) {
        self.run();
    }

    /// Returns `true` if dropping this subscription would cancel something.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    fn run(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

struct ObserverInner<T> {
    closed: Cell<bool>,
    on_event: Box<dyn Fn(SourceEvent<T>)>,
}

/// The receiving end handed to [`ValueSource::subscribe`].
///
/// Cloning shares the same sink. After [`complete`](Self::complete) the
/// observer is closed and ignores further events, so a misbehaving source
/// cannot deliver past completion.
pub struct SourceObserver<T> {
    inner: Rc<ObserverInner<T>>,
}

impl<T> SourceObserver<T> {
    /// Wraps an event handler.
    pub fn new(on_event: impl Fn(SourceEvent<T>) + 'static) -> Self {
        Self {
            inner: Rc::new(ObserverInner {
                closed: Cell::new(false),
                on_event: Box::new(on_event),
            }),
        }
    }

    /// Delivers one item.
    pub fn next(&self, item: BindingValue<T>) {
        if !self.inner.closed.get() {
            (self.inner.on_event)(SourceEvent::Next(item));
        }
    }

    /// Delivers completion and closes the observer.
    pub fn complete(&self) {
        if !self.inner.closed.replace(true) {
            (self.inner.on_event)(SourceEvent::Completed);
        }
    }

    /// Forwards a [`SourceEvent`].
    pub fn send(&self, event: SourceEvent<T>) {
        match event {
            SourceEvent::Next(item) => self.next(item),
            SourceEvent::Completed => self.complete(),
        }
    }

    /// Returns `true` once completion has been delivered.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }
}

impl<T> Clone for SourceObserver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for SourceObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceObserver")
            .field("closed", &self.inner.closed.get())
            .finish_non_exhaustive()
    }
}

/// A push sequence of [`BindingValue`]s.
///
/// Implementations may emit synchronously from inside `subscribe`; the
/// object model holds no borrows while subscribing.
pub trait ValueSource<T> {
    /// Starts delivering items to `observer` until the returned subscription
    /// is dropped or the source completes.
    fn subscribe(&self, observer: SourceObserver<T>) -> Subscription;
}

struct SubjectInner<T> {
    latest: RefCell<Option<BindingValue<T>>>,
    observers: RefCell<Vec<(u64, SourceObserver<T>)>>,
    next_id: Cell<u64>,
    completed: Cell<bool>,
}

/// A hot source that remembers its latest item.
///
/// Clones share the same state.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use understory_object::{SourceEvent, SourceObserver, ValueSource, ValueSubject};
///
/// let subject = ValueSubject::new();
/// subject.next(1);
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = Rc::clone(&seen);
/// let subscription = subject.subscribe(SourceObserver::new(move |event| {
///     if let SourceEvent::Next(item) = event {
///         sink.borrow_mut().push(item.into_value());
///     }
/// }));
///
/// subject.next(2);
/// drop(subscription);
/// subject.next(3);
///
/// assert_eq!(*seen.borrow(), [Some(1), Some(2)]);
/// ```
pub struct ValueSubject<T> {
    inner: Rc<SubjectInner<T>>,
}

impl<T: Clone + 'static> ValueSubject<T> {
    /// Creates a subject with no item yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SubjectInner {
                latest: RefCell::new(None),
                observers: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                completed: Cell::new(false),
            }),
        }
    }

    /// Creates a subject whose first item is `value`.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        let subject = Self::new();
        subject.next(value);
        subject
    }

    /// Pushes a plain value.
    pub fn next(&self, value: T) {
        self.push(BindingValue::Value(value));
    }

    /// Pushes any item to every current observer.
    ///
    /// Ignored after [`complete`](Self::complete).
    pub fn push(&self, item: BindingValue<T>) {
        if self.inner.completed.get() {
            return;
        }
        *self.inner.latest.borrow_mut() = Some(item.clone());
        let observers: Vec<_> = self
            .inner
            .observers
            .borrow()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer.next(item.clone());
        }
    }

    /// Completes every observer. Later subscribers complete immediately.
    pub fn complete(&self) {
        if self.inner.completed.replace(true) {
            return;
        }
        let observers = core::mem::take(&mut *self.inner.observers.borrow_mut());
        for (_, observer) in observers {
            observer.complete();
        }
    }

    /// Returns `true` once [`complete`](Self::complete) has been called.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.inner.completed.get()
    }

    /// Returns the latest item, if any.
    #[must_use]
    pub fn latest(&self) -> Option<BindingValue<T>> {
        self.inner.latest.borrow().clone()
    }

    /// Returns the number of live observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }
}

impl<T: Clone + 'static> ValueSource<T> for ValueSubject<T> {
    fn subscribe(&self, observer: SourceObserver<T>) -> Subscription {
        if self.inner.completed.get() {
            observer.complete();
            return Subscription::empty();
        }

        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .observers
            .borrow_mut()
            .push((id, observer.clone()));

        let latest = self.inner.latest.borrow().clone();
        if let Some(item) = latest {
            observer.next(item);
        }

        let weak: Weak<SubjectInner<T>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.observers.borrow_mut().retain(|(other, _)| *other != id);
            }
        })
    }
}

impl<T: Clone + 'static> Default for ValueSubject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ValueSubject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueSubject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSubject")
            .field("latest", &self.inner.latest.borrow())
            .field("observers", &self.inner.observers.borrow().len())
            .field("completed", &self.inner.completed.get())
            .finish()
    }
}

/// A cold source that emits a fixed list of items, then completes.
///
/// Every subscriber gets the whole list synchronously.
#[derive(Clone, Debug)]
pub struct SequenceSource<T> {
    items: Vec<BindingValue<T>>,
}

impl<T: Clone> SequenceSource<T> {
    /// Creates a source from arbitrary items.
    #[must_use]
    pub fn new(items: impl IntoIterator<Item = BindingValue<T>>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    /// Creates a source from plain values.
    #[must_use]
    pub fn from_values(values: impl IntoIterator<Item = T>) -> Self {
        Self::new(values.into_iter().map(BindingValue::Value))
    }
}

impl<T: Clone> ValueSource<T> for SequenceSource<T> {
    fn subscribe(&self, observer: SourceObserver<T>) -> Subscription {
        for item in &self.items {
            if observer.is_closed() {
                break;
            }
            observer.next(item.clone());
        }
        observer.complete();
        Subscription::empty()
    }
}
