// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Handing values from worker threads to the UI thread.
//!
//! Objects are `!Send`, so a producer on another thread cannot touch them.
//! Instead it posts items through a [`ThreadedSender`]; the UI thread drains
//! them with [`Dispatcher::run_pending`], which pushes each item into the
//! paired [`ValueSubject`]. Bind the subject like any other source.
//!
//! A source ends when a producer calls [`ThreadedSender::complete`] or when
//! the last clone of its sender is dropped.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::sync::Arc;
use core::any::Any;
use core::cell::{Cell, RefCell};
use core::fmt;
use core::marker::PhantomData;
use hashbrown::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::source::{SourceEvent, ValueSubject};
use crate::value::{BindingValue, PropertyValue};

type Posted = (u64, Box<dyn Any + Send>);

/// Posted when the last sender of a route is dropped.
struct Closed;

/// Delivers one posted event; returns `false` once the route is finished.
type Route = Rc<dyn Fn(Box<dyn Any + Send>) -> bool>;

/// The UI-thread end of a cross-thread queue.
///
/// # Example
///
/// ```rust
/// use understory_object::Dispatcher;
///
/// let dispatcher = Dispatcher::new();
/// let (sender, subject) = dispatcher.source::<u32>();
///
/// std::thread::spawn(move || {
///     sender.send(7);
///     sender.complete();
/// })
/// .join()
/// .unwrap();
///
/// assert_eq!(dispatcher.run_pending(), 2);
/// assert_eq!(subject.latest().and_then(|item| item.into_value()), Some(7));
/// assert!(subject.is_completed());
/// ```
pub struct Dispatcher {
    sender: Sender<Posted>,
    receiver: Receiver<Posted>,
    routes: RefCell<HashMap<u64, Route>>,
    next_route: Cell<u64>,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            routes: RefCell::new(HashMap::new()),
            next_route: Cell::new(0),
        }
    }

    /// Creates a producer handle and the UI-side subject it feeds.
    pub fn source<T: PropertyValue + Send>(&self) -> (ThreadedSender<T>, ValueSubject<T>) {
        let route = self.next_route.get();
        self.next_route.set(route + 1);

        let subject = ValueSubject::new();
        let target = subject.clone();
        let deliver: Route = Rc::new(move |event: Box<dyn Any + Send>| {
            match event.downcast::<SourceEvent<T>>().map(|event| *event) {
                Ok(SourceEvent::Next(item)) => {
                    target.push(item);
                    true
                }
                Ok(SourceEvent::Completed) => {
                    target.complete();
                    false
                }
                Err(event) => {
                    debug_assert!(event.is::<Closed>(), "unexpected event type");
                    target.complete();
                    false
                }
            }
        });
        self.routes.borrow_mut().insert(route, deliver);

        let sender = ThreadedSender {
            token: Arc::new(RouteToken {
                route,
                sender: self.sender.clone(),
            }),
            _marker: PhantomData,
        };
        (sender, subject)
    }

    /// Delivers everything posted so far, in posting order, and returns how
    /// many events were delivered.
    ///
    /// Items posted by subscribers while this runs are delivered too.
    pub fn run_pending(&self) -> usize {
        let mut delivered = 0;
        while let Ok((route, event)) = self.receiver.try_recv() {
            let deliver = self.routes.borrow().get(&route).cloned();
            let Some(deliver) = deliver else {
                continue;
            };
            delivered += 1;
            if !deliver(event) {
                tracing::trace!(route, "dispatch route completed");
                self.routes.borrow_mut().remove(&route);
            }
        }
        delivered
    }

    /// Returns the number of sources that have not completed.
    ///
    /// A source whose senders were all dropped counts until the next
    /// [`run_pending`](Self::run_pending).
    #[must_use]
    pub fn active_sources(&self) -> usize {
        self.routes.borrow().len()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("active_sources", &self.active_sources())
            .finish_non_exhaustive()
    }
}

/// The producer end of a [`Dispatcher::source`], usable from any thread.
///
/// Posting never blocks. Both methods return `false` once the dispatcher is
/// gone. Dropping the last clone completes the source.
pub struct ThreadedSender<T> {
    token: Arc<RouteToken>,
    _marker: PhantomData<fn() -> T>,
}

/// Shared by every clone of a sender.
struct RouteToken {
    route: u64,
    sender: Sender<Posted>,
}

impl Drop for RouteToken {
    fn drop(&mut self) {
        // Fails only when the dispatcher is gone.
        let _ = self.sender.send((self.route, Box::new(Closed)));
    }
}

impl<T: PropertyValue + Send> ThreadedSender<T> {
    /// Posts an item.
    pub fn send(&self, item: impl Into<BindingValue<T>>) -> bool {
        self.post(SourceEvent::Next(item.into()))
    }

    /// Posts completion.
    pub fn complete(&self) -> bool {
        self.post(SourceEvent::Completed)
    }

    fn post(&self, event: SourceEvent<T>) -> bool {
        self.token
            .sender
            .send((self.token.route, Box::new(event)))
            .is_ok()
    }
}

impl<T> Clone for ThreadedSender<T> {
    fn clone(&self) -> Self {
        Self {
            token: Arc::clone(&self.token),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ThreadedSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedSender")
            .field("route", &self.token.route)
            .finish_non_exhaustive()
    }
}
