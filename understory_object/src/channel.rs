// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reentrancy-safe fan-out of change records.
//!
//! A [`ChangeChannel`] is either idle or signalling. A signal that arrives
//! while the channel is already delivering (because a subscriber changed the
//! value again) is queued and delivered after the current one finishes, so
//! every subscriber sees changes in the order they were produced. Before
//! each subscriber runs, the record in hand is marked outdated if anything is
//! waiting behind it.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;

use crate::change::Outdatable;
use crate::source::Subscription;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ChannelState {
    Idle,
    Signalling,
}

pub(crate) struct Subscriber<E> {
    id: u64,
    active: Cell<bool>,
    callback: Box<dyn Fn(&E)>,
}

struct Delivery<E> {
    change: Rc<E>,
    /// Only this subscriber receives the change (current-value replays).
    target: Option<Rc<Subscriber<E>>>,
}

pub(crate) struct ChangeChannel<E> {
    subscribers: RefCell<Vec<Rc<Subscriber<E>>>>,
    state: Cell<ChannelState>,
    pending: RefCell<VecDeque<Delivery<E>>>,
    next_id: Cell<u64>,
}

/// Returns the channel to idle even if a subscriber panics.
struct SignalGuard<'a, E> {
    channel: &'a ChangeChannel<E>,
}

impl<E> Drop for SignalGuard<'_, E> {
    fn drop(&mut self) {
        self.channel.pending.borrow_mut().clear();
        self.channel.state.set(ChannelState::Idle);
    }
}

impl<E: Outdatable + 'static> ChangeChannel<E> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: RefCell::new(Vec::new()),
            state: Cell::new(ChannelState::Idle),
            pending: RefCell::new(VecDeque::new()),
            next_id: Cell::new(0),
        }
    }

    pub(crate) fn has_subscribers(&self) -> bool {
        !self.subscribers.borrow().is_empty()
    }

    /// Idle with nobody listening.
    pub(crate) fn is_unused(&self) -> bool {
        self.state.get() == ChannelState::Idle && !self.has_subscribers()
    }

    #[cfg(test)]
    fn is_signalling(&self) -> bool {
        self.state.get() == ChannelState::Signalling
    }

    /// Adds a subscriber at the end of the delivery order.
    pub(crate) fn subscribe(
        self: &Rc<Self>,
        callback: Box<dyn Fn(&E)>,
    ) -> (Rc<Subscriber<E>>, Subscription) {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let subscriber = Rc::new(Subscriber {
            id,
            active: Cell::new(true),
            callback,
        });
        self.subscribers.borrow_mut().push(Rc::clone(&subscriber));

        let channel: Weak<Self> = Rc::downgrade(self);
        let handle = Rc::downgrade(&subscriber);
        let subscription = Subscription::new(move || {
            if let Some(subscriber) = handle.upgrade() {
                subscriber.active.set(false);
            }
            if let Some(channel) = channel.upgrade() {
                channel.subscribers.borrow_mut().retain(|s| s.id != id);
            }
        });
        (subscriber, subscription)
    }

    /// Delivers `change` to every subscriber, or queues it if a delivery is
    /// already running.
    pub(crate) fn signal(&self, change: Rc<E>) {
        self.enqueue(Delivery {
            change,
            target: None,
        });
    }

    /// Delivers `change` to one subscriber, in order with other signals.
    pub(crate) fn signal_to(&self, subscriber: &Rc<Subscriber<E>>, change: Rc<E>) {
        self.enqueue(Delivery {
            change,
            target: Some(Rc::clone(subscriber)),
        });
    }

    fn enqueue(&self, delivery: Delivery<E>) {
        if self.state.get() == ChannelState::Signalling {
            self.pending.borrow_mut().push_back(delivery);
            return;
        }

        self.state.set(ChannelState::Signalling);
        let _guard = SignalGuard { channel: self };

        let mut next = Some(delivery);
        while let Some(delivery) = next {
            let recipients: Vec<Rc<Subscriber<E>>> = match delivery.target {
                Some(target) => alloc::vec![target],
                None => self.subscribers.borrow().clone(),
            };
            for subscriber in recipients {
                if !subscriber.active.get() {
                    continue;
                }
                if !self.pending.borrow().is_empty() {
                    delivery.change.mark_outdated();
                }
                (subscriber.callback)(&delivery.change);
            }
            next = self.pending.borrow_mut().pop_front();
        }
    }
}

impl<E> fmt::Debug for ChangeChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeChannel")
            .field("subscribers", &self.subscribers.borrow().len())
            .field("state", &self.state.get())
            .field("pending", &self.pending.borrow().len())
            .finish_non_exhaustive()
    }
}
