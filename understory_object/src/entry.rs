// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Prioritized value source entries.

use crate::priority::BindingPriority;
use crate::source::Subscription;

/// Identity of an entry within one object, used by disposal handles and
/// binding callbacks to find their entry again.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct EntryId(pub(crate) u64);

#[derive(Debug)]
enum EntryKind {
    Constant,
    /// The subscription is attached once `subscribe` returns.
    Binding(Option<Subscription>),
}

/// One contributor to a property's value at a fixed priority.
#[derive(Debug)]
pub(crate) struct Entry<T> {
    id: EntryId,
    priority: BindingPriority,
    pub(crate) value: Option<T>,
    kind: EntryKind,
}

impl<T> Entry<T> {
    pub(crate) fn constant(id: EntryId, priority: BindingPriority, value: T) -> Self {
        Self {
            id,
            priority,
            value: Some(value),
            kind: EntryKind::Constant,
        }
    }

    pub(crate) fn binding(id: EntryId, priority: BindingPriority) -> Self {
        Self {
            id,
            priority,
            value: None,
            kind: EntryKind::Binding(None),
        }
    }

    pub(crate) fn id(&self) -> EntryId {
        self.id
    }

    pub(crate) fn priority(&self) -> BindingPriority {
        self.priority
    }

    /// Stores the binding's subscription. Hands it back for constants.
    pub(crate) fn attach(&mut self, subscription: Subscription) -> Option<Subscription> {
        match &mut self.kind {
            EntryKind::Binding(slot) => slot.replace(subscription),
            EntryKind::Constant => Some(subscription),
        }
    }
}
