// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-object sparse property storage.
//!
//! This module provides [`ValueStore`], which holds one slot per property
//! that has any source on the object.
//!
//! # Implementation
//!
//! Slots live in a vector sorted by [`PropertyId`] and are found by binary
//! search, with inline storage for small property sets via `SmallVec`. Most
//! objects carry a handful of set properties, where this beats a hash map on
//! both memory and lookup time.
//!
//! # Fast path
//!
//! A property whose only source is a local value, and which has no coercion,
//! is stored as the bare value. The first non-local source promotes the slot
//! to a full [`PriorityValue`]; once that resolver runs out of entries the
//! slot collapses back (or is released). Both switches keep the committed
//! value, so they never produce a change.

use alloc::boxed::Box;
use core::any::Any;
use smallvec::SmallVec;

use crate::entry::{Entry, EntryId};
use crate::id::PropertyId;
use crate::priority::BindingPriority;
use crate::priority_value::{PriorityValue, Resolution, Transition};
use crate::value::PropertyValue;

/// Most objects set fewer than 8 properties, so this avoids heap allocation
/// in the common case.
const INLINE_CAPACITY: usize = 8;

#[derive(Debug)]
pub(crate) enum ValueSlot<T> {
    Local(T),
    Prioritized(PriorityValue<T>),
}

impl<T: PropertyValue> ValueSlot<T> {
    pub(crate) fn committed(&self) -> Resolution<T> {
        match self {
            Self::Local(value) => Resolution::local(Some(value.clone())),
            Self::Prioritized(pv) => pv.committed().clone(),
        }
    }

    fn promote(&mut self, id: PropertyId) -> &mut PriorityValue<T> {
        if let Self::Local(value) = self {
            tracing::trace!(property = %id, "promoting local value to prioritized storage");
            *self = Self::Prioritized(PriorityValue::from_local(value.clone()));
        }
        match self {
            Self::Prioritized(pv) => pv,
            Self::Local(_) => unreachable!("slot was promoted above"),
        }
    }
}

/// Operations the store needs without knowing the value type.
trait ErasedSlot: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn is_set(&self) -> bool;
    fn is_animating(&self) -> bool;
}

impl<T: PropertyValue> ErasedSlot for ValueSlot<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn is_set(&self) -> bool {
        match self {
            Self::Local(_) => true,
            Self::Prioritized(pv) => pv.committed().value.is_some(),
        }
    }

    fn is_animating(&self) -> bool {
        match self {
            Self::Local(_) => false,
            Self::Prioritized(pv) => {
                pv.committed().value.is_some() && pv.committed().priority.is_animation()
            }
        }
    }
}

/// Result of a local write or clear.
#[derive(Debug)]
pub(crate) enum LocalWrite<T> {
    /// The fast path applied the write; this is the complete change, if any.
    Applied(Option<Transition<T>>),
    /// A prioritized resolver took the write and must be re-resolved.
    NeedsResolve,
}

/// Per-object storage for every property with at least one source.
#[derive(Default)]
pub(crate) struct ValueStore {
    slots: SmallVec<[(PropertyId, Box<dyn ErasedSlot>); INLINE_CAPACITY]>,
}

impl ValueStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn find(&self, id: PropertyId) -> Result<usize, usize> {
        self.slots.binary_search_by_key(&id, |(pid, _)| *pid)
    }

    fn slot<T: PropertyValue>(&self, id: PropertyId) -> Option<&ValueSlot<T>> {
        let index = self.find(id).ok()?;
        self.slots[index].1.as_any().downcast_ref()
    }

    fn slot_mut<T: PropertyValue>(&mut self, id: PropertyId) -> Option<&mut ValueSlot<T>> {
        let index = self.find(id).ok()?;
        self.slots[index].1.as_any_mut().downcast_mut()
    }

    fn prioritized_mut<T: PropertyValue>(
        &mut self,
        id: PropertyId,
    ) -> Option<&mut PriorityValue<T>> {
        match self.slot_mut(id)? {
            ValueSlot::Prioritized(pv) => Some(pv),
            ValueSlot::Local(_) => None,
        }
    }

    fn insert_slot<T: PropertyValue>(&mut self, index: usize, id: PropertyId, slot: ValueSlot<T>) {
        self.slots.insert(index, (id, Box::new(slot)));
    }

    /// Returns the number of properties with a slot.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns the properties with a slot, in ascending id order.
    pub(crate) fn property_ids(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.slots.iter().map(|(id, _)| *id)
    }

    /// Returns `true` if the property currently resolves to a value of its own.
    pub(crate) fn is_set(&self, id: PropertyId) -> bool {
        self.find(id).is_ok_and(|index| self.slots[index].1.is_set())
    }

    /// Returns `true` if the property's value currently comes from an animation.
    pub(crate) fn is_animating(&self, id: PropertyId) -> bool {
        self.find(id)
            .is_ok_and(|index| self.slots[index].1.is_animating())
    }

    /// The committed resolution, or an unset one when there is no slot.
    pub(crate) fn committed<T: PropertyValue>(&self, id: PropertyId) -> Resolution<T> {
        self.slot::<T>(id)
            .map_or_else(Resolution::unset, ValueSlot::committed)
    }

    /// The object's own value, ignoring inheritance and defaults.
    pub(crate) fn own_value<T: PropertyValue>(&self, id: PropertyId) -> Option<T> {
        match self.slot::<T>(id)? {
            ValueSlot::Local(value) => Some(value.clone()),
            ValueSlot::Prioritized(pv) => pv.committed().value.clone(),
        }
    }

    /// The value ignoring every source more precedent than `max_priority`,
    /// before coercion.
    pub(crate) fn base_value<T: PropertyValue>(
        &self,
        id: PropertyId,
        max_priority: BindingPriority,
    ) -> Option<T> {
        match self.slot::<T>(id)? {
            ValueSlot::Local(value) => {
                (max_priority <= BindingPriority::LocalValue).then(|| value.clone())
            }
            ValueSlot::Prioritized(pv) => pv.base_value(max_priority).cloned(),
        }
    }

    /// Sets the local value.
    ///
    /// With `fast_path`, a property without other sources keeps the bare
    /// value.
    pub(crate) fn set_local<T: PropertyValue>(
        &mut self,
        id: PropertyId,
        value: T,
        fast_path: bool,
    ) -> LocalWrite<T> {
        match self.find(id) {
            Err(index) => {
                if fast_path {
                    self.insert_slot(index, id, ValueSlot::Local(value.clone()));
                    LocalWrite::Applied(Some(Transition {
                        old: Resolution::unset(),
                        new: Resolution::local(Some(value)),
                    }))
                } else {
                    let mut pv = PriorityValue::new();
                    pv.set_local(value);
                    self.insert_slot(index, id, ValueSlot::Prioritized(pv));
                    LocalWrite::NeedsResolve
                }
            }
            Ok(_) => match self.slot_mut::<T>(id) {
                Some(ValueSlot::Local(current)) if fast_path => {
                    let old = core::mem::replace(current, value.clone());
                    let changed = old != value;
                    LocalWrite::Applied(changed.then(|| Transition {
                        old: Resolution::local(Some(old)),
                        new: Resolution::local(Some(value)),
                    }))
                }
                Some(slot) => {
                    slot.promote(id).set_local(value);
                    LocalWrite::NeedsResolve
                }
                None => LocalWrite::Applied(None),
            },
        }
    }

    /// Clears the local value, keeping every other source.
    pub(crate) fn clear_local<T: PropertyValue>(&mut self, id: PropertyId) -> LocalWrite<T> {
        if matches!(self.slot::<T>(id), Some(ValueSlot::Local(_))) {
            let old = self.take::<T>(id).map(|slot| slot.committed());
            return LocalWrite::Applied(old.map(|old| Transition {
                old,
                new: Resolution::unset(),
            }));
        }
        match self
            .prioritized_mut::<T>(id)
            .and_then(PriorityValue::clear_local)
        {
            Some(_) => LocalWrite::NeedsResolve,
            None => LocalWrite::Applied(None),
        }
    }

    /// Adds a non-local entry, promoting the slot if needed.
    pub(crate) fn add_entry<T: PropertyValue>(&mut self, id: PropertyId, entry: Entry<T>) {
        match self.find(id) {
            Err(index) => {
                let mut pv = PriorityValue::new();
                pv.insert(entry);
                self.insert_slot(index, id, ValueSlot::Prioritized(pv));
            }
            Ok(_) => {
                if let Some(slot) = self.slot_mut::<T>(id) {
                    slot.promote(id).insert(entry);
                }
            }
        }
    }

    pub(crate) fn entry_mut<T: PropertyValue>(
        &mut self,
        id: PropertyId,
        entry: EntryId,
    ) -> Option<&mut Entry<T>> {
        self.prioritized_mut(id)?.entry_mut(entry)
    }

    /// Detaches an entry. The caller drops it once no borrow is held.
    pub(crate) fn remove_entry<T: PropertyValue>(
        &mut self,
        id: PropertyId,
        entry: EntryId,
    ) -> Option<Entry<T>> {
        self.prioritized_mut(id)?.remove(entry)
    }

    /// Raw winners for a prioritized slot; `None` on the fast path.
    pub(crate) fn resolve<T: PropertyValue>(&self, id: PropertyId) -> Option<Resolution<T>> {
        match self.slot::<T>(id)? {
            ValueSlot::Prioritized(pv) => Some(pv.resolve()),
            ValueSlot::Local(_) => None,
        }
    }

    pub(crate) fn commit<T: PropertyValue>(
        &mut self,
        id: PropertyId,
        resolution: Resolution<T>,
    ) -> Option<Transition<T>> {
        self.prioritized_mut(id)?.commit(resolution)
    }

    /// Collapses a resolver that has run out of entries.
    ///
    /// With only a local value left it returns to the fast path (when
    /// allowed); with nothing left the slot is released.
    pub(crate) fn compact<T: PropertyValue>(&mut self, id: PropertyId, fast_path: bool) {
        let Ok(index) = self.find(id) else {
            return;
        };
        let remaining = match self.slot::<T>(id) {
            Some(ValueSlot::Prioritized(pv)) if !pv.has_entries() => pv.local().cloned(),
            _ => return,
        };
        match remaining {
            None => {
                tracing::trace!(property = %id, "releasing empty slot");
                self.slots.remove(index);
            }
            Some(local) if fast_path => {
                tracing::trace!(property = %id, "demoting slot to local value");
                self.slots[index].1 = Box::new(ValueSlot::Local(local));
            }
            Some(_) => {}
        }
    }

    /// Removes the whole slot. The caller drops it once no borrow is held.
    pub(crate) fn take<T: PropertyValue>(&mut self, id: PropertyId) -> Option<ValueSlot<T>> {
        let index = self.find(id).ok()?;
        let (_, slot) = self.slots.remove(index);
        slot.into_any().downcast::<ValueSlot<T>>().ok().map(|slot| *slot)
    }
}

impl core::fmt::Debug for ValueStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ValueStore")
            .field("properties", &self.property_ids().collect::<alloc::vec::Vec<_>>())
            .finish()
    }
}
