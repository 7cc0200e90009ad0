// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Priority resolution for one property on one object.
//!
//! [`PriorityValue`] keeps every active entry sorted from highest to lowest
//! precedence next to a separate local value slot, and remembers the last
//! committed result. Resolution is split in two so that coercion can run
//! with no borrow held:
//!
//! 1. [`resolve`](PriorityValue::resolve) picks the raw winners.
//! 2. The caller coerces them.
//! 3. [`commit`](PriorityValue::commit) stores the result and reports what
//!    changed.
//!
//! Ties between entries go to the most recently added one. The local value
//! is not an entry: it always wins its own tier.

use alloc::vec::Vec;

use crate::entry::{Entry, EntryId};
use crate::priority::BindingPriority;
use crate::value::PropertyValue;

/// The outcome of one resolution pass.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Resolution<T> {
    pub(crate) value: Option<T>,
    pub(crate) priority: BindingPriority,
    /// Same scan with animation entries skipped.
    pub(crate) non_animated: Option<T>,
    pub(crate) non_animated_priority: BindingPriority,
}

impl<T: Clone> Resolution<T> {
    pub(crate) fn unset() -> Self {
        Self {
            value: None,
            priority: BindingPriority::Unset,
            non_animated: None,
            non_animated_priority: BindingPriority::Unset,
        }
    }

    /// The resolution of a bare local value (or of nothing).
    pub(crate) fn local(value: Option<T>) -> Self {
        let priority = if value.is_some() {
            BindingPriority::LocalValue
        } else {
            BindingPriority::Unset
        };
        Self {
            non_animated: value.clone(),
            value,
            priority,
            non_animated_priority: priority,
        }
    }

    pub(crate) fn map(self, mut f: impl FnMut(T) -> T) -> Self {
        Self {
            value: self.value.map(&mut f),
            priority: self.priority,
            non_animated: self.non_animated.map(f),
            non_animated_priority: self.non_animated_priority,
        }
    }
}

/// A committed resolution together with the one it replaced.
#[derive(Clone, Debug)]
pub(crate) struct Transition<T> {
    pub(crate) old: Resolution<T>,
    pub(crate) new: Resolution<T>,
}

#[derive(Debug)]
pub(crate) struct PriorityValue<T> {
    /// Highest precedence first.
    entries: Vec<Entry<T>>,
    local: Option<T>,
    committed: Resolution<T>,
}

impl<T: PropertyValue> PriorityValue<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            local: None,
            committed: Resolution::unset(),
        }
    }

    /// Starts from a bare local value, keeping it as the committed result.
    pub(crate) fn from_local(value: T) -> Self {
        Self {
            entries: Vec::new(),
            local: Some(value.clone()),
            committed: Resolution::local(Some(value)),
        }
    }

    pub(crate) fn local(&self) -> Option<&T> {
        self.local.as_ref()
    }

    pub(crate) fn set_local(&mut self, value: T) {
        self.local = Some(value);
    }

    pub(crate) fn clear_local(&mut self) -> Option<T> {
        self.local.take()
    }

    pub(crate) fn has_entries(&self) -> bool {
        !self.entries.is_empty()
    }

    pub(crate) fn committed(&self) -> &Resolution<T> {
        &self.committed
    }

    /// Inserts before any entry of equal priority, so the newcomer wins ties.
    pub(crate) fn insert(&mut self, entry: Entry<T>) {
        let index = self
            .entries
            .partition_point(|e| e.priority() < entry.priority());
        self.entries.insert(index, entry);
    }

    pub(crate) fn remove(&mut self, id: EntryId) -> Option<Entry<T>> {
        let index = self.entries.iter().position(|e| e.id() == id)?;
        Some(self.entries.remove(index))
    }

    pub(crate) fn entry_mut(&mut self, id: EntryId) -> Option<&mut Entry<T>> {
        self.entries.iter_mut().find(|e| e.id() == id)
    }

    /// Picks the raw winners, before coercion.
    pub(crate) fn resolve(&self) -> Resolution<T> {
        let (value, priority) = self.scan(BindingPriority::Animation, false);
        let (non_animated, non_animated_priority) = self.scan(BindingPriority::Animation, true);
        Resolution {
            value: value.cloned(),
            priority,
            non_animated: non_animated.cloned(),
            non_animated_priority,
        }
    }

    /// The value ignoring every entry more precedent than `max_priority`.
    pub(crate) fn base_value(&self, max_priority: BindingPriority) -> Option<&T> {
        self.scan(max_priority, false).0
    }

    fn scan(
        &self,
        max_priority: BindingPriority,
        skip_animation: bool,
    ) -> (Option<&T>, BindingPriority) {
        let local_visible = max_priority <= BindingPriority::LocalValue;
        for entry in &self.entries {
            if entry.priority() < max_priority {
                continue;
            }
            if local_visible
                && entry.priority() >= BindingPriority::LocalValue
                && let Some(local) = &self.local
            {
                return (Some(local), BindingPriority::LocalValue);
            }
            if skip_animation && entry.priority().is_animation() {
                continue;
            }
            if let Some(value) = &entry.value {
                return (Some(value), entry.priority());
            }
        }
        match &self.local {
            Some(local) if local_visible => (Some(local), BindingPriority::LocalValue),
            _ => (None, BindingPriority::Unset),
        }
    }

    /// Stores `resolution`, returning the transition if anything differs.
    pub(crate) fn commit(&mut self, resolution: Resolution<T>) -> Option<Transition<T>> {
        if resolution == self.committed {
            return None;
        }
        let old = core::mem::replace(&mut self.committed, resolution.clone());
        Some(Transition {
            old,
            new: resolution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BindingPriority::{Animation, LocalValue, Style, StyleTrigger, Unset};

    fn constant(id: u64, priority: BindingPriority, value: i32) -> Entry<i32> {
        Entry::constant(EntryId(id), priority, value)
    }

    #[test]
    fn newest_entry_wins_ties() {
        let mut pv = PriorityValue::new();
        pv.insert(constant(0, Style, 1));
        pv.insert(constant(1, Style, 2));
        assert_eq!(pv.resolve().value, Some(2));

        pv.remove(EntryId(1));
        assert_eq!(pv.resolve().value, Some(1));
    }

    #[test]
    fn higher_tier_beats_newer_lower_tier() {
        let mut pv = PriorityValue::new();
        pv.insert(constant(0, StyleTrigger, 1));
        pv.insert(constant(1, Style, 2));
        let resolution = pv.resolve();
        assert_eq!(resolution.value, Some(1));
        assert_eq!(resolution.priority, StyleTrigger);
    }

    #[test]
    fn local_value_wins_its_tier_regardless_of_age() {
        let mut pv = PriorityValue::new();
        pv.set_local(10);
        pv.insert(constant(0, LocalValue, 20));
        pv.insert(constant(1, Style, 30));
        assert_eq!(pv.resolve().value, Some(10));

        pv.clear_local();
        assert_eq!(pv.resolve().value, Some(20));
    }

    #[test]
    fn animation_shadows_local_but_not_non_animated() {
        let mut pv = PriorityValue::new();
        pv.set_local(1);
        pv.insert(constant(0, Animation, 2));

        let resolution = pv.resolve();
        assert_eq!(resolution.value, Some(2));
        assert_eq!(resolution.priority, Animation);
        assert_eq!(resolution.non_animated, Some(1));
        assert_eq!(resolution.non_animated_priority, LocalValue);
    }

    #[test]
    fn empty_resolution_is_unset() {
        let mut pv = PriorityValue::<i32>::new();
        pv.insert(Entry::binding(EntryId(0), Style));
        assert_eq!(pv.resolve(), Resolution::unset());
    }

    #[test]
    fn base_value_skips_more_precedent_entries() {
        let mut pv = PriorityValue::new();
        pv.insert(constant(0, Animation, 1));
        pv.set_local(2);
        pv.insert(constant(1, Style, 3));

        assert_eq!(pv.base_value(Animation), Some(&1));
        assert_eq!(pv.base_value(LocalValue), Some(&2));
        assert_eq!(pv.base_value(StyleTrigger), Some(&3));
        assert_eq!(pv.base_value(Unset), None);
    }

    #[test]
    fn commit_reports_only_differences() {
        let mut pv = PriorityValue::from_local(5);
        assert!(pv.commit(pv.resolve()).is_none());

        pv.insert(constant(0, Animation, 6));
        let transition = pv.commit(pv.resolve()).unwrap();
        assert_eq!(transition.old.value, Some(5));
        assert_eq!(transition.new.value, Some(6));
        assert_eq!(transition.new.non_animated, Some(5));
        assert!(pv.commit(pv.resolve()).is_none());
    }
}
