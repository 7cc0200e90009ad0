// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property-based checks of priority resolution against a simple model.
//!
//! Random sequences of writes, local clears and disposals are applied to an
//! object and to a naive model of the precedence rules. After every step the
//! object's value, its non-animated base value and the last values seen by
//! both listener views must match the model.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use understory_object::{
    BindingPriority, DependencyObject, Property, PropertyMetadataBuilder, PropertyRegistry,
    Subscription, ValueHandle,
};

const DEFAULT: i32 = 0;

#[derive(Clone, Debug)]
enum Op {
    Set(BindingPriority, i32),
    ClearLocal,
    Dispose(usize),
}

fn priority() -> impl Strategy<Value = BindingPriority> {
    prop_oneof![
        Just(BindingPriority::Animation),
        Just(BindingPriority::LocalValue),
        Just(BindingPriority::StyleTrigger),
        Just(BindingPriority::Style),
        Just(BindingPriority::TemplatedParent),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (priority(), -3..4_i32).prop_map(|(p, v)| Op::Set(p, v)),
        1 => Just(Op::ClearLocal),
        2 => any::<usize>().prop_map(Op::Dispose),
    ]
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op(), 0..40)
}

/// Sources in insertion order; `None` once disposed.
#[derive(Default)]
struct Model {
    local: Option<i32>,
    entries: Vec<Option<(BindingPriority, i32)>>,
}

impl Model {
    fn resolve(&self, skip_animation: bool) -> i32 {
        let mut best: Option<(BindingPriority, usize, i32)> = None;
        for (seq, entry) in self.entries.iter().enumerate() {
            let Some((priority, value)) = *entry else {
                continue;
            };
            if skip_animation && priority == BindingPriority::Animation {
                continue;
            }
            let better = match best {
                None => true,
                Some((p, s, _)) => priority < p || (priority == p && seq > s),
            };
            if better {
                best = Some((priority, seq, value));
            }
        }
        let local = self
            .local
            .map(|value| (BindingPriority::LocalValue, usize::MAX, value));
        match (best, local) {
            (Some((p, _, v)), Some(_)) if p < BindingPriority::LocalValue => v,
            (_, Some((_, _, v))) => v,
            (Some((_, _, v)), None) => v,
            (None, None) => DEFAULT,
        }
    }
}

fn last_seen(
    object: &DependencyObject,
    property: Property<i32>,
    include_animations: bool,
) -> (Rc<RefCell<Option<i32>>>, Subscription) {
    let last = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&last);
    let subscription = object
        .listen(property, include_animations)
        .unwrap()
        .subscribe(move |change| *sink.borrow_mut() = change.value().copied());
    (last, subscription)
}

fn non_negative(value: i32) -> i32 {
    value.max(0)
}

fn check(ops: &[Op], coerce: Option<fn(i32) -> i32>) -> Result<(), TestCaseError> {
    let mut registry = PropertyRegistry::new();
    let control = registry.register_type("Control", None).unwrap();
    let metadata = match coerce {
        Some(coerce) => PropertyMetadataBuilder::new(DEFAULT)
            .coerce(move |_, v| coerce(v))
            .build(),
        None => PropertyMetadataBuilder::new(DEFAULT).build(),
    };
    let property = registry.register(control, "Value", metadata).unwrap();
    let object = DependencyObject::new(Rc::new(registry), control);
    let apply = |v: i32| coerce.map_or(v, |c| c(v));

    let (effective, _effective_subscription) = last_seen(&object, property, true);
    let (base, _base_subscription) = last_seen(&object, property, false);

    let mut model = Model::default();
    let mut handles: Vec<Option<ValueHandle>> = Vec::new();

    for op in ops {
        match *op {
            Op::Set(BindingPriority::LocalValue, value) => {
                let handle = object
                    .set_value(property, value, BindingPriority::LocalValue)
                    .unwrap();
                prop_assert!(handle.is_none());
                model.local = Some(value);
            }
            Op::Set(priority, value) => {
                let handle = object.set_value(property, value, priority).unwrap();
                prop_assert!(handle.is_some());
                handles.push(handle);
                model.entries.push(Some((priority, value)));
            }
            Op::ClearLocal => {
                object.clear_value(property).unwrap();
                model.local = None;
            }
            Op::Dispose(index) => {
                if !handles.is_empty() {
                    let index = index % handles.len();
                    if let Some(handle) = &handles[index] {
                        handle.dispose();
                    }
                    model.entries[index] = None;
                }
            }
        }

        let expected = apply(model.resolve(false));
        let expected_base = model.resolve(true);
        prop_assert_eq!(object.get_value(property), expected);
        prop_assert_eq!(
            object
                .get_base_value(property, BindingPriority::LocalValue)
                .unwrap(),
            expected_base
        );
        prop_assert_eq!(*effective.borrow(), Some(expected));
        prop_assert_eq!(*base.borrow(), Some(apply(expected_base)));
        prop_assert_eq!(
            object.is_animating(property),
            model
                .entries
                .iter()
                .flatten()
                .any(|(p, _)| *p == BindingPriority::Animation)
        );
    }

    drop(handles);
    Ok(())
}

proptest! {
    #[test]
    fn value_follows_most_precedent_newest_source(ops in ops()) {
        check(&ops, None)?;
    }

    #[test]
    fn coerced_value_follows_most_precedent_newest_source(ops in ops()) {
        check(&ops, Some(non_negative))?;
    }
}
