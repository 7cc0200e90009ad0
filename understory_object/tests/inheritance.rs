// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Inherited properties and the inheritance tree.

use std::cell::RefCell;
use std::rc::Rc;

use understory_object::{
    BindingPriority, DependencyObject, ObjectType, Property, PropertyError,
    PropertyMetadataBuilder, PropertyRegistry,
};

type Log<T> = Rc<RefCell<Vec<T>>>;

struct Fixture {
    registry: Rc<PropertyRegistry>,
    control: ObjectType,
    label: ObjectType,
    font: Property<&'static str>,
    width: Property<i32>,
}

fn fixture() -> Fixture {
    let mut registry = PropertyRegistry::new();
    let control = registry.register_type("Control", None).unwrap();
    let label = registry.register_type("Label", Some(control)).unwrap();
    let font = registry
        .register(
            control,
            "Font",
            PropertyMetadataBuilder::new("sans").inherits(true).build(),
        )
        .unwrap();
    let width = registry
        .register(control, "Width", PropertyMetadataBuilder::new(0).build())
        .unwrap();
    registry.override_default(font, label, "serif").unwrap();
    Fixture {
        registry: Rc::new(registry),
        control,
        label,
        font,
        width,
    }
}

impl Fixture {
    fn object(&self) -> DependencyObject {
        self.object_of(self.control)
    }

    fn object_of(&self, ty: ObjectType) -> DependencyObject {
        DependencyObject::new(Rc::clone(&self.registry), ty)
    }

    fn tree(&self) -> (DependencyObject, DependencyObject, DependencyObject) {
        let root = self.object();
        let child = self.object();
        let grandchild = self.object();
        child.set_inheritance_parent(Some(&root)).unwrap();
        grandchild.set_inheritance_parent(Some(&child)).unwrap();
        (root, child, grandchild)
    }
}

fn record(
    object: &DependencyObject,
    property: Property<&'static str>,
) -> (Log<(&'static str, BindingPriority)>, understory_object::Subscription) {
    let log: Log<(&'static str, BindingPriority)> = Rc::default();
    let sink = Rc::clone(&log);
    let subscription = object
        .listen(property, true)
        .unwrap()
        .subscribe(move |change| {
            sink.borrow_mut()
                .push((*change.value().unwrap(), change.priority()));
        });
    (log, subscription)
}

#[test]
fn child_follows_parent_until_it_has_its_own_value() {
    let f = fixture();
    let (root, child, _grandchild) = f.tree();

    root.set_value(f.font, "mono", BindingPriority::LocalValue)
        .unwrap();
    assert_eq!(child.get_value(f.font), "mono");

    child
        .set_value(f.font, "bold", BindingPriority::LocalValue)
        .unwrap();
    root.set_value(f.font, "italic", BindingPriority::LocalValue)
        .unwrap();
    assert_eq!(child.get_value(f.font), "bold");

    child.clear_value(f.font).unwrap();
    assert_eq!(child.get_value(f.font), "italic");
}

#[test]
fn changes_fan_out_depth_first() {
    let f = fixture();
    let (root, child, grandchild) = f.tree();
    let order: Log<&'static str> = Rc::default();

    let mut subscriptions = Vec::new();
    for (name, object) in [("root", &root), ("child", &child), ("grandchild", &grandchild)] {
        let sink = Rc::clone(&order);
        subscriptions.push(object.on_property_changed(move |_| sink.borrow_mut().push(name)));
    }

    root.set_value(f.font, "mono", BindingPriority::LocalValue)
        .unwrap();
    assert_eq!(*order.borrow(), ["grandchild", "child", "root"]);
}

#[test]
fn inherited_changes_report_inherited_priority() {
    let f = fixture();
    let (root, child, _grandchild) = f.tree();
    let (log, _subscription) = record(&child, f.font);

    root.set_value(f.font, "mono", BindingPriority::LocalValue)
        .unwrap();
    root.clear_value(f.font).unwrap();

    assert_eq!(
        *log.borrow(),
        [
            ("sans", BindingPriority::Unset),
            ("mono", BindingPriority::Inherited),
            ("sans", BindingPriority::Unset),
        ]
    );
}

#[test]
fn initial_change_reports_inherited_value() {
    let f = fixture();
    let (root, child, _grandchild) = f.tree();
    root.set_value(f.font, "mono", BindingPriority::LocalValue)
        .unwrap();

    let (log, _subscription) = record(&child, f.font);
    assert_eq!(*log.borrow(), [("mono", BindingPriority::Inherited)]);
}

#[test]
fn overriding_child_shields_its_subtree() {
    let f = fixture();
    let (root, child, grandchild) = f.tree();
    child
        .set_value(f.font, "bold", BindingPriority::LocalValue)
        .unwrap();
    let (log, _subscription) = record(&grandchild, f.font);

    root.set_value(f.font, "mono", BindingPriority::LocalValue)
        .unwrap();

    assert_eq!(grandchild.get_value(f.font), "bold");
    assert_eq!(*log.borrow(), [("bold", BindingPriority::Inherited)]);
}

#[test]
fn clearing_own_value_restores_inherited_value_with_notification() {
    let f = fixture();
    let (root, child, _grandchild) = f.tree();
    root.set_value(f.font, "mono", BindingPriority::LocalValue)
        .unwrap();
    child
        .set_value(f.font, "bold", BindingPriority::LocalValue)
        .unwrap();
    let (log, _subscription) = record(&child, f.font);

    child.clear_value(f.font).unwrap();
    assert_eq!(
        *log.borrow(),
        [
            ("bold", BindingPriority::LocalValue),
            ("mono", BindingPriority::Inherited),
        ]
    );
}

#[test]
fn reparenting_notifies_only_when_the_chain_value_differs() {
    let f = fixture();
    let first = f.object();
    let second = f.object();
    let third = f.object();
    first
        .set_value(f.font, "mono", BindingPriority::LocalValue)
        .unwrap();
    second
        .set_value(f.font, "mono", BindingPriority::LocalValue)
        .unwrap();
    third
        .set_value(f.font, "serif", BindingPriority::LocalValue)
        .unwrap();

    let child = f.object();
    let (log, _subscription) = record(&child, f.font);

    child.set_inheritance_parent(Some(&first)).unwrap();
    child.set_inheritance_parent(Some(&second)).unwrap();
    child.set_inheritance_parent(Some(&third)).unwrap();
    child.set_inheritance_parent(None).unwrap();

    assert_eq!(
        *log.borrow(),
        [
            ("sans", BindingPriority::Unset),
            ("mono", BindingPriority::Inherited),
            ("serif", BindingPriority::Inherited),
            ("sans", BindingPriority::Unset),
        ]
    );
}

#[test]
fn reparenting_reaches_descendants() {
    let f = fixture();
    let (_root, child, grandchild) = f.tree();
    let styled = f.object();
    styled
        .set_value(f.font, "mono", BindingPriority::LocalValue)
        .unwrap();

    child.set_inheritance_parent(Some(&styled)).unwrap();
    assert_eq!(grandchild.get_value(f.font), "mono");
}

#[test]
fn child_follows_the_parent_default_not_its_own() {
    let f = fixture();
    let root = f.object();
    let label = f.object_of(f.label);
    assert_eq!(label.get_value(f.font), "serif");

    let (log, _subscription) = record(&label, f.font);
    label.set_inheritance_parent(Some(&root)).unwrap();
    assert_eq!(label.get_value(f.font), root.get_value(f.font));

    root.set_value(f.font, "mono", BindingPriority::LocalValue)
        .unwrap();
    root.clear_value(f.font).unwrap();
    label.set_inheritance_parent(None).unwrap();

    assert_eq!(
        *log.borrow(),
        [
            ("serif", BindingPriority::Unset),
            ("sans", BindingPriority::Unset),
            ("mono", BindingPriority::Inherited),
            ("sans", BindingPriority::Unset),
            ("serif", BindingPriority::Unset),
        ]
    );
}

#[test]
fn parent_type_default_reaches_the_whole_subtree() {
    let f = fixture();
    let root = f.object_of(f.label);
    let child = f.object();
    let grandchild = f.object();
    child.set_inheritance_parent(Some(&root)).unwrap();
    grandchild.set_inheritance_parent(Some(&child)).unwrap();

    assert_eq!(root.get_value(f.font), "serif");
    assert_eq!(child.get_value(f.font), "serif");
    assert_eq!(grandchild.get_value(f.font), "serif");

    let (log, _subscription) = record(&grandchild, f.font);
    root.set_value(f.font, "mono", BindingPriority::LocalValue)
        .unwrap();
    root.clear_value(f.font).unwrap();
    child.set_inheritance_parent(None).unwrap();

    assert_eq!(
        *log.borrow(),
        [
            ("serif", BindingPriority::Unset),
            ("mono", BindingPriority::Inherited),
            ("serif", BindingPriority::Unset),
            ("sans", BindingPriority::Unset),
        ]
    );
}

#[test]
fn default_that_matches_the_new_chain_is_silent() {
    let f = fixture();
    let root = f.object();
    let child = f.object();
    let (log, _subscription) = record(&child, f.font);

    child.set_inheritance_parent(Some(&root)).unwrap();
    assert_eq!(*log.borrow(), [("sans", BindingPriority::Unset)]);
}

#[test]
fn non_inheriting_properties_stay_local() {
    let f = fixture();
    let (root, child, _grandchild) = f.tree();
    root.set_value(f.width, 10, BindingPriority::LocalValue)
        .unwrap();
    assert_eq!(child.get_value(f.width), 0);
}

#[test]
fn cycles_are_rejected() {
    let f = fixture();
    let (root, child, grandchild) = f.tree();

    assert_eq!(
        root.set_inheritance_parent(Some(&grandchild)),
        Err(PropertyError::InheritanceCycle)
    );
    assert_eq!(
        child.set_inheritance_parent(Some(&child)),
        Err(PropertyError::InheritanceCycle)
    );
    assert!(root.inheritance_parent().is_none());
    assert!(child.inheritance_parent().unwrap().ptr_eq(&root));
}

#[test]
fn parent_and_children_stay_consistent() {
    let f = fixture();
    let first = f.object();
    let second = f.object();
    let child = f.object();

    child.set_inheritance_parent(Some(&first)).unwrap();
    assert_eq!(first.inheritance_children().len(), 1);

    child.set_inheritance_parent(Some(&second)).unwrap();
    assert!(first.inheritance_children().is_empty());
    assert!(second.inheritance_children()[0].ptr_eq(&child));

    child.set_inheritance_parent(None).unwrap();
    assert!(second.inheritance_children().is_empty());
    assert!(child.inheritance_parent().is_none());
}

#[test]
fn dropped_child_leaves_its_parent() {
    let f = fixture();
    let parent = f.object();
    let kept = f.object();
    kept.set_inheritance_parent(Some(&parent)).unwrap();
    {
        let dropped = f.object();
        dropped.set_inheritance_parent(Some(&parent)).unwrap();
        assert_eq!(parent.inheritance_children().len(), 2);
    }

    let children = parent.inheritance_children();
    assert_eq!(children.len(), 1);
    assert!(children[0].ptr_eq(&kept));
}

#[test]
fn child_keeps_parent_alive() {
    let f = fixture();
    let child = f.object();
    {
        let parent = f.object();
        parent
            .set_value(f.font, "mono", BindingPriority::LocalValue)
            .unwrap();
        child.set_inheritance_parent(Some(&parent)).unwrap();
    }
    assert_eq!(child.get_value(f.font), "mono");
}
