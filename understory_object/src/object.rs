// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dependency objects.
//!
//! [`DependencyObject`] is a cheap, clonable handle to one managed object.
//! It owns the object's [`ValueStore`], direct-property fields, change
//! channels and inheritance links, and runs every mutation through the same
//! pipeline:
//!
//! 1. Update the store (under a short borrow).
//! 2. Resolve and coerce with no borrow held, so coercion callbacks may read
//!    other properties.
//! 3. Commit, then collapse the slot if it emptied.
//! 4. Raise changes: class handler, inheritance children, listeners.
//!
//! Objects are single-threaded (`!Send`); see
//! [`Dispatcher`](crate::Dispatcher) for feeding values from other threads.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::any::Any;
use core::cell::{Cell, RefCell};
use core::fmt;
use smallvec::SmallVec;

use crate::change::{AnyPropertyChange, PropertyChange};
use crate::channel::ChangeChannel;
use crate::entry::{Entry, EntryId};
use crate::error::PropertyError;
use crate::handle::ValueHandle;
use crate::id::{ObjectType, Property, PropertyId};
use crate::metadata::{DirectMetadata, PropertyMetadata};
use crate::observable::PropertyObservable;
use crate::priority::BindingPriority;
use crate::priority_value::{Resolution, Transition};
use crate::registry::{PropertyKind, PropertyRegistry};
use crate::source::{SourceEvent, SourceObserver, Subscription, ValueSource};
use crate::store::{LocalWrite, ValueStore};
use crate::value::{BindingError, BindingValue, ErasedValue, PropertyValue};

pub(crate) type TypedChannel<T> = ChangeChannel<PropertyChange<T>>;

/// The value an object hands down to its inheritance children, with the
/// priority they report for it: `Inherited` when some ancestor has a value
/// of its own, `Unset` when it is the topmost ancestor's default.
type ChainValue<T> = (T, BindingPriority);

/// Metadata of a validated property.
enum Kind<'a, T: PropertyValue> {
    Styled(&'a PropertyMetadata<T>),
    Direct(&'a DirectMetadata<T>),
}

#[derive(Debug)]
struct DirectBinding {
    property: PropertyId,
    id: EntryId,
    subscription: Option<Subscription>,
}

struct ObjectInner {
    registry: Rc<PropertyRegistry>,
    object_type: ObjectType,
    store: RefCell<ValueStore>,
    direct_values: RefCell<SmallVec<[(PropertyId, ErasedValue); 4]>>,
    direct_bindings: RefCell<SmallVec<[DirectBinding; 2]>>,
    parent: RefCell<Option<DependencyObject>>,
    children: RefCell<Vec<Weak<ObjectInner>>>,
    /// Sorted by property; each value is an `Rc<TypedChannel<T>>`.
    channels: RefCell<SmallVec<[(PropertyId, Rc<dyn Any>); 4]>>,
    any_channel: Rc<ChangeChannel<AnyPropertyChange>>,
    next_entry: Cell<u64>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        if let Some(parent) = self.parent.get_mut().take()
            && let Ok(mut children) = parent.inner.children.try_borrow_mut()
        {
            children.retain(|child| child.strong_count() > 0);
        }
    }
}

/// A managed object whose property values are resolved from prioritized
/// sources.
///
/// Cloning is cheap and yields another handle to the same object. The object
/// (and every binding subscription it holds) is released when the last
/// handle drops; listeners and binding callbacks only hold weak references.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
/// use understory_object::{
///     BindingPriority, DependencyObject, PropertyMetadataBuilder, PropertyRegistry,
/// };
///
/// let mut registry = PropertyRegistry::new();
/// let control = registry.register_type("Control", None).unwrap();
/// let width = registry
///     .register(control, "Width", PropertyMetadataBuilder::new(0.0_f64).build())
///     .unwrap();
/// let registry = Rc::new(registry);
///
/// let object = DependencyObject::new(Rc::clone(&registry), control);
/// assert_eq!(object.get_value(width), 0.0);
///
/// // A style value loses to the local value, whatever the order.
/// object.set_value(width, 10.0, BindingPriority::LocalValue).unwrap();
/// let style = object
///     .set_value(width, 20.0, BindingPriority::Style)
///     .unwrap()
///     .unwrap();
/// assert_eq!(object.get_value(width), 10.0);
///
/// object.clear_value(width).unwrap();
/// assert_eq!(object.get_value(width), 20.0);
///
/// style.dispose();
/// assert_eq!(object.get_value(width), 0.0);
/// ```
#[derive(Clone)]
pub struct DependencyObject {
    inner: Rc<ObjectInner>,
}

/// A non-owning reference to a [`DependencyObject`].
#[derive(Clone)]
pub struct WeakDependencyObject {
    inner: Weak<ObjectInner>,
}

impl WeakDependencyObject {
    /// Returns the object if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<DependencyObject> {
        self.inner.upgrade().map(|inner| DependencyObject { inner })
    }
}

impl fmt::Debug for WeakDependencyObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDependencyObject")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl DependencyObject {
    /// Creates an object of the given type.
    #[must_use]
    pub fn new(registry: Rc<PropertyRegistry>, object_type: ObjectType) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                registry,
                object_type,
                store: RefCell::new(ValueStore::new()),
                direct_values: RefCell::new(SmallVec::new()),
                direct_bindings: RefCell::new(SmallVec::new()),
                parent: RefCell::new(None),
                children: RefCell::new(Vec::new()),
                channels: RefCell::new(SmallVec::new()),
                any_channel: Rc::new(ChangeChannel::new()),
                next_entry: Cell::new(0),
            }),
        }
    }

    /// Returns the object's type.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        self.inner.object_type
    }

    /// Returns the name of the object's type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.inner.registry.type_name(self.inner.object_type)
    }

    /// Returns the registry this object resolves properties against.
    #[must_use]
    pub fn registry(&self) -> &Rc<PropertyRegistry> {
        &self.inner.registry
    }

    /// Creates a weak reference to this object.
    #[must_use]
    pub fn downgrade(&self) -> WeakDependencyObject {
        WeakDependencyObject {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Returns `true` if both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the styled properties that have at least one value source on
    /// this object, in id order.
    #[must_use]
    pub fn value_properties(&self) -> Vec<PropertyId> {
        self.inner.store.borrow().property_ids().collect()
    }

    fn kind<T: PropertyValue>(&self, property: Property<T>) -> Result<Kind<'_, T>, PropertyError> {
        let registry = &self.inner.registry;
        let registration = registry.validate(property, self.inner.object_type)?;
        let kind = match registration.kind() {
            PropertyKind::Styled => registry.metadata(property).map(Kind::Styled),
            PropertyKind::Direct => registry.direct_metadata(property).map(Kind::Direct),
        };
        kind.ok_or(PropertyError::UnregisteredProperty {
            property: property.id(),
            object_type: self.type_name(),
        })
    }

    fn next_entry_id(&self) -> EntryId {
        let id = self.inner.next_entry.get();
        self.inner.next_entry.set(id + 1);
        EntryId(id)
    }

    fn property_name(&self, id: PropertyId) -> &'static str {
        self.inner.registry.name(id).unwrap_or("<unknown>")
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Returns the effective value of `property`.
    ///
    /// # Panics
    ///
    /// Panics if the property is not registered for this object; see
    /// [`try_get_value`](Self::try_get_value).
    #[must_use]
    pub fn get_value<T: PropertyValue>(&self, property: Property<T>) -> T {
        match self.try_get_value(property) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    /// Returns the effective value of `property`: its own resolved value,
    /// else the inherited value (for inheriting properties), else the default
    /// for this object's type.
    pub fn try_get_value<T: PropertyValue>(
        &self,
        property: Property<T>,
    ) -> Result<T, PropertyError> {
        Ok(match self.kind(property)? {
            Kind::Styled(metadata) => self
                .own_value(property)
                .or_else(|| self.inherited(property, metadata).map(|(value, _)| value))
                .unwrap_or_else(|| self.default_value(property, metadata)),
            Kind::Direct(metadata) => self.direct_value(property, metadata),
        })
    }

    /// Returns the value ignoring every source more precedent than
    /// `max_priority`, before coercion.
    ///
    /// Falls back to the inherited value (when `max_priority` admits it) and
    /// then to the default. Direct properties report their field.
    pub fn get_base_value<T: PropertyValue>(
        &self,
        property: Property<T>,
        max_priority: BindingPriority,
    ) -> Result<T, PropertyError> {
        Ok(match self.kind(property)? {
            Kind::Styled(metadata) => self
                .inner
                .store
                .borrow()
                .base_value(property.id(), max_priority)
                .or_else(|| {
                    if max_priority <= BindingPriority::Inherited {
                        self.inherited(property, metadata).map(|(value, _)| value)
                    } else {
                        None
                    }
                })
                .unwrap_or_else(|| self.default_value(property, metadata)),
            Kind::Direct(metadata) => self.direct_value(property, metadata),
        })
    }

    /// Returns `true` if the property has a value of its own on this object
    /// (not inherited, not the default).
    #[must_use]
    pub fn is_set<T: PropertyValue>(&self, property: Property<T>) -> bool {
        self.inner.store.borrow().is_set(property.id()) || self.direct_field(property).is_some()
    }

    /// Returns `true` if the effective value currently comes from an
    /// animation.
    #[must_use]
    pub fn is_animating<T: PropertyValue>(&self, property: Property<T>) -> bool {
        self.inner.store.borrow().is_animating(property.id())
    }

    fn own_value<T: PropertyValue>(&self, property: Property<T>) -> Option<T> {
        self.inner.store.borrow().own_value(property.id())
    }

    fn default_value<T: PropertyValue>(
        &self,
        property: Property<T>,
        metadata: &PropertyMetadata<T>,
    ) -> T {
        self.inner
            .registry
            .default_value(property, self.inner.object_type)
            .unwrap_or_else(|| metadata.default_value().clone())
    }

    fn own_default<T: PropertyValue>(
        &self,
        property: Property<T>,
        metadata: &PropertyMetadata<T>,
    ) -> ChainValue<T> {
        (self.default_value(property, metadata), BindingPriority::Unset)
    }

    /// The value handed down by the inheritance parent, for inheriting
    /// properties on objects that have one.
    fn inherited<T: PropertyValue>(
        &self,
        property: Property<T>,
        metadata: &PropertyMetadata<T>,
    ) -> Option<ChainValue<T>> {
        if !metadata.inherits() {
            return None;
        }
        let parent = self.inheritance_parent()?;
        Some(parent.chain_value(property, metadata))
    }

    /// This object's effective value as its inheritance children see it.
    ///
    /// Walks up to the nearest object with a value of its own. Without one,
    /// the topmost ancestor's default for its own type applies.
    fn chain_value<T: PropertyValue>(
        &self,
        property: Property<T>,
        metadata: &PropertyMetadata<T>,
    ) -> ChainValue<T> {
        let mut current = self.clone();
        loop {
            if let Some(value) = current.own_value(property) {
                return (value, BindingPriority::Inherited);
            }
            match current.inheritance_parent() {
                Some(parent) => current = parent,
                None => return current.own_default(property, metadata),
            }
        }
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Applies a value at `priority`.
    ///
    /// A local value replaces the previous local value and returns `None`.
    /// Any other priority adds a new constant entry (the newest entry wins
    /// ties within its tier) and returns a handle that removes it.
    ///
    /// # Errors
    ///
    /// - [`PropertyError::UnregisteredProperty`] if the property is unknown,
    ///   registered with another value type, or is a direct property not
    ///   visible on this object's type.
    /// - [`PropertyError::NotSupported`] for the `Inherited` and `Unset`
    ///   priorities, and for read-only or non-local writes to direct
    ///   properties.
    pub fn set_value<T: PropertyValue>(
        &self,
        property: Property<T>,
        value: T,
        priority: BindingPriority,
    ) -> Result<Option<ValueHandle>, PropertyError> {
        if !priority.accepts_sources() {
            return Err(PropertyError::NotSupported(
                "values cannot be applied at the Inherited or Unset priority",
            ));
        }
        match self.kind(property)? {
            Kind::Direct(metadata) => {
                if priority != BindingPriority::LocalValue {
                    return Err(PropertyError::NotSupported(
                        "direct properties only accept local values",
                    ));
                }
                if metadata.read_only() {
                    return Err(PropertyError::NotSupported("property is read-only"));
                }
                self.write_direct(property, metadata, Some(value), None);
                Ok(None)
            }
            Kind::Styled(metadata) if priority == BindingPriority::LocalValue => {
                let fast_path = !metadata.has_coerce_callback();
                let write = self
                    .inner
                    .store
                    .borrow_mut()
                    .set_local(property.id(), value, fast_path);
                self.apply_local_write(property, metadata, write);
                Ok(None)
            }
            Kind::Styled(metadata) => {
                let entry = self.next_entry_id();
                self.inner
                    .store
                    .borrow_mut()
                    .add_entry(property.id(), Entry::constant(entry, priority, value));
                self.recompute(property, metadata, None);
                Ok(Some(self.entry_handle(property, entry)))
            }
        }
    }

    /// Writes a direct property from the owning code, bypassing the
    /// read-only check.
    ///
    /// # Errors
    ///
    /// [`PropertyError::NotSupported`] for styled properties, and
    /// [`PropertyError::UnregisteredProperty`] as for
    /// [`set_value`](Self::set_value).
    pub fn set_and_raise<T: PropertyValue>(
        &self,
        property: Property<T>,
        value: T,
    ) -> Result<(), PropertyError> {
        match self.kind(property)? {
            Kind::Direct(metadata) => {
                self.write_direct(property, metadata, Some(value), None);
                Ok(())
            }
            Kind::Styled(_) => Err(PropertyError::NotSupported(
                "set_and_raise only applies to direct properties",
            )),
        }
    }

    /// Binds `property` to a value source at `priority`.
    ///
    /// Every item the source emits is applied synchronously. When the source
    /// completes, or the returned handle is disposed, the binding is removed
    /// and lower sources show through. A direct property holds at most one
    /// binding; a new one replaces (and cancels) the previous one.
    ///
    /// # Errors
    ///
    /// As for [`set_value`](Self::set_value), except that direct properties
    /// accept bindings at any source priority.
    pub fn bind<T, S>(
        &self,
        property: Property<T>,
        source: &S,
        priority: BindingPriority,
    ) -> Result<ValueHandle, PropertyError>
    where
        T: PropertyValue,
        S: ValueSource<T> + ?Sized,
    {
        if !priority.accepts_sources() {
            return Err(PropertyError::NotSupported(
                "values cannot be applied at the Inherited or Unset priority",
            ));
        }
        match self.kind(property)? {
            Kind::Styled(_) => Ok(self.bind_styled(property, source, priority)),
            Kind::Direct(metadata) => {
                if metadata.read_only() {
                    return Err(PropertyError::NotSupported("property is read-only"));
                }
                Ok(self.bind_direct(property, source))
            }
        }
    }

    /// Clears the local value, letting the other sources show through.
    ///
    /// Direct properties are reset to their unset value.
    ///
    /// # Errors
    ///
    /// As for [`set_value`](Self::set_value).
    pub fn clear_value<T: PropertyValue>(
        &self,
        property: Property<T>,
    ) -> Result<(), PropertyError> {
        match self.kind(property)? {
            Kind::Direct(metadata) => {
                if metadata.read_only() {
                    return Err(PropertyError::NotSupported("property is read-only"));
                }
                self.write_direct(property, metadata, None, None);
            }
            Kind::Styled(metadata) => {
                let write = self.inner.store.borrow_mut().clear_local::<T>(property.id());
                self.apply_local_write(property, metadata, write);
            }
        }
        Ok(())
    }

    /// Removes every source of `property` on this object, cancelling its
    /// bindings.
    ///
    /// # Errors
    ///
    /// As for [`clear_value`](Self::clear_value).
    pub fn clear_all_values<T: PropertyValue>(
        &self,
        property: Property<T>,
    ) -> Result<(), PropertyError> {
        match self.kind(property)? {
            Kind::Direct(metadata) => {
                if metadata.read_only() {
                    return Err(PropertyError::NotSupported("property is read-only"));
                }
                self.remove_direct_binding(property.id(), None);
                self.write_direct(property, metadata, None, None);
            }
            Kind::Styled(metadata) => {
                let slot = self.inner.store.borrow_mut().take::<T>(property.id());
                if let Some(slot) = slot {
                    let old = slot.committed();
                    drop(slot);
                    let transition = Transition {
                        old,
                        new: Resolution::unset(),
                    };
                    self.raise_transition(property, metadata, transition, None);
                }
            }
        }
        Ok(())
    }

    /// Re-runs resolution and coercion for `property` without changing its
    /// sources.
    ///
    /// Call this when state the coercion callback reads has changed.
    ///
    /// # Errors
    ///
    /// [`PropertyError::UnregisteredProperty`] as for
    /// [`set_value`](Self::set_value).
    pub fn coerce_value<T: PropertyValue>(
        &self,
        property: Property<T>,
    ) -> Result<(), PropertyError> {
        if let Kind::Styled(metadata) = self.kind(property)? {
            self.recompute(property, metadata, None);
        }
        Ok(())
    }

    fn apply_local_write<T: PropertyValue>(
        &self,
        property: Property<T>,
        metadata: &PropertyMetadata<T>,
        write: LocalWrite<T>,
    ) {
        match write {
            LocalWrite::Applied(Some(transition)) => {
                self.raise_transition(property, metadata, transition, None);
            }
            LocalWrite::Applied(None) => {}
            LocalWrite::NeedsResolve => self.recompute(property, metadata, None),
        }
    }

    fn entry_handle<T: PropertyValue>(&self, property: Property<T>, entry: EntryId) -> ValueHandle {
        let object = self.downgrade();
        ValueHandle::new(move || {
            if let Some(object) = object.upgrade() {
                tracing::trace!(property = %property.id(), "disposing value");
                object.remove_entry(property, entry);
            }
        })
    }

    fn remove_entry<T: PropertyValue>(&self, property: Property<T>, entry: EntryId) {
        let removed = self
            .inner
            .store
            .borrow_mut()
            .remove_entry::<T>(property.id(), entry);
        if removed.is_some()
            && let Some(metadata) = self.inner.registry.metadata(property)
        {
            self.recompute(property, metadata, None);
        }
        drop(removed);
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    fn bind_styled<T, S>(
        &self,
        property: Property<T>,
        source: &S,
        priority: BindingPriority,
    ) -> ValueHandle
    where
        T: PropertyValue,
        S: ValueSource<T> + ?Sized,
    {
        let id = property.id();
        let entry = self.next_entry_id();
        self.inner
            .store
            .borrow_mut()
            .add_entry(id, Entry::<T>::binding(entry, priority));

        let object = self.downgrade();
        let observer = SourceObserver::new(move |event| {
            if let Some(object) = object.upgrade() {
                object.on_binding_event(property, entry, event);
            }
        });
        let subscription = source.subscribe(observer);

        // The source may already have completed inside `subscribe`.
        let rejected = match self.inner.store.borrow_mut().entry_mut::<T>(id, entry) {
            Some(entry) => entry.attach(subscription),
            None => Some(subscription),
        };
        drop(rejected);

        self.entry_handle(property, entry)
    }

    fn on_binding_event<T: PropertyValue>(
        &self,
        property: Property<T>,
        entry: EntryId,
        event: SourceEvent<T>,
    ) {
        let Some(metadata) = self.inner.registry.metadata(property) else {
            return;
        };
        match event {
            SourceEvent::Completed => {
                tracing::trace!(property = self.property_name(property.id()), "binding completed");
                self.remove_entry(property, entry);
            }
            SourceEvent::Next(item) => {
                let Some((value, error)) = self.accept_item(property.id(), item) else {
                    return;
                };
                let updated = match self
                    .inner
                    .store
                    .borrow_mut()
                    .entry_mut::<T>(property.id(), entry)
                {
                    Some(entry) => {
                        entry.value = value;
                        true
                    }
                    None => false,
                };
                if updated {
                    self.recompute(property, metadata, error);
                }
            }
        }
    }

    /// Turns a source item into the value to store, logging errors.
    ///
    /// `None` means the item leaves the current value alone.
    fn accept_item<T: PropertyValue>(
        &self,
        id: PropertyId,
        item: BindingValue<T>,
    ) -> Option<(Option<T>, Option<BindingError>)> {
        match item {
            BindingValue::Value(value) => Some((Some(value), None)),
            BindingValue::Unset => Some((None, None)),
            BindingValue::DoNothing => None,
            BindingValue::Error { error, fallback } => {
                tracing::warn!(
                    target: "understory_object::binding",
                    property = self.property_name(id),
                    object = self.type_name(),
                    has_fallback = fallback.is_some(),
                    "binding error: {error}"
                );
                fallback.map(|value| (Some(value), Some(error)))
            }
        }
    }

    // =========================================================================
    // Direct properties
    // =========================================================================

    fn direct_field<T: PropertyValue>(&self, property: Property<T>) -> Option<T> {
        let values = self.inner.direct_values.borrow();
        let index = values
            .binary_search_by_key(&property.id(), |(id, _)| *id)
            .ok()?;
        values[index].1.downcast_ref::<T>().cloned()
    }

    fn direct_value<T: PropertyValue>(
        &self,
        property: Property<T>,
        metadata: &DirectMetadata<T>,
    ) -> T {
        self.direct_field(property)
            .unwrap_or_else(|| metadata.unset_value().clone())
    }

    /// Stores (or, with `None`, resets) a direct property and raises the
    /// change.
    fn write_direct<T: PropertyValue>(
        &self,
        property: Property<T>,
        metadata: &DirectMetadata<T>,
        value: Option<T>,
        error: Option<BindingError>,
    ) {
        let old = self.direct_value(property, metadata);
        {
            let mut values = self.inner.direct_values.borrow_mut();
            let position = values.binary_search_by_key(&property.id(), |(id, _)| *id);
            match (position, value) {
                (Ok(index), Some(value)) => values[index].1 = ErasedValue::new(value),
                (Err(index), Some(value)) => {
                    values.insert(index, (property.id(), ErasedValue::new(value)));
                }
                (Ok(index), None) => {
                    values.remove(index);
                }
                (Err(_), None) => {}
            }
        }
        let new = self.direct_value(property, metadata);
        if old != new {
            let new_value = match error {
                Some(error) => BindingValue::error_with_fallback(error, new),
                None => BindingValue::Value(new),
            };
            let change = PropertyChange::new(
                self.clone(),
                property,
                Some(old),
                new_value,
                BindingPriority::LocalValue,
                true,
            );
            self.notify(change, None, None);
        }
    }

    fn bind_direct<T, S>(&self, property: Property<T>, source: &S) -> ValueHandle
    where
        T: PropertyValue,
        S: ValueSource<T> + ?Sized,
    {
        let id = property.id();
        let binding = self.next_entry_id();
        self.remove_direct_binding(id, None);
        self.inner.direct_bindings.borrow_mut().push(DirectBinding {
            property: id,
            id: binding,
            subscription: None,
        });

        let object = self.downgrade();
        let observer = SourceObserver::new(move |event| {
            if let Some(object) = object.upgrade() {
                object.on_direct_binding_event(property, binding, event);
            }
        });
        let subscription = source.subscribe(observer);

        let rejected = {
            let mut bindings = self.inner.direct_bindings.borrow_mut();
            match bindings
                .iter_mut()
                .find(|b| b.property == id && b.id == binding)
            {
                Some(current) => current.subscription.replace(subscription),
                None => Some(subscription),
            }
        };
        drop(rejected);

        let object = self.downgrade();
        ValueHandle::new(move || {
            if let Some(object) = object.upgrade() {
                object.remove_direct_binding(id, Some(binding));
            }
        })
    }

    /// Removes the direct binding of `property` (only if it is `binding`,
    /// when given), cancelling its subscription.
    fn remove_direct_binding(&self, property: PropertyId, binding: Option<EntryId>) {
        let removed = {
            let mut bindings = self.inner.direct_bindings.borrow_mut();
            bindings
                .iter()
                .position(|b| b.property == property && binding.is_none_or(|id| b.id == id))
                .map(|index| bindings.remove(index))
        };
        drop(removed);
    }

    fn on_direct_binding_event<T: PropertyValue>(
        &self,
        property: Property<T>,
        binding: EntryId,
        event: SourceEvent<T>,
    ) {
        let current = self
            .inner
            .direct_bindings
            .borrow()
            .iter()
            .any(|b| b.property == property.id() && b.id == binding);
        if !current {
            return;
        }
        match event {
            SourceEvent::Completed => {
                tracing::trace!(property = self.property_name(property.id()), "binding completed");
                self.remove_direct_binding(property.id(), Some(binding));
            }
            SourceEvent::Next(item) => {
                if let Some((value, error)) = self.accept_item(property.id(), item)
                    && let Some(metadata) = self.inner.registry.direct_metadata(property)
                {
                    self.write_direct(property, metadata, value, error);
                }
            }
        }
    }

    // =========================================================================
    // Resolution and notification
    // =========================================================================

    fn recompute<T: PropertyValue>(
        &self,
        property: Property<T>,
        metadata: &PropertyMetadata<T>,
        error: Option<BindingError>,
    ) {
        let id = property.id();
        let Some(resolved) = self.inner.store.borrow().resolve::<T>(id) else {
            return;
        };
        let resolved = if metadata.has_coerce_callback() {
            resolved.map(|value| metadata.coerce(self, value))
        } else {
            resolved
        };
        let transition = {
            let mut store = self.inner.store.borrow_mut();
            let transition = store.commit(id, resolved);
            store.compact::<T>(id, !metadata.has_coerce_callback());
            transition
        };
        if let Some(transition) = transition {
            self.raise_transition(property, metadata, transition, error);
        }
    }

    /// Turns a committed transition into change notifications.
    ///
    /// Absent values map to the inherited value, then to this object's
    /// default. The effective change is raised when the effective value
    /// differs. While an animation holds the property, a separate
    /// non-effective change reports movement of the value underneath.
    fn raise_transition<T: PropertyValue>(
        &self,
        property: Property<T>,
        metadata: &PropertyMetadata<T>,
        transition: Transition<T>,
        error: Option<BindingError>,
    ) {
        let Transition { old, new } = transition;
        let needs_inherited = old.value.is_none()
            || new.value.is_none()
            || old.non_animated.is_none()
            || new.non_animated.is_none();
        let inherited = if needs_inherited {
            self.inherited(property, metadata)
        } else {
            None
        };
        let fallback = || inherited.clone().unwrap_or_else(|| self.own_default(property, metadata));
        // What children see: own values are reported to them as inherited.
        let chain = |value: Option<T>| match value {
            Some(value) => (value, BindingPriority::Inherited),
            None => fallback(),
        };

        let old_chain = chain(old.value);
        let new_chain = chain(new.value.clone());
        if old_chain.0 != new_chain.0 {
            let priority = if new.value.is_some() {
                new.priority
            } else {
                new_chain.1
            };
            let new_item = match error {
                Some(error) => BindingValue::error_with_fallback(error, new_chain.0.clone()),
                None => BindingValue::Value(new_chain.0.clone()),
            };
            let change = PropertyChange::new(
                self.clone(),
                property,
                Some(old_chain.0.clone()),
                new_item,
                priority,
                true,
            );
            let fan_out = metadata.inherits().then_some((&old_chain, &new_chain));
            self.notify(change, Some(metadata), fan_out);
        }

        if new.priority.is_animation() {
            let (old_value, _) = chain(old.non_animated);
            let (new_value, inherited_priority) = chain(new.non_animated.clone());
            if old_value != new_value {
                let priority = if new.non_animated.is_some() {
                    new.non_animated_priority
                } else {
                    inherited_priority
                };
                let change = PropertyChange::new(
                    self.clone(),
                    property,
                    Some(old_value),
                    BindingValue::Value(new_value),
                    priority,
                    false,
                );
                self.notify(change, None, None);
            }
        }
    }

    /// Delivers a change: class handler, then inheritance children
    /// depth-first, then this object's listeners.
    fn notify<T: PropertyValue>(
        &self,
        change: PropertyChange<T>,
        metadata: Option<&PropertyMetadata<T>>,
        fan_out: Option<(&ChainValue<T>, &ChainValue<T>)>,
    ) {
        if let Some(metadata) = metadata {
            metadata.on_changed(&change);
        }
        let property = change.property();
        if let Some((old, new)) = fan_out {
            for child in self.inheritance_children() {
                child.inherited_changed(property, old, new);
            }
        }

        let id = property.id();
        let any = self
            .inner
            .any_channel
            .has_subscribers()
            .then(|| change.to_any(self.property_name(id)));
        if let Some(channel) = self.channel::<T>(id) {
            channel.signal(Rc::new(change));
            if channel.is_unused() {
                self.release_channel(id, &channel);
            }
        }
        if let Some(any) = any {
            self.inner.any_channel.signal(Rc::new(any));
        }
    }

    fn channel<T: PropertyValue>(&self, id: PropertyId) -> Option<Rc<TypedChannel<T>>> {
        let channels = self.inner.channels.borrow();
        let index = channels.binary_search_by_key(&id, |(p, _)| *p).ok()?;
        Rc::clone(&channels[index].1)
            .downcast::<TypedChannel<T>>()
            .ok()
    }

    fn release_channel<T: PropertyValue>(&self, id: PropertyId, channel: &Rc<TypedChannel<T>>) {
        let mut channels = self.inner.channels.borrow_mut();
        if let Ok(index) = channels.binary_search_by_key(&id, |(p, _)| *p)
            && core::ptr::addr_eq(Rc::as_ptr(&channels[index].1), Rc::as_ptr(channel))
        {
            channels.remove(index);
        }
    }

    pub(crate) fn channel_or_insert<T: PropertyValue>(
        &self,
        id: PropertyId,
    ) -> Rc<TypedChannel<T>> {
        if let Some(channel) = self.channel::<T>(id) {
            return channel;
        }
        let channel = Rc::new(TypedChannel::<T>::new());
        let erased: Rc<dyn Any> = channel.clone();
        let mut channels = self.inner.channels.borrow_mut();
        match channels.binary_search_by_key(&id, |(p, _)| *p) {
            Ok(index) => channels[index].1 = erased,
            Err(index) => channels.insert(index, (id, erased)),
        }
        channel
    }

    /// The synthetic change a new listener receives: the current value with
    /// no old value.
    pub(crate) fn current_change<T: PropertyValue>(
        &self,
        property: Property<T>,
        include_animations: bool,
    ) -> Option<PropertyChange<T>> {
        let (value, priority) = match self.kind(property).ok()? {
            Kind::Direct(metadata) => match self.direct_field(property) {
                Some(value) => (value, BindingPriority::LocalValue),
                None => (metadata.unset_value().clone(), BindingPriority::Unset),
            },
            Kind::Styled(metadata) => {
                let committed = self.inner.store.borrow().committed::<T>(property.id());
                let (own, priority) = if include_animations {
                    (committed.value, committed.priority)
                } else {
                    (committed.non_animated, committed.non_animated_priority)
                };
                match own {
                    Some(value) => (value, priority),
                    None => self
                        .inherited(property, metadata)
                        .unwrap_or_else(|| self.own_default(property, metadata)),
                }
            }
        };
        Some(PropertyChange::new(
            self.clone(),
            property,
            None,
            BindingValue::Value(value),
            priority,
            true,
        ))
    }

    // =========================================================================
    // Listening
    // =========================================================================

    /// Returns a change stream for one property.
    ///
    /// Every subscriber first receives the current value (with no old value)
    /// and then each change in order. With `include_animations = false` the
    /// stream follows the value underneath any animation instead, and skips
    /// repeats.
    ///
    /// # Errors
    ///
    /// [`PropertyError::UnregisteredProperty`] as for
    /// [`set_value`](Self::set_value).
    pub fn listen<T: PropertyValue>(
        &self,
        property: Property<T>,
        include_animations: bool,
    ) -> Result<PropertyObservable<T>, PropertyError> {
        self.kind(property)?;
        Ok(PropertyObservable::new(
            self.downgrade(),
            property,
            include_animations,
        ))
    }

    /// Subscribes to every change of every property on this object.
    ///
    /// Unlike [`listen`](Self::listen) there is no initial value.
    pub fn on_property_changed(
        &self,
        callback: impl Fn(&AnyPropertyChange) + 'static,
    ) -> Subscription {
        let (_, subscription) = self.inner.any_channel.subscribe(Box::new(callback));
        subscription
    }

    // =========================================================================
    // Inheritance
    // =========================================================================

    /// Returns the inheritance parent.
    #[must_use]
    pub fn inheritance_parent(&self) -> Option<Self> {
        self.inner.parent.borrow().clone()
    }

    /// Returns the live objects whose inheritance parent is this object.
    #[must_use]
    pub fn inheritance_children(&self) -> Vec<Self> {
        self.inner
            .children
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .map(|inner| Self { inner })
            .collect()
    }

    /// Sets (or, with `None`, removes) the inheritance parent.
    ///
    /// Every inheriting property without a value of its own on this object
    /// then reports a change if the value through the new parent chain
    /// differs from the one through the old chain, and its descendants
    /// follow.
    ///
    /// # Errors
    ///
    /// [`PropertyError::InheritanceCycle`] if `parent` is this object or one
    /// of its descendants.
    pub fn set_inheritance_parent(&self, parent: Option<&Self>) -> Result<(), PropertyError> {
        let mut ancestor = parent.cloned();
        while let Some(current) = ancestor {
            if current.ptr_eq(self) {
                return Err(PropertyError::InheritanceCycle);
            }
            ancestor = current.inheritance_parent();
        }

        let old = self.inner.parent.replace(parent.cloned());
        let unchanged = match (&old, parent) {
            (Some(old), Some(new)) => old.ptr_eq(new),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return Ok(());
        }

        let me = Rc::downgrade(&self.inner);
        if let Some(old) = &old {
            old.inner
                .children
                .borrow_mut()
                .retain(|child| !Weak::ptr_eq(child, &me) && child.strong_count() > 0);
        }
        if let Some(parent) = parent {
            parent.inner.children.borrow_mut().push(me);
        }
        tracing::trace!(
            object = self.type_name(),
            parent = parent.map(Self::type_name),
            "inheritance parent changed"
        );

        let registry = Rc::clone(&self.inner.registry);
        for id in registry.registered_inherited(self.inner.object_type) {
            if let Some(registration) = registry.get(id) {
                registration.notify_inheritance_parent_changed(id, self, old.as_ref());
            }
        }
        Ok(())
    }

    /// Reacts to a new inheritance parent for one property.
    pub(crate) fn inheritance_parent_changed<T: PropertyValue>(
        &self,
        property: Property<T>,
        old_parent: Option<&Self>,
    ) {
        if self.inner.store.borrow().is_set(property.id()) {
            return;
        }
        let Some(metadata) = self.inner.registry.metadata(property) else {
            return;
        };
        let old = match old_parent {
            Some(parent) => parent.chain_value(property, metadata),
            None => self.own_default(property, metadata),
        };
        let new = self
            .inherited(property, metadata)
            .unwrap_or_else(|| self.own_default(property, metadata));
        self.inherited_changed(property, &old, &new);
    }

    /// Applies an ancestor's change to this object and its descendants,
    /// unless this object has a value of its own.
    fn inherited_changed<T: PropertyValue>(
        &self,
        property: Property<T>,
        old: &ChainValue<T>,
        new: &ChainValue<T>,
    ) {
        if old.0 == new.0 || self.inner.store.borrow().is_set(property.id()) {
            return;
        }
        let Some(metadata) = self.inner.registry.metadata(property) else {
            return;
        };
        let change = PropertyChange::new(
            self.clone(),
            property,
            Some(old.0.clone()),
            BindingValue::Value(new.0.clone()),
            new.1,
            true,
        );
        self.notify(change, Some(metadata), Some((old, new)));
    }
}

impl fmt::Debug for DependencyObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyObject")
            .field("type", &self.type_name())
            .field(
                "values",
                &self.inner.store.try_borrow().map(|store| store.len()).ok(),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{DirectMetadataBuilder, PropertyMetadataBuilder};
    use crate::source::ValueSubject;
    use alloc::string::String;
    use alloc::vec;

    struct Fixture {
        registry: Rc<PropertyRegistry>,
        control: ObjectType,
        width: Property<f64>,
        clamped: Property<i32>,
        text: Property<String>,
    }

    fn fixture() -> Fixture {
        let mut registry = PropertyRegistry::new();
        let control = registry.register_type("Control", None).unwrap();
        let width = registry
            .register(control, "Width", PropertyMetadata::new(0.0))
            .unwrap();
        let clamped = registry
            .register(
                control,
                "Clamped",
                PropertyMetadataBuilder::new(0)
                    .coerce(|_, v: i32| v.clamp(0, 10))
                    .build(),
            )
            .unwrap();
        let text = registry
            .register_direct(
                control,
                "Text",
                DirectMetadataBuilder::new(String::new()).build(),
            )
            .unwrap();
        Fixture {
            registry: Rc::new(registry),
            control,
            width,
            clamped,
            text,
        }
    }

    fn recorder<T: PropertyValue>(
        object: &DependencyObject,
        property: Property<T>,
    ) -> (Rc<RefCell<Vec<T>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let subscription = object
            .listen(property, true)
            .unwrap()
            .subscribe(move |change| {
                sink.borrow_mut().push(change.value().unwrap().clone());
            });
        (seen, subscription)
    }

    #[test]
    fn promotion_is_silent() {
        let f = fixture();
        let object = DependencyObject::new(Rc::clone(&f.registry), f.control);
        object
            .set_value(f.width, 5.0, BindingPriority::LocalValue)
            .unwrap();
        let (seen, _subscription) = recorder(&object, f.width);

        let style = object
            .set_value(f.width, 7.0, BindingPriority::Style)
            .unwrap()
            .unwrap();
        style.dispose();

        assert_eq!(*seen.borrow(), vec![5.0]);
        assert_eq!(object.value_properties(), vec![f.width.id()]);
    }

    #[test]
    fn unused_channels_are_released_on_change() {
        let f = fixture();
        let object = DependencyObject::new(Rc::clone(&f.registry), f.control);
        let (seen, subscription) = recorder(&object, f.width);
        assert_eq!(object.inner.channels.borrow().len(), 1);

        object
            .set_value(f.width, 1.0, BindingPriority::LocalValue)
            .unwrap();
        assert_eq!(object.inner.channels.borrow().len(), 1);

        drop(subscription);
        object
            .set_value(f.width, 2.0, BindingPriority::LocalValue)
            .unwrap();
        assert!(object.inner.channels.borrow().is_empty());

        let (again, _subscription) = recorder(&object, f.width);
        object
            .set_value(f.width, 3.0, BindingPriority::LocalValue)
            .unwrap();
        assert_eq!(*seen.borrow(), vec![0.0, 1.0]);
        assert_eq!(*again.borrow(), vec![2.0, 3.0]);
    }

    #[test]
    fn coercion_applies_to_resolved_values() {
        let f = fixture();
        let object = DependencyObject::new(Rc::clone(&f.registry), f.control);
        object
            .set_value(f.clamped, 50, BindingPriority::LocalValue)
            .unwrap();
        assert_eq!(object.get_value(f.clamped), 10);
        assert_eq!(
            object
                .get_base_value(f.clamped, BindingPriority::Animation)
                .unwrap(),
            50
        );
    }

    #[test]
    fn direct_property_rules() {
        let f = fixture();
        let object = DependencyObject::new(Rc::clone(&f.registry), f.control);
        assert!(matches!(
            object.set_value(f.text, String::from("x"), BindingPriority::Style),
            Err(PropertyError::NotSupported(_))
        ));
        object
            .set_value(f.text, String::from("hello"), BindingPriority::LocalValue)
            .unwrap();
        assert_eq!(object.get_value(f.text), "hello");
        assert!(object.is_set(f.text));

        object.clear_value(f.text).unwrap();
        assert_eq!(object.get_value(f.text), "");
    }

    #[test]
    fn direct_bindings_replace_each_other() {
        let f = fixture();
        let object = DependencyObject::new(Rc::clone(&f.registry), f.control);
        let first = ValueSubject::with_value(String::from("a"));
        let second = ValueSubject::with_value(String::from("b"));

        object
            .bind(f.text, &first, BindingPriority::LocalValue)
            .unwrap();
        assert_eq!(first.observer_count(), 1);
        object
            .bind(f.text, &second, BindingPriority::LocalValue)
            .unwrap();
        assert_eq!(first.observer_count(), 0);

        first.next(String::from("ignored"));
        assert_eq!(object.get_value(f.text), "b");
    }

    #[test]
    fn unset_priorities_are_rejected() {
        let f = fixture();
        let object = DependencyObject::new(Rc::clone(&f.registry), f.control);
        assert!(matches!(
            object.set_value(f.width, 1.0, BindingPriority::Inherited),
            Err(PropertyError::NotSupported(_))
        ));
        assert!(matches!(
            object.set_value(f.width, 1.0, BindingPriority::Unset),
            Err(PropertyError::NotSupported(_))
        ));
    }

    #[test]
    fn debug_names_the_type() {
        let f = fixture();
        let object = DependencyObject::new(Rc::clone(&f.registry), f.control);
        let debug = alloc::format!("{object:?}");
        assert!(debug.contains("Control"));
    }
}
