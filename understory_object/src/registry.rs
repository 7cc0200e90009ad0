// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property and object type registry.
//!
//! This module provides [`PropertyRegistry`], the catalogue of object types
//! and property descriptors shared by every [`DependencyObject`].

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::{Any, TypeId};
use hashbrown::{Equivalent, HashMap};
use smallvec::SmallVec;

use crate::error::PropertyError;
use crate::id::{ObjectType, Property, PropertyId};
use crate::metadata::{DirectMetadata, PropertyMetadata};
use crate::object::DependencyObject;
use crate::value::{ErasedValue, PropertyValue};

/// How a property stores and resolves its value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Values compete by [`BindingPriority`](crate::BindingPriority) and may
    /// be inherited and coerced.
    Styled,
    /// A single backing value with no priority system; bindings replace each
    /// other instead of competing.
    Direct,
}

/// A registration entry for a property.
pub struct PropertyRegistration {
    name: &'static str,
    owners: SmallVec<[ObjectType; 2]>,
    kind: PropertyKind,
    attached: bool,
    type_id: TypeId,
    metadata: Box<dyn ErasedMetadata>,
    default_overrides: SmallVec<[(ObjectType, ErasedValue); 1]>,
}

impl PropertyRegistration {
    /// Returns the property name.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the declaring type.
    #[must_use]
    #[inline]
    pub fn owner(&self) -> ObjectType {
        self.owners[0]
    }

    /// Returns the declaring type followed by every type added with
    /// [`PropertyRegistry::add_owner`].
    #[must_use]
    #[inline]
    pub fn owners(&self) -> &[ObjectType] {
        &self.owners
    }

    /// Returns the property kind.
    #[must_use]
    #[inline]
    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    /// Returns `true` for attached properties, which are valid on every type.
    #[must_use]
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Returns the [`TypeId`] of the property's value type.
    #[must_use]
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns whether this property inherits from the inheritance parent.
    #[must_use]
    #[inline]
    pub fn inherits(&self) -> bool {
        self.metadata.inherits()
    }

    /// Returns whether public writes are rejected.
    #[must_use]
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.metadata.read_only()
    }

    pub(crate) fn notify_inheritance_parent_changed(
        &self,
        property: PropertyId,
        object: &DependencyObject,
        old_parent: Option<&DependencyObject>,
    ) {
        self.metadata
            .inheritance_parent_changed(property, object, old_parent);
    }
}

impl core::fmt::Debug for PropertyRegistration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertyRegistration")
            .field("name", &self.name)
            .field("owners", &self.owners)
            .field("kind", &self.kind)
            .field("attached", &self.attached)
            .field("inherits", &self.inherits())
            .field("read_only", &self.is_read_only())
            .finish_non_exhaustive()
    }
}

/// Borrowed form of the `(owner, name)` key, so lookups need no `'static` name.
#[derive(Hash)]
struct NameKey<'a>(ObjectType, &'a str);

impl Equivalent<(ObjectType, &'static str)> for NameKey<'_> {
    fn equivalent(&self, key: &(ObjectType, &'static str)) -> bool {
        self.0 == key.0 && self.1 == key.1
    }
}

#[derive(Debug)]
struct TypeRegistration {
    name: &'static str,
    base: Option<ObjectType>,
}

/// The catalogue of object types and properties.
///
/// Types and properties are registered once at startup. The finished
/// registry is then shared by every object (usually behind an `Rc`), and
/// identities stay stable for its whole lifetime.
///
/// # Example
///
/// ```rust
/// use understory_object::{PropertyMetadataBuilder, PropertyRegistry};
///
/// let mut registry = PropertyRegistry::new();
/// let control = registry.register_type("Control", None).unwrap();
/// let button = registry.register_type("Button", Some(control)).unwrap();
///
/// let width = registry
///     .register(control, "Width", PropertyMetadataBuilder::new(0.0_f64).build())
///     .unwrap();
///
/// // Lookups walk the type ancestry.
/// assert_eq!(registry.lookup(button, "Width"), Some(width.id()));
/// assert_eq!(registry.name(width.id()), Some("Width"));
///
/// // Names are unique per declaring type.
/// assert!(
///     registry
///         .register(control, "Width", PropertyMetadataBuilder::new(1.0_f64).build())
///         .is_err()
/// );
/// ```
#[derive(Default)]
pub struct PropertyRegistry {
    types: Vec<TypeRegistration>,
    type_names: HashMap<&'static str, ObjectType>,
    properties: Vec<PropertyRegistration>,
    by_owner: HashMap<(ObjectType, &'static str), PropertyId>,
}

impl PropertyRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Object types
    // =========================================================================

    /// Registers an object type, optionally deriving from `base`.
    ///
    /// # Panics
    ///
    /// Panics if `base` was not issued by this registry, or if more than
    /// 65,535 types are registered.
    pub fn register_type(
        &mut self,
        name: &'static str,
        base: Option<ObjectType>,
    ) -> Result<ObjectType, PropertyError> {
        if self.type_names.contains_key(name) {
            return Err(PropertyError::DuplicateRegistration {
                name,
                owner: "<types>",
            });
        }
        if let Some(base) = base {
            assert!(
                (base.index() as usize) < self.types.len(),
                "Base type {base:?} is not registered"
            );
        }
        assert!(
            self.types.len() < u16::MAX as usize,
            "Too many object types registered (max {})",
            u16::MAX
        );

        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        let ty = ObjectType::new(self.types.len() as u16);
        self.types.push(TypeRegistration { name, base });
        self.type_names.insert(name, ty);
        Ok(ty)
    }

    /// Returns the name of an object type.
    #[must_use]
    pub fn type_name(&self, ty: ObjectType) -> &'static str {
        self.types
            .get(ty.index() as usize)
            .map_or("<unknown>", |t| t.name)
    }

    /// Returns the base of an object type.
    #[must_use]
    pub fn base_type(&self, ty: ObjectType) -> Option<ObjectType> {
        self.types.get(ty.index() as usize).and_then(|t| t.base)
    }

    /// Looks up an object type by name.
    #[must_use]
    pub fn type_by_name(&self, name: &str) -> Option<ObjectType> {
        self.type_names.get(name).copied()
    }

    /// Iterates `ty` followed by each of its bases, most derived first.
    pub fn ancestry(&self, ty: ObjectType) -> impl Iterator<Item = ObjectType> + '_ {
        core::iter::successors(Some(ty), |&current| self.base_type(current))
    }

    /// Returns `true` if `ty` is `ancestor` or derives from it.
    #[must_use]
    pub fn is_assignable(&self, ty: ObjectType, ancestor: ObjectType) -> bool {
        self.ancestry(ty).any(|t| t == ancestor)
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Registers a styled property declared by `owner`.
    pub fn register<T: PropertyValue>(
        &mut self,
        owner: ObjectType,
        name: &'static str,
        metadata: PropertyMetadata<T>,
    ) -> Result<Property<T>, PropertyError> {
        self.insert(owner, name, PropertyKind::Styled, false, Box::new(metadata))
    }

    /// Registers a styled property that may be used on objects of any type.
    ///
    /// `owner` only scopes the name.
    pub fn register_attached<T: PropertyValue>(
        &mut self,
        owner: ObjectType,
        name: &'static str,
        metadata: PropertyMetadata<T>,
    ) -> Result<Property<T>, PropertyError> {
        self.insert(owner, name, PropertyKind::Styled, true, Box::new(metadata))
    }

    /// Registers a direct property declared by `owner`.
    ///
    /// Direct properties can only be used on `owner`, types derived from it,
    /// and types added with [`add_owner`](Self::add_owner).
    pub fn register_direct<T: PropertyValue>(
        &mut self,
        owner: ObjectType,
        name: &'static str,
        metadata: DirectMetadata<T>,
    ) -> Result<Property<T>, PropertyError> {
        self.insert(owner, name, PropertyKind::Direct, false, Box::new(metadata))
    }

    fn insert<T: PropertyValue>(
        &mut self,
        owner: ObjectType,
        name: &'static str,
        kind: PropertyKind,
        attached: bool,
        metadata: Box<dyn ErasedMetadata>,
    ) -> Result<Property<T>, PropertyError> {
        if self.by_owner.contains_key(&(owner, name)) {
            return Err(PropertyError::DuplicateRegistration {
                name,
                owner: self.type_name(owner),
            });
        }
        assert!(
            self.properties.len() < u16::MAX as usize,
            "Too many properties registered (max {})",
            u16::MAX
        );

        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        let id = PropertyId::new(self.properties.len() as u16);

        let mut owners = SmallVec::new();
        owners.push(owner);
        self.properties.push(PropertyRegistration {
            name,
            owners,
            kind,
            attached,
            type_id: TypeId::of::<T>(),
            metadata,
            default_overrides: SmallVec::new(),
        });
        self.by_owner.insert((owner, name), id);

        Ok(Property::from_id(id))
    }

    /// Makes an existing property visible on another type under its name.
    pub fn add_owner(
        &mut self,
        property: PropertyId,
        owner: ObjectType,
    ) -> Result<(), PropertyError> {
        let Some(registration) = self.properties.get_mut(property.index() as usize) else {
            return Err(PropertyError::UnregisteredProperty {
                property,
                object_type: "<registry>",
            });
        };
        let name = registration.name;
        if self.by_owner.contains_key(&(owner, name)) {
            return Err(PropertyError::DuplicateRegistration {
                name,
                owner: self
                    .types
                    .get(owner.index() as usize)
                    .map_or("<unknown>", |t| t.name),
            });
        }
        registration.owners.push(owner);
        self.by_owner.insert((owner, name), property);
        Ok(())
    }

    /// Overrides a styled property's default value for `ty` and its
    /// descendants.
    pub fn override_default<T: PropertyValue>(
        &mut self,
        property: Property<T>,
        ty: ObjectType,
        value: T,
    ) -> Result<(), PropertyError> {
        let object_type = self.type_name(ty);
        let registration = self
            .properties
            .get_mut(property.id().index() as usize)
            .filter(|r| r.kind == PropertyKind::Styled && r.type_id == TypeId::of::<T>())
            .ok_or(PropertyError::UnregisteredProperty {
                property: property.id(),
                object_type,
            })?;

        let value = ErasedValue::new(value);
        match registration
            .default_overrides
            .iter_mut()
            .find(|(t, _)| *t == ty)
        {
            Some((_, existing)) => *existing = value,
            None => registration.default_overrides.push((ty, value)),
        }
        Ok(())
    }

    /// Finds the property called `name` visible on `ty`.
    ///
    /// The most derived declaration wins.
    #[must_use]
    pub fn lookup(&self, ty: ObjectType, name: &str) -> Option<PropertyId> {
        self.ancestry(ty)
            .find_map(|t| self.by_owner.get(&NameKey(t, name)).copied())
    }

    /// Returns every inheriting property visible on `ty`.
    ///
    /// Used when an object's inheritance parent changes.
    #[must_use]
    pub fn registered_inherited(&self, ty: ObjectType) -> Vec<PropertyId> {
        self.iter()
            .filter(|(id, r)| r.inherits() && self.is_registered(ty, *id))
            .map(|(id, _)| id)
            .collect()
    }

    /// Returns `true` if `property` may be used on objects of type `ty`.
    #[must_use]
    pub fn is_registered(&self, ty: ObjectType, property: PropertyId) -> bool {
        self.get(property).is_some_and(|r| {
            r.attached
                || r.owners
                    .iter()
                    .any(|&owner| self.is_assignable(ty, owner))
        })
    }

    /// Returns the default value of `property` for objects of type `ty`.
    ///
    /// Per-type overrides are searched from `ty` towards the root; direct
    /// properties report their unset value.
    #[must_use]
    pub fn default_value<T: PropertyValue>(
        &self,
        property: Property<T>,
        ty: ObjectType,
    ) -> Option<T> {
        let registration = self.get(property.id())?;
        if registration.type_id != TypeId::of::<T>() {
            return None;
        }
        match registration.kind {
            PropertyKind::Styled => {
                if !registration.default_overrides.is_empty() {
                    for t in self.ancestry(ty) {
                        if let Some((_, value)) =
                            registration.default_overrides.iter().find(|(o, _)| *o == t)
                        {
                            return value.downcast_ref::<T>().cloned();
                        }
                    }
                }
                self.metadata(property).map(|m| m.default_value().clone())
            }
            PropertyKind::Direct => self
                .direct_metadata(property)
                .map(|m| m.unset_value().clone()),
        }
    }

    /// Returns the number of registered properties.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns `true` if no properties are registered.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Returns the name of a property.
    #[must_use]
    pub fn name(&self, id: PropertyId) -> Option<&'static str> {
        self.get(id).map(|r| r.name)
    }

    /// Returns the registration for a property.
    #[must_use]
    pub fn get(&self, id: PropertyId) -> Option<&PropertyRegistration> {
        self.properties.get(id.index() as usize)
    }

    /// Returns the metadata for a styled property.
    ///
    /// Returns `None` if the property is unknown, direct, or of another type.
    #[must_use]
    pub fn metadata<T: PropertyValue>(
        &self,
        property: Property<T>,
    ) -> Option<&PropertyMetadata<T>> {
        self.get(property.id())
            .and_then(|r| r.metadata.as_any().downcast_ref())
    }

    /// Returns the metadata for a direct property.
    #[must_use]
    pub fn direct_metadata<T: PropertyValue>(
        &self,
        property: Property<T>,
    ) -> Option<&DirectMetadata<T>> {
        self.get(property.id())
            .and_then(|r| r.metadata.as_any().downcast_ref())
    }

    /// Returns an iterator over all registered properties.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &PropertyRegistration)> {
        self.properties.iter().enumerate().map(|(i, r)| {
            #[expect(clippy::cast_possible_truncation, reason = "index < len < u16::MAX")]
            (PropertyId::new(i as u16), r)
        })
    }

    /// Checks that `property` is known with value type `T` and usable on `ty`.
    pub(crate) fn validate<T: PropertyValue>(
        &self,
        property: Property<T>,
        ty: ObjectType,
    ) -> Result<&PropertyRegistration, PropertyError> {
        let unregistered = || PropertyError::UnregisteredProperty {
            property: property.id(),
            object_type: self.type_name(ty),
        };
        let registration = self.get(property.id()).ok_or_else(unregistered)?;
        if registration.type_id != TypeId::of::<T>() {
            return Err(unregistered());
        }
        if registration.kind == PropertyKind::Direct && !self.is_registered(ty, property.id()) {
            return Err(unregistered());
        }
        Ok(registration)
    }
}

impl core::fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("types", &self.types.len())
            .field(
                "properties",
                &self.properties.iter().map(|r| r.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Type-erased metadata for heterogeneous storage.
///
/// Besides downcasting, it carries the few operations the object needs to run
/// over every inherited property without knowing value types.
trait ErasedMetadata: Any {
    fn as_any(&self) -> &dyn Any;
    fn inherits(&self) -> bool;
    fn read_only(&self) -> bool;
    fn inheritance_parent_changed(
        &self,
        property: PropertyId,
        object: &DependencyObject,
        old_parent: Option<&DependencyObject>,
    );
}

impl<T: PropertyValue> ErasedMetadata for PropertyMetadata<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn inherits(&self) -> bool {
        Self::inherits(self)
    }

    fn read_only(&self) -> bool {
        false
    }

    fn inheritance_parent_changed(
        &self,
        property: PropertyId,
        object: &DependencyObject,
        old_parent: Option<&DependencyObject>,
    ) {
        object.inheritance_parent_changed(Property::<T>::from_id(property), old_parent);
    }
}

impl<T: PropertyValue> ErasedMetadata for DirectMetadata<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn inherits(&self) -> bool {
        false
    }

    fn read_only(&self) -> bool {
        Self::read_only(self)
    }

    fn inheritance_parent_changed(
        &self,
        _property: PropertyId,
        _object: &DependencyObject,
        _old_parent: Option<&DependencyObject>,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{DirectMetadataBuilder, PropertyMetadataBuilder};
    use alloc::{format, vec};

    fn hierarchy() -> (PropertyRegistry, ObjectType, ObjectType, ObjectType) {
        let mut registry = PropertyRegistry::new();
        let control = registry.register_type("Control", None).unwrap();
        let button = registry.register_type("Button", Some(control)).unwrap();
        let border = registry.register_type("Border", Some(control)).unwrap();
        (registry, control, button, border)
    }

    #[test]
    fn registry_new() {
        let registry = PropertyRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn duplicate_name_on_same_type_is_rejected() {
        let (mut registry, control, button, _) = hierarchy();
        registry
            .register(control, "Width", PropertyMetadata::new(0.0_f64))
            .unwrap();

        let err = registry
            .register(control, "Width", PropertyMetadata::new(0.0_f64))
            .unwrap_err();
        assert_eq!(
            err,
            PropertyError::DuplicateRegistration {
                name: "Width",
                owner: "Control"
            }
        );

        // The same name on a derived type is a separate declaration.
        assert!(
            registry
                .register(button, "Width", PropertyMetadata::new(0.0_f64))
                .is_ok()
        );
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let (mut registry, ..) = hierarchy();
        assert!(registry.register_type("Control", None).is_err());
    }

    #[test]
    fn lookup_prefers_most_derived() {
        let (mut registry, control, button, border) = hierarchy();
        let base = registry
            .register(control, "Tag", PropertyMetadata::new(0_i32))
            .unwrap();
        let derived = registry
            .register(button, "Tag", PropertyMetadata::new(1_i32))
            .unwrap();

        assert_eq!(registry.lookup(button, "Tag"), Some(derived.id()));
        assert_eq!(registry.lookup(border, "Tag"), Some(base.id()));
        assert_eq!(registry.lookup(control, "Missing"), None);
    }

    #[test]
    fn registered_inherited_follows_ancestry_and_attachment() {
        let (mut registry, control, button, border) = hierarchy();
        let font_size = registry
            .register(
                control,
                "FontSize",
                PropertyMetadataBuilder::new(12.0_f64).inherits(true).build(),
            )
            .unwrap();
        let button_only = registry
            .register(
                button,
                "IsDefault",
                PropertyMetadataBuilder::new(false).inherits(true).build(),
            )
            .unwrap();
        let attached = registry
            .register_attached(
                border,
                "Row",
                PropertyMetadataBuilder::new(0_u32).inherits(true).build(),
            )
            .unwrap();
        registry
            .register(control, "Width", PropertyMetadata::new(0.0_f64))
            .unwrap();

        assert_eq!(
            registry.registered_inherited(button),
            vec![font_size.id(), button_only.id(), attached.id()]
        );
        assert_eq!(
            registry.registered_inherited(border),
            vec![font_size.id(), attached.id()]
        );
    }

    #[test]
    fn add_owner_extends_visibility() {
        let (mut registry, control, button, _) = hierarchy();
        let other = registry.register_type("Glyph", None).unwrap();
        let text = registry
            .register_direct(button, "Text", DirectMetadataBuilder::new(0_u8).build())
            .unwrap();

        assert!(!registry.is_registered(other, text.id()));
        assert!(!registry.is_registered(control, text.id()));
        registry.add_owner(text.id(), other).unwrap();
        assert!(registry.is_registered(other, text.id()));
        assert_eq!(registry.lookup(other, "Text"), Some(text.id()));
        assert!(registry.add_owner(text.id(), other).is_err());
    }

    #[test]
    fn default_overrides_walk_ancestry() {
        let (mut registry, control, button, border) = hierarchy();
        let padding = registry
            .register(control, "Padding", PropertyMetadata::new(0.0_f64))
            .unwrap();
        registry.override_default(padding, button, 4.0).unwrap();

        assert_eq!(registry.default_value(padding, control), Some(0.0));
        assert_eq!(registry.default_value(padding, button), Some(4.0));
        assert_eq!(registry.default_value(padding, border), Some(0.0));

        registry.override_default(padding, button, 6.0).unwrap();
        assert_eq!(registry.default_value(padding, button), Some(6.0));
    }

    #[test]
    fn validate_checks_type_and_direct_visibility() {
        let (mut registry, control, button, border) = hierarchy();
        let width = registry
            .register(button, "Width", PropertyMetadata::new(0.0_f64))
            .unwrap();
        let content = registry
            .register_direct(button, "Content", DirectMetadataBuilder::new(0_i32).build())
            .unwrap();

        // Styled properties are not restricted to their owner.
        assert!(registry.validate(width, border).is_ok());
        assert!(registry.validate(content, button).is_ok());
        assert!(registry.validate(content, control).is_err());

        let forged: Property<i32> = Property::from_id(width.id());
        assert!(registry.validate(forged, button).is_err());
    }

    #[test]
    fn registry_debug() {
        let (mut registry, control, ..) = hierarchy();
        registry
            .register(control, "Width", PropertyMetadata::new(0.0_f64))
            .unwrap();

        let debug = format!("{registry:?}");
        assert!(debug.contains("PropertyRegistry"));
        assert!(debug.contains("Width"));
    }
}
