// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identifiers for properties and object types.
//!
//! [`PropertyId`] is the runtime identity of a registered property,
//! [`Property<T>`] is the typed key callers hold, and [`ObjectType`] names a
//! registered kind of [`DependencyObject`](crate::DependencyObject).

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

/// A runtime property identifier.
///
/// This is a lightweight handle (u16) issued by a
/// [`PropertyRegistry`](crate::PropertyRegistry). It stays valid for as long
/// as the registry that issued it.
///
/// # Example
///
/// ```rust
/// use understory_object::PropertyId;
///
/// let id = PropertyId::new(42);
/// assert_eq!(id.index(), 42);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(u16);

impl PropertyId {
    /// Creates a new property ID from the given index.
    ///
    /// This is typically called by the registry rather than directly.
    #[must_use]
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the underlying index of this property ID.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyId").field(&self.0).finish()
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyId({})", self.0)
    }
}

/// A registered kind of object.
///
/// Object types form a single-inheritance hierarchy inside a registry.
/// Property lookups, per-type defaults and direct-property validation all
/// walk from an object's type towards its root.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectType(u16);

impl ObjectType {
    /// Creates an object type from its registry index.
    #[must_use]
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the registry index of this type.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectType").field(&self.0).finish()
    }
}

/// A type-safe property key.
///
/// Wraps a [`PropertyId`] with the property's value type so that reads and
/// writes are checked at compile time. The registry additionally records the
/// value type, so a key forged with the wrong `T` is rejected at runtime with
/// [`PropertyError::UnregisteredProperty`](crate::PropertyError::UnregisteredProperty).
///
/// `Property<T>` is the same size as `PropertyId`.
pub struct Property<T> {
    id: PropertyId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Property<T> {
    /// Creates a typed property from a property ID.
    #[must_use]
    #[inline]
    pub const fn from_id(id: PropertyId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the underlying property ID.
    #[must_use]
    #[inline]
    pub const fn id(self) -> PropertyId {
        self.id
    }
}

// Manual impls so that `T` needs no bounds.

impl<T> Copy for Property<T> {}

impl<T> Clone for Property<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Property<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Property<T> {}

impl<T> Hash for Property<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("id", &self.id)
            .field("type", &core::any::type_name::<T>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::String;

    #[test]
    fn property_id_formatting() {
        let id = PropertyId::new(7);
        assert_eq!(format!("{id:?}"), "PropertyId(7)");
        assert_eq!(format!("{id}"), "PropertyId(7)");
    }

    #[test]
    fn typed_keys_share_identity() {
        let id = PropertyId::new(3);
        let as_text: Property<String> = Property::from_id(id);
        let as_number: Property<i32> = Property::from_id(id);
        assert_eq!(as_text.id(), as_number.id());
    }

    #[test]
    fn keys_stay_compact() {
        use core::mem::size_of;
        assert_eq!(size_of::<Property<String>>(), size_of::<PropertyId>());
        assert_eq!(size_of::<ObjectType>(), 2);
    }
}
