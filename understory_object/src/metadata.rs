// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property metadata definitions.
//!
//! Styled properties are described by [`PropertyMetadata`], direct
//! properties by [`DirectMetadata`]. Both come with builders.

use alloc::boxed::Box;
use core::fmt;

use crate::change::PropertyChange;
use crate::object::DependencyObject;
use crate::value::PropertyValue;

/// Class-level handler invoked whenever a property's effective value changes
/// on any object.
///
/// Runs before per-object listeners see the change.
pub type PropertyChangedCallback<T> = Box<dyn Fn(&PropertyChange<T>)>;

/// Callback for coercing a resolved value.
///
/// Receives the owning object (so it can consult sibling properties) and the
/// value picked by priority resolution, and returns the value to expose.
pub type CoerceValueCallback<T> = Box<dyn Fn(&DependencyObject, T) -> T>;

/// Metadata for a styled property.
///
/// # Example
///
/// ```rust
/// use understory_object::PropertyMetadataBuilder;
///
/// let metadata = PropertyMetadataBuilder::new(12.0_f64)
///     .inherits(true)
///     .coerce(|_, v: f64| v.max(1.0))
///     .build();
///
/// assert_eq!(metadata.default_value(), &12.0);
/// assert!(metadata.inherits());
/// assert!(metadata.has_coerce_callback());
/// ```
pub struct PropertyMetadata<T: PropertyValue> {
    default_value: T,
    inherits: bool,
    changed_callback: Option<PropertyChangedCallback<T>>,
    coerce_callback: Option<CoerceValueCallback<T>>,
}

impl<T: PropertyValue> PropertyMetadata<T> {
    /// Creates metadata with the given default value and nothing else.
    #[must_use]
    pub fn new(default_value: T) -> Self {
        PropertyMetadataBuilder::new(default_value).build()
    }

    /// Returns the default value registered with the property.
    ///
    /// Per-type overrides are applied by
    /// [`PropertyRegistry::default_value`](crate::PropertyRegistry::default_value).
    #[must_use]
    #[inline]
    pub fn default_value(&self) -> &T {
        &self.default_value
    }

    /// Returns whether this property inherits from the inheritance parent.
    #[must_use]
    #[inline]
    pub fn inherits(&self) -> bool {
        self.inherits
    }

    /// Invokes the class-level changed handler if one is set.
    #[inline]
    pub fn on_changed(&self, change: &PropertyChange<T>) {
        if let Some(callback) = &self.changed_callback {
            callback(change);
        }
    }

    /// Coerces a value using the coerce callback if one is set.
    #[inline]
    pub fn coerce(&self, object: &DependencyObject, value: T) -> T {
        if let Some(callback) = &self.coerce_callback {
            callback(object, value)
        } else {
            value
        }
    }

    /// Returns whether a changed handler is set.
    #[must_use]
    #[inline]
    pub fn has_changed_callback(&self) -> bool {
        self.changed_callback.is_some()
    }

    /// Returns whether a coerce callback is set.
    #[must_use]
    #[inline]
    pub fn has_coerce_callback(&self) -> bool {
        self.coerce_callback.is_some()
    }
}

impl<T: PropertyValue> fmt::Debug for PropertyMetadata<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMetadata")
            .field("default_value", &self.default_value)
            .field("inherits", &self.inherits)
            .field("has_changed_callback", &self.changed_callback.is_some())
            .field("has_coerce_callback", &self.coerce_callback.is_some())
            .finish()
    }
}

/// Builder for [`PropertyMetadata`].
pub struct PropertyMetadataBuilder<T: PropertyValue> {
    default_value: T,
    inherits: bool,
    changed_callback: Option<PropertyChangedCallback<T>>,
    coerce_callback: Option<CoerceValueCallback<T>>,
}

impl<T: PropertyValue> fmt::Debug for PropertyMetadataBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMetadataBuilder")
            .field("default_value", &self.default_value)
            .field("inherits", &self.inherits)
            .field("has_changed_callback", &self.changed_callback.is_some())
            .field("has_coerce_callback", &self.coerce_callback.is_some())
            .finish()
    }
}

impl<T: PropertyValue> PropertyMetadataBuilder<T> {
    /// Creates a new builder with the given default value.
    #[must_use]
    pub fn new(default_value: T) -> Self {
        Self {
            default_value,
            inherits: false,
            changed_callback: None,
            coerce_callback: None,
        }
    }

    /// Sets whether this property inherits from the inheritance parent.
    ///
    /// An object with no value source of its own for an inheriting property
    /// reports the nearest ancestor's value instead of the default.
    #[must_use]
    pub fn inherits(mut self, inherits: bool) -> Self {
        self.inherits = inherits;
        self
    }

    /// Sets a class-level handler run on every effective value change.
    #[must_use]
    pub fn on_changed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PropertyChange<T>) + 'static,
    {
        self.changed_callback = Some(Box::new(callback));
        self
    }

    /// Sets a callback to coerce resolved values.
    ///
    /// Properties with coercion always keep a full priority resolver so that
    /// [`DependencyObject::coerce_value`] can re-run it.
    #[must_use]
    pub fn coerce<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DependencyObject, T) -> T + 'static,
    {
        self.coerce_callback = Some(Box::new(callback));
        self
    }

    /// Builds the [`PropertyMetadata`].
    #[must_use]
    pub fn build(self) -> PropertyMetadata<T> {
        PropertyMetadata {
            default_value: self.default_value,
            inherits: self.inherits,
            changed_callback: self.changed_callback,
            coerce_callback: self.coerce_callback,
        }
    }
}

/// Metadata for a direct property.
///
/// Direct properties skip priority resolution entirely: the object keeps one
/// backing value, written by local sets or by at most one binding.
#[derive(Debug)]
pub struct DirectMetadata<T: PropertyValue> {
    unset_value: T,
    read_only: bool,
}

impl<T: PropertyValue> DirectMetadata<T> {
    /// Returns the value reported when nothing has been written, and the value
    /// restored by clearing.
    #[must_use]
    #[inline]
    pub fn unset_value(&self) -> &T {
        &self.unset_value
    }

    /// Returns whether only the owning code may write this property.
    #[must_use]
    #[inline]
    pub fn read_only(&self) -> bool {
        self.read_only
    }
}

/// Builder for [`DirectMetadata`].
#[derive(Debug)]
pub struct DirectMetadataBuilder<T: PropertyValue> {
    unset_value: T,
    read_only: bool,
}

impl<T: PropertyValue> DirectMetadataBuilder<T> {
    /// Creates a builder with the given unset value.
    #[must_use]
    pub fn new(unset_value: T) -> Self {
        Self {
            unset_value,
            read_only: false,
        }
    }

    /// Marks the property read-only.
    ///
    /// Public writes then fail with
    /// [`PropertyError::NotSupported`](crate::PropertyError::NotSupported);
    /// owners write through [`DependencyObject::set_and_raise`].
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Builds the [`DirectMetadata`].
    #[must_use]
    pub fn build(self) -> DirectMetadata<T> {
        DirectMetadata {
            unset_value: self.unset_value,
            read_only: self.read_only,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn metadata_defaults() {
        let metadata = PropertyMetadata::new(42_i32);
        assert_eq!(metadata.default_value(), &42);
        assert!(!metadata.inherits());
        assert!(!metadata.has_changed_callback());
        assert!(!metadata.has_coerce_callback());
    }

    #[test]
    fn metadata_debug_hides_callbacks() {
        let metadata = PropertyMetadataBuilder::new(42_i32)
            .inherits(true)
            .on_changed(|_| {})
            .build();

        let debug = format!("{metadata:?}");
        assert!(debug.contains("PropertyMetadata"));
        assert!(debug.contains("has_changed_callback: true"));
    }

    #[test]
    fn direct_metadata_builder() {
        let metadata = DirectMetadataBuilder::new(0_u32).read_only(true).build();
        assert_eq!(metadata.unset_value(), &0);
        assert!(metadata.read_only());
    }
}
