// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property value types.
//!
//! - [`PropertyValue`]: the bound every property value type satisfies.
//! - [`BindingValue`]: an item produced by a value source, which may be a
//!   value, a request to unset, a no-op, or an error.
//! - [`ErasedValue`]: a type-erased value for heterogeneous storage and the
//!   object-wide change stream.

use alloc::borrow::Cow;
use alloc::boxed::Box;
use core::any::{Any, TypeId};
use core::fmt;

/// Types that can be stored in a property.
///
/// Equality decides whether a recomputed value is a change; `Debug` is used
/// when values are logged.
pub trait PropertyValue: Clone + PartialEq + fmt::Debug + 'static {}

impl<T: Clone + PartialEq + fmt::Debug + 'static> PropertyValue for T {}

/// A recoverable fault reported by a value source.
///
/// Binding errors are data, not control flow: they travel inside
/// [`BindingValue::Error`], get logged, and resolution carries on.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BindingError {
    message: Cow<'static, str>,
}

impl BindingError {
    /// Creates a binding error with the given message.
    #[must_use]
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An item produced by a value source.
#[derive(Clone, Debug, PartialEq)]
pub enum BindingValue<T> {
    /// A concrete value.
    Value(T),
    /// The source no longer provides a value; lower tiers show through.
    Unset,
    /// The source has nothing to say; the item is ignored.
    DoNothing,
    /// The source failed. With a fallback, the fallback is used as the value;
    /// without one, the previous value is kept.
    Error {
        /// What went wrong.
        error: BindingError,
        /// Value to use in place of the failed one.
        fallback: Option<T>,
    },
}

impl<T> BindingValue<T> {
    /// Creates an error item without a fallback.
    #[must_use]
    pub fn error(error: BindingError) -> Self {
        Self::Error {
            error,
            fallback: None,
        }
    }

    /// Creates an error item carrying a fallback value.
    #[must_use]
    pub fn error_with_fallback(error: BindingError, fallback: T) -> Self {
        Self::Error {
            error,
            fallback: Some(fallback),
        }
    }

    /// Returns the value this item resolves to, if any.
    ///
    /// For errors this is the fallback.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value)
            | Self::Error {
                fallback: Some(value),
                ..
            } => Some(value),
            _ => None,
        }
    }

    /// Consumes the item, returning the value it resolves to.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(value)
            | Self::Error {
                fallback: Some(value),
                ..
            } => Some(value),
            _ => None,
        }
    }

    /// Returns the error carried by this item, if any.
    #[must_use]
    pub fn binding_error(&self) -> Option<&BindingError> {
        match self {
            Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Returns `true` if this item carries a value or fallback.
    #[must_use]
    pub fn has_value(&self) -> bool {
        self.value().is_some()
    }
}

impl<T> From<T> for BindingValue<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

/// A type-erased property value.
///
/// This wraps any [`PropertyValue`], keeping enough of its behaviour
/// (clone, equality, debug formatting) to store values of different types
/// side by side.
///
/// # Example
///
/// ```rust
/// use understory_object::ErasedValue;
///
/// let value = ErasedValue::new(42_i32);
/// assert!(value.is::<i32>());
/// assert_eq!(value.downcast_ref::<i32>(), Some(&42));
/// assert_eq!(value, ErasedValue::new(42_i32));
/// assert_ne!(value, ErasedValue::new(42_i64));
/// ```
pub struct ErasedValue {
    inner: Box<dyn ErasedValueTrait>,
    type_id: TypeId,
}

impl ErasedValue {
    /// Creates a new erased value from a concrete value.
    #[must_use]
    pub fn new<T: PropertyValue>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            inner: Box::new(value),
        }
    }

    /// Returns the [`TypeId`] of the contained value.
    #[must_use]
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns `true` if the contained value is of type `T`.
    #[must_use]
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Attempts to downcast to a reference of type `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        if self.is::<T>() {
            self.inner.as_any().downcast_ref()
        } else {
            None
        }
    }

    /// Attempts to downcast to a mutable reference of type `T`.
    #[must_use]
    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        if self.is::<T>() {
            self.inner.as_any_mut().downcast_mut()
        } else {
            None
        }
    }
}

impl Clone for ErasedValue {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_boxed(),
            type_id: self.type_id,
        }
    }
}

impl PartialEq for ErasedValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.inner.eq_erased(other.inner.as_any())
    }
}

impl fmt::Debug for ErasedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt_erased(f)
    }
}

trait ErasedValueTrait: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clone_boxed(&self) -> Box<dyn ErasedValueTrait>;
    fn eq_erased(&self, other: &dyn Any) -> bool;
    fn fmt_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T: PropertyValue> ErasedValueTrait for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_boxed(&self) -> Box<dyn ErasedValueTrait> {
        Box::new(self.clone())
    }

    fn eq_erased(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }

    fn fmt_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
