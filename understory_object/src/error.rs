// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structural errors returned by registry and object operations.

use crate::id::PropertyId;

/// Errors raised synchronously by registration and by mutating object calls.
///
/// Faults reported by value sources are not structural; they travel as
/// [`BindingValue::Error`](crate::BindingValue::Error) instead.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    /// The property is unknown, registered with a different value type, or
    /// (for direct properties) not visible on the object's type.
    #[error("property {property} is not registered for object type '{object_type}'")]
    UnregisteredProperty {
        /// The offending property.
        property: PropertyId,
        /// Name of the object type the property was used on.
        object_type: &'static str,
    },
    /// A property or object type with this name already exists on the
    /// declaring type.
    #[error("'{name}' is already registered on '{owner}'")]
    DuplicateRegistration {
        /// The duplicated name.
        name: &'static str,
        /// The declaring type.
        owner: &'static str,
    },
    /// The priority/value combination is not valid for this property.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),
    /// Linking the inheritance parent would make an object its own ancestor.
    #[error("inheritance parent would create a cycle")]
    InheritanceCycle,
}
