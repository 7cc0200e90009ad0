// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Object: dependency objects with prioritized values.
//!
//! This crate resolves the value of each property on each object from many
//! competing sources (animations, local values, style triggers, style
//! setters, templated-parent bindings, inheritance and defaults) and tells
//! listeners when the result changes, without surprising them when a
//! listener changes the value again.
//!
//! ## Core Concepts
//!
//! ### Registry
//!
//! A [`PropertyRegistry`] catalogues object types and properties. It is built
//! once and then shared by every object through an `Rc`.
//!
//! - **Styled** properties compete by [`BindingPriority`], may inherit from
//!   the inheritance parent and may be coerced.
//! - **Direct** properties keep one backing value, written locally or by a
//!   single binding.
//! - **Attached** properties are styled properties usable on any type.
//!
//! ### Resolution
//!
//! Every source of a styled property sits at a priority. The most precedent
//! present value wins; among equal priorities the newest source wins, except
//! that the local value always wins its own tier. Beneath the winning value
//! the object also tracks the *non-animated* value, the winner once
//! animations are ignored.
//!
//! ### Notification
//!
//! Changes flow, in order, to the property's class handler, to inheriting
//! children (depth-first), and then to listeners. A change raised while
//! listeners are still being notified is queued behind the current one, and
//! the record in hand is flagged [outdated](PropertyChange::is_outdated).
//!
//! ## Quick Start
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use understory_object::{
//!     BindingPriority, DependencyObject, PropertyMetadataBuilder, PropertyRegistry, ValueSubject,
//! };
//!
//! let mut registry = PropertyRegistry::new();
//! let control = registry.register_type("Control", None).unwrap();
//! let foreground = registry
//!     .register(
//!         control,
//!         "Foreground",
//!         PropertyMetadataBuilder::new("black").inherits(true).build(),
//!     )
//!     .unwrap();
//! let registry = Rc::new(registry);
//!
//! let panel = DependencyObject::new(Rc::clone(&registry), control);
//! let button = DependencyObject::new(Rc::clone(&registry), control);
//! button.set_inheritance_parent(Some(&panel)).unwrap();
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! let _subscription = button
//!     .listen(foreground, true)
//!     .unwrap()
//!     .subscribe(move |change| sink.borrow_mut().push(*change.value().unwrap()));
//!
//! // Values flow down the inheritance tree...
//! panel
//!     .set_value(foreground, "white", BindingPriority::LocalValue)
//!     .unwrap();
//!
//! // ...and bindings compete with everything else by priority.
//! let theme = ValueSubject::with_value("red");
//! let binding = button
//!     .bind(foreground, &theme, BindingPriority::Style)
//!     .unwrap();
//! theme.next("blue");
//! binding.dispose();
//!
//! assert_eq!(*seen.borrow(), ["black", "white", "red", "blue", "white"]);
//! ```
//!
//! ## Threading
//!
//! Objects are single-threaded. With the `std` feature (on by default),
//! [`Dispatcher`] lets other threads post values that the UI thread applies
//! when it calls [`Dispatcher::run_pending`].
//!
//! ## Logging
//!
//! Binding errors are reported through [`tracing`] at `warn` level under the
//! `understory_object::binding` target; storage and relinking details are
//! traced at `trace` level. The crate installs no subscriber.
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. Only [`Dispatcher`] needs `std`.

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod change;
mod channel;
#[cfg(feature = "std")]
mod dispatch;
mod entry;
mod error;
mod handle;
mod id;
mod metadata;
mod object;
mod observable;
mod priority;
mod priority_value;
mod registry;
mod source;
mod store;
mod value;

pub use change::{AnyPropertyChange, PropertyChange};
#[cfg(feature = "std")]
pub use dispatch::{Dispatcher, ThreadedSender};
pub use error::PropertyError;
pub use handle::ValueHandle;
pub use id::{ObjectType, Property, PropertyId};
pub use metadata::{
    CoerceValueCallback, DirectMetadata, DirectMetadataBuilder, PropertyChangedCallback,
    PropertyMetadata, PropertyMetadataBuilder,
};
pub use object::{DependencyObject, WeakDependencyObject};
pub use observable::PropertyObservable;
pub use priority::BindingPriority;
pub use registry::{PropertyKind, PropertyRegistration, PropertyRegistry};
pub use source::{
    SequenceSource, SourceEvent, SourceObserver, Subscription, ValueSource, ValueSubject,
};
pub use value::{BindingError, BindingValue, ErasedValue, PropertyValue};
