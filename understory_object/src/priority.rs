// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Value precedence tiers.

/// The tier a value source competes at.
///
/// Variants are declared from highest to lowest precedence, so the derived
/// ordering matches resolution order: a *smaller* priority wins.
///
/// ```rust
/// use understory_object::BindingPriority;
///
/// assert!(BindingPriority::Animation < BindingPriority::LocalValue);
/// assert!(BindingPriority::Style < BindingPriority::Inherited);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BindingPriority {
    /// Values produced by a running animation.
    Animation,
    /// A value set directly on the object.
    LocalValue,
    /// A value applied by an active style trigger.
    StyleTrigger,
    /// A value applied by a style setter.
    Style,
    /// A value bound from the templated parent.
    TemplatedParent,
    /// A value taken from the inheritance parent.
    ///
    /// Only reported by change notifications; sources cannot be applied here.
    Inherited,
    /// No source provides a value; the default is in effect.
    Unset,
}

impl BindingPriority {
    /// Returns `true` for tiers that shadow the local value (animations).
    #[must_use]
    #[inline]
    pub const fn is_animation(self) -> bool {
        matches!(self, Self::Animation)
    }

    /// Returns `true` if a value source may be applied at this tier.
    #[must_use]
    #[inline]
    pub const fn accepts_sources(self) -> bool {
        !matches!(self, Self::Inherited | Self::Unset)
    }
}
