//! Event kinds and their "is-a" relation.
//!
//! Every event carries a `&'static EventKind`. Kinds form a tree through an
//! explicit parent link, so subtype routing is a walk up that chain instead
//! of a runtime type check.
//!
//! # Example
//!
//! ```
//! use snowx_runtime::event::kind::{BASE_EVENT, EventKind};
//!
//! static MESSAGE: EventKind = EventKind::new("Message", &BASE_EVENT);
//! static GROUP_MESSAGE: EventKind = EventKind::new("GroupMessage", &MESSAGE);
//!
//! assert!(GROUP_MESSAGE.is_a(&MESSAGE));
//! assert!(GROUP_MESSAGE.is_a(&BASE_EVENT));
//! assert!(!MESSAGE.is_a(&GROUP_MESSAGE));
//! ```

use core::fmt;
use core::hash::{Hash, Hasher};

/// A node in the event kind tree.
///
/// Kinds are compared by name, so names must be unique per process.
pub struct EventKind {
    name: &'static str,
    parent: Option<&'static EventKind>,
}

/// Root of every event kind.
pub static BASE_EVENT: EventKind = EventKind::root("BaseEvent");

impl EventKind {
    /// Creates a kind without a parent.
    #[must_use]
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// Creates a kind that is a subtype of `parent`.
    #[must_use]
    pub const fn new(name: &'static str, parent: &'static EventKind) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    /// Kind name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Direct supertype, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&'static EventKind> {
        self.parent
    }

    /// Returns true if `self` is `other` or one of its subtypes.
    #[must_use]
    pub fn is_a(&self, other: &EventKind) -> bool {
        if self == other {
            return true;
        }
        let mut current = self.parent;
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent;
        }
        false
    }

    /// Returns true if `self` is a subtype of any kind in `kinds`.
    #[must_use]
    pub fn is_any_of(&self, kinds: &[&'static EventKind]) -> bool {
        kinds.iter().any(|kind| self.is_a(kind))
    }
}

impl PartialEq for EventKind {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EventKind {}

impl Hash for EventKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
