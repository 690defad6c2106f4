//! Events, the global bus and the per-owner distributor.
//!
//! An [`Event`] is either one of the framework's own [`FrameworkEvent`]s or a
//! custom payload tagged with a plugin-declared [`EventKind`]. Events are
//! cheap to clone; custom payloads are shared behind an `Arc`.
//!
//! # Example
//!
//! ```
//! use snowx_runtime::event::{Event, Output};
//! use snowx_runtime::event::kind::{BASE_EVENT, EventKind};
//!
//! static PING: EventKind = EventKind::new("Ping", &BASE_EVENT);
//!
//! let event = Event::custom(&PING, 7_u32);
//! assert!(event.is_a(&BASE_EVENT));
//! assert_eq!(event.payload::<u32>(), Some(&7));
//!
//! let output = Output::from(vec![event.clone(), event]);
//! assert_eq!(output.into_events().len(), 2);
//! ```

use core::any::Any;
use core::fmt;
use std::sync::Arc;

pub mod bus;
pub mod distributor;
pub mod framework;
pub mod kind;

pub use bus::EventBus;
pub use distributor::{Distributor, EventQueue};
pub use framework::FrameworkEvent;
pub use kind::{BASE_EVENT, EventKind};

/// A routed event value.
#[derive(Clone)]
pub enum Event {
    /// Built-in control or result event.
    Framework(FrameworkEvent),
    /// Plugin-defined event.
    Custom {
        /// Kind used for routing.
        kind: &'static EventKind,
        /// Shared payload.
        data: Arc<dyn Any + Send + Sync>,
    },
}

impl Event {
    /// Creates a custom event carrying `data`.
    pub fn custom<T: Any + Send + Sync>(kind: &'static EventKind, data: T) -> Self {
        Self::Custom {
            kind,
            data: Arc::new(data),
        }
    }

    /// Routing kind.
    #[must_use]
    pub fn kind(&self) -> &'static EventKind {
        match self {
            Self::Framework(event) => event.kind(),
            Self::Custom { kind, .. } => *kind,
        }
    }

    /// Returns true if this event's kind is `kind` or one of its subtypes.
    #[must_use]
    pub fn is_a(&self, kind: &EventKind) -> bool {
        self.kind().is_a(kind)
    }

    /// Custom payload as `T`, if this is a custom event of that type.
    #[must_use]
    pub fn payload<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Custom { data, .. } => data.downcast_ref::<T>(),
            Self::Framework(_) => None,
        }
    }

    /// Framework event, if this is one.
    #[must_use]
    pub fn as_framework(&self) -> Option<&FrameworkEvent> {
        match self {
            Self::Framework(event) => Some(event),
            Self::Custom { .. } => None,
        }
    }
}

impl From<FrameworkEvent> for Event {
    fn from(event: FrameworkEvent) -> Self {
        Self::Framework(event)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framework(event) => f.debug_tuple("Framework").field(event).finish(),
            Self::Custom { kind, .. } => f.debug_struct("Custom").field("kind", kind).finish(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

/// What a callback hands back to the bus: nothing, one event or several.
#[derive(Debug, Clone, Default)]
pub enum Output {
    /// Nothing to publish.
    #[default]
    None,
    /// One event.
    Event(Event),
    /// Several events, each published independently.
    Events(Vec<Event>),
}

impl Output {
    /// Returns true if there is nothing to publish.
    #[must_use]
    pub fn is_none(&self) -> bool {
        match self {
            Self::None => true,
            Self::Event(_) => false,
            Self::Events(events) => events.is_empty(),
        }
    }

    /// Flattens into the events to publish.
    #[must_use]
    pub fn into_events(self) -> Vec<Event> {
        match self {
            Self::None => Vec::new(),
            Self::Event(event) => vec![event],
            Self::Events(events) => events,
        }
    }
}

impl From<()> for Output {
    fn from((): ()) -> Self {
        Self::None
    }
}

impl From<Event> for Output {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}

impl From<FrameworkEvent> for Output {
    fn from(event: FrameworkEvent) -> Self {
        Self::Event(event.into())
    }
}

impl From<Option<Event>> for Output {
    fn from(event: Option<Event>) -> Self {
        event.map_or(Self::None, Self::Event)
    }
}

impl From<Vec<Event>> for Output {
    fn from(events: Vec<Event>) -> Self {
        Self::Events(events)
    }
}
