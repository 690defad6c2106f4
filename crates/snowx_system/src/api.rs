//! Capability registry shared between plugins.
//!
//! Plugins expose capabilities to each other by inserting typed API objects
//! into a [`CapabilityRegistry`] under their own namespace (the plugin id).
//! Consumers look capabilities up by namespace and type through the context
//! the host hands them; nothing is patched into a global module table.
//!
//! # API vs Event
//!
//! | Aspect | API | Event |
//! |--------|-----|-------|
//! | **Purpose** | Direct calls into another plugin | Fire-and-forget notifications |
//! | **Lookup** | `registry.get::<A>("owner")` | Subscription by event kind |
//! | **Lifetime** | While the providing plugin is mounted | One delivery |
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use parking_lot::RwLock;
//! use snowx_system::api::{API, CapabilityRegistry};
//!
//! #[derive(Default)]
//! struct Counter {
//!     hits: RwLock<u64>,
//! }
//!
//! impl API for Counter {}
//!
//! impl Counter {
//!     fn hit(&self) -> u64 {
//!         let mut hits = self.hits.write();
//!         *hits += 1;
//!         *hits
//!     }
//! }
//!
//! let registry = CapabilityRegistry::new();
//! registry.insert("event_tool", Counter::default());
//!
//! let counter: Arc<Counter> = registry.get("event_tool").unwrap();
//! assert_eq!(counter.hit(), 1);
//! ```
//!
//! # Interior Mutability Pattern
//!
//! APIs are shared as `Arc<A>`, so any state they mutate after insertion
//! sits behind a lock inside the API type.

use core::any::{Any, TypeId};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

/// Marker trait for capability APIs.
///
/// ```
/// use snowx_system::api::API;
///
/// pub struct DatabaseUrl(pub String);
///
/// impl API for DatabaseUrl {}
/// ```
pub trait API: Send + Sync + 'static {}

/// Type-erased API for dynamic storage.
type BoxedAPI = Arc<dyn Any + Send + Sync>;

/// Namespaced map from `(namespace, API type)` to a shared API object.
#[derive(Default)]
pub struct CapabilityRegistry {
    namespaces: RwLock<HashMap<String, HashMap<TypeId, BoxedAPI>>>,
}

impl core::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("namespaces", &self.namespaces())
            .finish()
    }
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an API under `namespace`.
    ///
    /// If an API of this type already exists in the namespace, it is replaced
    /// and the old value is returned.
    pub fn insert<A: API>(&self, namespace: &str, api: A) -> Option<Arc<A>> {
        let boxed: BoxedAPI = Arc::new(api);
        self.namespaces
            .write()
            .entry_ref(namespace)
            .or_default()
            .insert(TypeId::of::<A>(), boxed)
            .and_then(|old| old.downcast::<A>().ok())
    }

    /// Gets the API of type `A` published under `namespace`.
    #[must_use]
    pub fn get<A: API>(&self, namespace: &str) -> Option<Arc<A>> {
        self.namespaces
            .read()
            .get(namespace)?
            .get(&TypeId::of::<A>())
            .cloned()
            .and_then(|boxed| boxed.downcast::<A>().ok())
    }

    /// Returns true if `namespace` publishes an API of type `A`.
    #[must_use]
    pub fn contains<A: API>(&self, namespace: &str) -> bool {
        self.namespaces
            .read()
            .get(namespace)
            .is_some_and(|apis| apis.contains_key(&TypeId::of::<A>()))
    }

    /// Namespaces publishing an API of type `A`, sorted.
    #[must_use]
    pub fn providers<A: API>(&self) -> Vec<String> {
        let type_id = TypeId::of::<A>();
        let mut providers: Vec<String> = self
            .namespaces
            .read()
            .iter()
            .filter(|(_, apis)| apis.contains_key(&type_id))
            .map(|(namespace, _)| namespace.clone())
            .collect();
        providers.sort_unstable();
        providers
    }

    /// Removes every API of `namespace`, returning how many were dropped.
    pub fn remove_namespace(&self, namespace: &str) -> usize {
        self.namespaces
            .write()
            .remove(namespace)
            .map_or(0, |apis| apis.len())
    }

    /// All namespaces with at least one API, sorted.
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self
            .namespaces
            .read()
            .iter()
            .filter(|(_, apis)| !apis.is_empty())
            .map(|(namespace, _)| namespace.clone())
            .collect();
        namespaces.sort_unstable();
        namespaces
    }
}
