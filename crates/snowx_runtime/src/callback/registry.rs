//! Two-level callback store: type, then owner.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use super::{CallbackId, CallbackItem, CallbackType};

/// Registered callbacks keyed by type and owner.
///
/// Within one owner, callbacks keep their registration order and a raw
/// callback is stored at most once.
#[derive(Default)]
pub struct CallbackRegistry {
    items: RwLock<HashMap<CallbackType, HashMap<String, Vec<Arc<CallbackItem>>>>>,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `item`. Returns false if the same raw callback is already
    /// registered for that type and owner.
    pub fn insert(&self, item: CallbackItem) -> bool {
        let mut items = self.items.write();
        let owned = items
            .entry(item.callback_type())
            .or_default()
            .entry_ref(item.owner())
            .or_default();

        if owned.iter().any(|existing| existing.id() == item.id()) {
            return false;
        }
        owned.push(Arc::new(item));
        true
    }

    /// Callbacks of `callback_type` registered by `owner`, in order.
    #[must_use]
    pub fn get(&self, callback_type: CallbackType, owner: &str) -> Vec<Arc<CallbackItem>> {
        self.items
            .read()
            .get(&callback_type)
            .and_then(|owners| owners.get(owner))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns true if `owner` has callbacks of `callback_type`.
    #[must_use]
    pub fn contains(&self, callback_type: CallbackType, owner: &str) -> bool {
        self.items
            .read()
            .get(&callback_type)
            .and_then(|owners| owners.get(owner))
            .is_some_and(|owned| !owned.is_empty())
    }

    /// Returns true if `id` is registered for `callback_type` by `owner`.
    #[must_use]
    pub fn contains_callback(&self, callback_type: CallbackType, owner: &str, id: CallbackId) -> bool {
        self.get(callback_type, owner)
            .iter()
            .any(|item| item.id() == id)
    }

    /// Owners with callbacks of `callback_type`, sorted.
    #[must_use]
    pub fn owners(&self, callback_type: CallbackType) -> Vec<String> {
        let mut owners: Vec<String> = self
            .items
            .read()
            .get(&callback_type)
            .map(|owners| owners.keys().cloned().collect())
            .unwrap_or_default();
        owners.sort_unstable();
        owners
    }

    /// Removes every callback of `owner`, returning the removed items.
    pub fn remove_owner(&self, owner: &str) -> Vec<Arc<CallbackItem>> {
        let mut items = self.items.write();
        CallbackType::ALL
            .iter()
            .filter_map(|callback_type| items.get_mut(callback_type)?.remove(owner))
            .flatten()
            .collect()
    }

    /// Total number of stored callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items
            .read()
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl core::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("len", &self.len())
            .finish()
    }
}
