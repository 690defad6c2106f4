//! Completion locks: reentrant "in-flight" barriers.
//!
//! A [`CompletionLock`] counts how many holders are currently inside a
//! critical section. [`CompletionLock::wait`] resolves once that count drops
//! back to zero (immediately if nothing ever entered). Unlike a mutex,
//! entering never blocks; the lock only lets a third party wait for the
//! section to drain.
//!
//! [`CompletionLockRegistry`] hands out locks by symbol and lets a symbol be
//! marked *no-wait*, which turns [`CompletionLockRegistry::wait`] into a
//! no-op for it.
//!
//! # Example
//!
//! ```
//! use snowx_system::lock::CompletionLock;
//!
//! # tokio_test::block_on(async {
//! let lock = CompletionLock::new();
//! {
//!     let _guard = lock.enter();
//!     assert_eq!(lock.in_flight(), 1);
//! }
//! lock.wait().await; // drained
//! # });
//! ```

use core::hash::Hash;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use tokio::sync::watch;

// ─────────────────────────────────────────────────────────────────────────────
// CompletionLock
// ─────────────────────────────────────────────────────────────────────────────

struct LockState {
    in_flight: Mutex<usize>,
    /// `true` while nothing is in flight.
    drained: watch::Sender<bool>,
}

/// Shared handle to an in-flight counter with a drained signal.
///
/// Cloning yields another handle to the same lock.
#[derive(Clone)]
pub struct CompletionLock {
    state: Arc<LockState>,
}

impl Default for CompletionLock {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CompletionLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompletionLock")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl CompletionLock {
    /// Creates a drained lock.
    #[must_use]
    pub fn new() -> Self {
        let (drained, _) = watch::channel(true);
        Self {
            state: Arc::new(LockState {
                in_flight: Mutex::new(0),
                drained,
            }),
        }
    }

    /// Enters the section. The returned guard exits on drop.
    #[must_use = "the section is exited as soon as the guard is dropped"]
    pub fn enter(&self) -> CompletionGuard {
        let mut count = self.state.in_flight.lock();
        *count += 1;
        self.state.drained.send_replace(false);
        CompletionGuard { lock: self.clone() }
    }

    fn exit(&self) {
        let mut count = self.state.in_flight.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.state.drained.send_replace(true);
        }
    }

    /// Number of holders currently inside the section.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.state.in_flight.lock()
    }

    /// Returns true if nothing is in flight.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        *self.state.drained.borrow()
    }

    /// Waits until nothing is in flight.
    pub async fn wait(&self) {
        let mut drained = self.state.drained.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = drained.wait_for(|is_drained| *is_drained).await;
    }

    /// Returns true if both handles refer to the same lock.
    #[must_use]
    pub fn same_lock(&self, other: &CompletionLock) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// RAII guard returned by [`CompletionLock::enter`].
pub struct CompletionGuard {
    lock: CompletionLock,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.lock.exit();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CompletionLockRegistry
// ─────────────────────────────────────────────────────────────────────────────

/// Completion locks keyed by symbol, with a per-symbol no-wait flag.
pub struct CompletionLockRegistry<K> {
    locks: Mutex<HashMap<K, CompletionLock>>,
    nowait: Mutex<HashSet<K>>,
}

impl<K: Hash + Eq + Clone> Default for CompletionLockRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone> CompletionLockRegistry<K> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            nowait: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the lock for `symbol`, creating it on first use.
    ///
    /// With `force_new`, any existing lock is replaced by a fresh one.
    pub fn get_lock(&self, symbol: &K, force_new: bool) -> CompletionLock {
        let mut locks = self.locks.lock();
        if force_new {
            let lock = CompletionLock::new();
            locks.insert(symbol.clone(), lock.clone());
            return lock;
        }
        locks.entry(symbol.clone()).or_default().clone()
    }

    /// Marks `symbol` as safe to abandon without draining.
    pub fn set_nowait(&self, symbol: &K) {
        self.nowait.lock().insert(symbol.clone());
    }

    /// Clears the no-wait mark of `symbol`.
    pub fn reset_nowait(&self, symbol: &K) {
        self.nowait.lock().remove(symbol);
    }

    /// Returns true if `symbol` is marked no-wait.
    #[must_use]
    pub fn is_nowait(&self, symbol: &K) -> bool {
        self.nowait.lock().contains(symbol)
    }

    /// Waits for the lock of `symbol` to drain.
    ///
    /// Returns immediately for no-wait symbols and for symbols without a lock.
    pub async fn wait(&self, symbol: &K) {
        if self.is_nowait(symbol) {
            return;
        }
        let lock = self.locks.lock().get(symbol).cloned();
        if let Some(lock) = lock {
            lock.wait().await;
        }
    }

    /// Forgets the lock and no-wait mark of `symbol`.
    pub fn remove(&self, symbol: &K) {
        self.locks.lock().remove(symbol);
        self.nowait.lock().remove(symbol);
    }

    /// Number of registered locks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns true if no locks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[tokio::test]
    async fn wait_returns_immediately_when_never_entered() {
        let lock = CompletionLock::new();
        tokio::time::timeout(Duration::from_millis(50), lock.wait())
            .await
            .expect("a fresh lock is drained");
    }

    #[tokio::test]
    async fn reentrant_enter_drains_after_last_exit() {
        let lock = CompletionLock::new();
        let first = lock.enter();
        let second = lock.enter();
        assert_eq!(lock.in_flight(), 2);

        drop(first);
        assert!(!lock.is_drained());

        drop(second);
        assert!(lock.is_drained());
        lock.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn wait_blocks_until_holder_exits() {
        let lock = CompletionLock::new();
        let guard = lock.enter();

        let holder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            drop(guard);
        });

        let started = tokio::time::Instant::now();
        lock.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(100));
        holder.await.unwrap();
    }

    #[test]
    fn registry_reuses_lock_unless_forced() {
        let registry = CompletionLockRegistry::<&'static str>::new();
        let first = registry.get_lock(&"a", false);
        let again = registry.get_lock(&"a", false);
        assert!(first.same_lock(&again));

        let fresh = registry.get_lock(&"a", true);
        assert!(!first.same_lock(&fresh));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nowait_symbol_skips_draining() {
        let registry = CompletionLockRegistry::<u32>::new();
        let lock = registry.get_lock(&7, false);
        let _held = lock.enter();

        registry.set_nowait(&7);
        tokio::time::timeout(Duration::from_millis(10), registry.wait(&7))
            .await
            .expect("no-wait symbols never block");

        registry.reset_nowait(&7);
        assert!(
            tokio::time::timeout(Duration::from_millis(10), registry.wait(&7))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn unknown_symbol_does_not_block() {
        let registry = CompletionLockRegistry::<String>::new();
        registry.wait(&"missing".to_string()).await;
    }
}
