//! Identifier-keyed async locks
//!
//! Child resources of a datastore (databases, users, slots, topics, ACLs)
//! must not mutate the same parent concurrently. Handlers take the lock for
//! the parent id (and their own id where relevant) for the whole operation.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Table of named async mutexes, shared through the provider context.
#[derive(Debug, Default)]
pub struct LockService {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LockService {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Guards and waiters hold a clone; a count of one means the key is idle.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquire the lock for a single key.
    pub async fn lock(&self, key: &str) -> ResourceLock {
        self.lock_all([key]).await
    }

    /// Acquire the locks for several keys.
    ///
    /// Keys are deduplicated and taken in sorted order, so two callers locking
    /// overlapping key sets cannot deadlock. Empty keys are skipped.
    pub async fn lock_all<I, S>(&self, keys: I) -> ResourceLock
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: BTreeSet<String> = keys
            .into_iter()
            .map(|k| k.as_ref().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.entry(key).lock_owned().await);
        }

        tracing::debug!(keys = ?keys, "Acquired resource locks");
        ResourceLock {
            keys: keys.into_iter().collect(),
            guards,
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> Vec<String> {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<_> = locks.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// RAII guard for one or more resource locks
pub struct ResourceLock {
    keys: Vec<String>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl ResourceLock {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Release the locks
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        // Reverse acquisition order
        while self.guards.pop().is_some() {}
        tracing::debug!(keys = ?self.keys, "Released resource locks");
    }
}
