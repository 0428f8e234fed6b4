//! Apis this process has announced itself.
//!
//! Expected to hold a handful of entries (one per locally hosted service),
//! so a vector with a linear identity scan is enough.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use apireg_core::Api;

#[derive(Debug, Default)]
pub struct OwnedApiStore {
    apis: RwLock<Vec<Api>>,
}

impl OwnedApiStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if an Api with the same identity is already owned.
    pub fn add(&self, api: Api) -> bool {
        let mut apis = self.write();
        if apis.iter().any(|a| a.same_identity(&api)) {
            return false;
        }
        apis.push(api);
        true
    }

    pub fn contains(&self, api: &Api) -> bool {
        self.read().iter().any(|a| a.same_identity(api))
    }

    pub fn remove(&self, api: &Api) -> bool {
        let mut apis = self.write();
        match apis.iter().position(|a| a.same_identity(api)) {
            Some(idx) => {
                apis.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Snapshot copy; callers iterate it without holding the lock.
    pub fn all(&self) -> Vec<Api> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic while holding the lock cannot leave the Vec half-updated.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Api>> {
        self.apis.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Api>> {
        self.apis.write().unwrap_or_else(|e| e.into_inner())
    }
}
