//! Registration store — every Api sighted on the group, keyed by name.
//!
//! A concurrent map from service name to the registrations under it,
//! populated by the receive loop and read by queries. Entries expire
//! `life_span` after their last refresh. Expired entries are evicted lazily
//! whenever a read finds them and by the periodic sweep; whichever gets
//! there first removes the entry and emits the single Removed event.

use std::sync::Arc;
use std::time::{Duration, Instant};

use apireg_core::Api;
use dashmap::DashMap;

use crate::listeners::{ListenerId, ListenerStore, RegistrationEvent, RegistrationListener};
use crate::registration::Registration;

pub struct RegistrationStore {
    regs: DashMap<String, Vec<Arc<Registration>>>,
    life_span: Duration,
    listeners: ListenerStore,
}

impl RegistrationStore {
    /// `life_span` applies to registrations created by `merge`.
    pub fn new(life_span: Duration) -> Self {
        Self {
            regs: DashMap::new(),
            life_span,
            listeners: ListenerStore::new(),
        }
    }

    pub fn life_span(&self) -> Duration {
        self.life_span
    }

    pub fn add_listener(&self, listener: Arc<dyn RegistrationListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Record a sighting of `api`. Refreshes the matching registration if
    /// one exists, otherwise inserts a new one and emits Added.
    /// Returns true when a registration was created.
    pub fn merge(&self, api: Api, now: Instant) -> bool {
        // Fast path: refresh under a shared lock.
        if let Some(list) = self.regs.get(api.name()) {
            if let Some(existing) = list.iter().find(|r| r.api().same_identity(&api)) {
                existing.refresh(now);
                tracing::trace!(api = %api, "registration refreshed");
                return false;
            }
        }

        // Re-check under the exclusive lock; another sighting may have won.
        let mut list = self.regs.entry(api.name().to_string()).or_default();
        if let Some(existing) = list.iter().find(|r| r.api().same_identity(&api)) {
            existing.refresh(now);
            return false;
        }
        list.push(Arc::new(Registration::new(api.clone(), now, self.life_span)));
        tracing::debug!(api = %api, "new registration");
        self.listeners.notify(RegistrationEvent::added(api));
        true
    }

    /// Insert `reg` unless a registration with the same identity exists.
    pub fn add_reg(&self, reg: Registration) -> bool {
        let mut list = self.regs.entry(reg.api().name().to_string()).or_default();
        if list.iter().any(|r| r.api().same_identity(reg.api())) {
            return false;
        }
        let api = reg.api().clone();
        list.push(Arc::new(reg));
        self.listeners.notify(RegistrationEvent::added(api));
        true
    }

    pub fn get_all_regs_for_name(&self, name: &str) -> Vec<Arc<Registration>> {
        self.regs_for_name_at(name, Instant::now())
    }

    pub fn get_all_regs(&self) -> Vec<Arc<Registration>> {
        let now = Instant::now();
        self.names()
            .iter()
            .flat_map(|name| self.regs_for_name_at(name, now))
            .collect()
    }

    /// Remove the registration matching `api`'s identity.
    /// Emits Removed only if something was removed.
    pub fn remove_reg_for_api(&self, api: &Api) -> bool {
        self.remove_where(api, |_| true)
    }

    /// Evict every registration expired as of `now`. Returns how many went.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut purged = 0;
        for name in self.names() {
            let snapshot = match self.regs.get(&name) {
                Some(list) => list.clone(),
                None => continue,
            };
            for reg in snapshot.iter().filter(|r| r.is_expired(now)) {
                if self.evict_if_expired(reg.api(), now) {
                    purged += 1;
                }
            }
        }
        if purged > 0 {
            tracing::debug!(purged, "expired registrations purged");
        }
        purged
    }

    /// Stored registrations, expired or not. Does not evict.
    pub fn len(&self) -> usize {
        self.regs.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of names so no shard lock is held across a long scan.
    fn names(&self) -> Vec<String> {
        self.regs.iter().map(|entry| entry.key().clone()).collect()
    }

    fn regs_for_name_at(&self, name: &str, now: Instant) -> Vec<Arc<Registration>> {
        let snapshot = match self.regs.get(name) {
            Some(list) => list.clone(),
            None => return Vec::new(),
        };

        let mut live = Vec::with_capacity(snapshot.len());
        for reg in snapshot {
            if reg.is_expired(now) {
                self.evict_if_expired(reg.api(), now);
            } else {
                live.push(reg);
            }
        }
        live
    }

    /// Expiry is re-checked under the exclusive lock so a refresh that
    /// landed after the caller's scan keeps the entry alive.
    fn evict_if_expired(&self, api: &Api, now: Instant) -> bool {
        let evicted = self.remove_where(api, |r| r.is_expired(now));
        if evicted {
            tracing::debug!(api = %api, "registration expired");
        }
        evicted
    }

    fn remove_where(&self, api: &Api, pred: impl Fn(&Registration) -> bool) -> bool {
        let now_empty = {
            let Some(mut list) = self.regs.get_mut(api.name()) else {
                return false;
            };
            let Some(idx) = list
                .iter()
                .position(|r| r.api().same_identity(api) && pred(r))
            else {
                return false;
            };
            let removed = list.remove(idx);
            self.listeners
                .notify(RegistrationEvent::removed(removed.api().clone()));
            list.is_empty()
        };

        if now_empty {
            self.regs.remove_if(api.name(), |_, list| list.is_empty());
        }
        true
    }
}
