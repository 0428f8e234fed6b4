use std::sync::Mutex;
use std::time::{Duration, Instant};

use apireg_core::Api;

/// A remembered sighting of an Api with a freshness deadline.
///
/// The timestamp has its own lock so a refresh from the receive loop never
/// contends with readers of the store map.
#[derive(Debug)]
pub struct Registration {
    api: Api,
    time_registered: Mutex<Instant>,
    life_span: Duration,
}

impl Registration {
    pub fn new(api: Api, time_registered: Instant, life_span: Duration) -> Self {
        Self {
            api,
            time_registered: Mutex::new(time_registered),
            life_span,
        }
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn life_span(&self) -> Duration {
        self.life_span
    }

    pub fn time_registered(&self) -> Instant {
        // A poisoned lock still holds a valid Instant.
        *self
            .time_registered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn refresh(&self, now: Instant) {
        let mut t = self
            .time_registered
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *t = now;
    }

    pub fn expires_at(&self) -> Instant {
        self.time_registered() + self.life_span
    }

    /// `time_registered + life_span < now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at() < now
    }
}
