//! Cooldown bookkeeping.
//!
//! Every scope key (`command` × scope-specific room/user) owns a slot with the
//! last charged invocation time and an in-flight flag. The outer map lock is
//! held only long enough to fetch the slot's `Arc`, so concurrent dispatches
//! on unrelated keys never contend.
//!
//! Acquiring a slot yields a [`CooldownPermit`]. While a permit is alive the
//! key counts as busy, so two concurrent invocations by the same user run the
//! handler at most once. [`CooldownPermit::commit`] charges the cooldown;
//! dropping the permit without committing releases the key uncharged.
//!
//! Once the table grows past a threshold, adding a new key first sweeps out
//! slots whose window has passed and that nothing else holds.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use hype_core::{Room, Store, StoreResult, User};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::command::CooldownScope;
use crate::context::SharedClock;

/// Store subkey under which invocation times are persisted.
pub const COOLDOWN_SUBKEY: &str = "cooldown";

/// Table size that triggers the first sweep of expired slots.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Default)]
struct Slot {
    last: Option<DateTime<Utc>>,
    window: Option<TimeDelta>,
    in_flight: bool,
}

impl Slot {
    // Restored slots keep their history until a dispatch tells them their window.
    fn expired(&self, now: DateTime<Utc>) -> bool {
        if self.in_flight {
            return false;
        }
        match (self.last, self.window) {
            (None, _) => true,
            (Some(last), Some(window)) => now - last >= window,
            (Some(_), None) => false,
        }
    }
}

/// Scope key for one command invocation.
pub fn cooldown_key(command: &str, scope: CooldownScope, room: &Room, user: &User) -> String {
    match scope {
        CooldownScope::User => format!("{command}@{}/{}", room.key(), user.id),
        CooldownScope::Room => format!("{command}@{}", room.key()),
        CooldownScope::Global => command.to_string(),
    }
}

/// Last-invocation table shared by all dispatches.
pub struct CooldownTracker {
    clock: SharedClock,
    slots: Mutex<HashMap<String, Arc<Mutex<Slot>>>>,
    threshold: usize,
    sweep_at: AtomicUsize,
}

impl CooldownTracker {
    /// Creates an empty tracker.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            slots: Mutex::new(HashMap::new()),
            threshold: DEFAULT_SWEEP_THRESHOLD,
            sweep_at: AtomicUsize::new(DEFAULT_SWEEP_THRESHOLD),
        }
    }

    /// Sets the table size that triggers a sweep.
    pub fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(1);
        self.sweep_at = AtomicUsize::new(self.threshold);
        self
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    fn slot(&self, key: &str) -> Arc<Mutex<Slot>> {
        let mut slots = self.slots.lock();
        if !slots.contains_key(key) && slots.len() >= self.sweep_at.load(Ordering::Relaxed) {
            let now = self.clock.utc();
            let before = slots.len();
            // A slot someone else holds may be mid-acquire, so only lone slots go.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1 || !slot.lock().expired(now));
            self.sweep_at
                .store((slots.len() * 2).max(self.threshold), Ordering::Relaxed);
            debug!(removed = before - slots.len(), kept = slots.len(), "Swept cooldown slots");
        }
        slots.entry(key.to_string()).or_default().clone()
    }

    /// Tries to claim `key` for one invocation.
    ///
    /// Fails with the remaining wait when the key was charged less than
    /// `duration` ago, or the full `duration` when another invocation on the
    /// same key is still running.
    pub fn try_acquire(&self, key: &str, duration: Duration) -> Result<CooldownPermit, Duration> {
        let slot = self.slot(key);
        let window = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
        {
            let mut state = slot.lock();
            state.window = Some(window);
            if state.in_flight {
                return Err(duration);
            }
            if let Some(last) = state.last {
                let elapsed = self.clock.utc() - last;
                if elapsed < window {
                    return Err((window - elapsed).to_std().unwrap_or_default());
                }
            }
            state.in_flight = true;
        }
        Ok(CooldownPermit {
            key: key.to_string(),
            slot,
            clock: self.clock.clone(),
            released: false,
        })
    }

    /// Time remaining on `key`, if any.
    pub fn remaining(&self, key: &str, duration: Duration) -> Option<Duration> {
        let last = self.slots.lock().get(key)?.lock().last?;
        let window = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
        let elapsed = self.clock.utc() - last;
        (elapsed < window).then(|| (window - elapsed).to_std().unwrap_or_default())
    }

    /// Forgets the history of `key`.
    pub fn reset(&self, key: &str) {
        if let Some(slot) = self.slots.lock().get(key) {
            slot.lock().last = None;
        }
    }

    /// Records `at` as the last invocation of `key`.
    pub fn record(&self, key: &str, at: DateTime<Utc>) {
        let slot = self.slot(key);
        let mut state = slot.lock();
        if state.last.is_none_or(|last| last < at) {
            state.last = Some(at);
        }
    }

    /// Writes a charged invocation to the store.
    pub async fn persist(store: &dyn Store, key: &str, at: DateTime<Utc>) -> StoreResult<()> {
        store
            .set_value(key, COOLDOWN_SUBKEY, &at.timestamp_millis().to_string())
            .await
    }

    /// Loads invocation times previously written by [`persist`](Self::persist).
    ///
    /// Unparseable entries are skipped. Returns the number restored.
    pub async fn restore(&self, store: &dyn Store) -> StoreResult<usize> {
        let mut restored = 0;
        for (key, value) in store.subkey_entries(COOLDOWN_SUBKEY).await? {
            match value.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis) {
                Some(at) => {
                    self.record(&key, at);
                    restored += 1;
                }
                None => warn!(key = %key, value = %value, "Ignoring malformed cooldown entry"),
            }
        }
        debug!(count = restored, "Restored cooldowns");
        Ok(restored)
    }
}

impl std::fmt::Debug for CooldownTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownTracker")
            .field("keys", &self.slots.lock().len())
            .finish_non_exhaustive()
    }
}

/// Exclusive claim on a cooldown key for one invocation.
#[must_use = "dropping the permit releases the key without charging it"]
pub struct CooldownPermit {
    key: String,
    slot: Arc<Mutex<Slot>>,
    clock: SharedClock,
    released: bool,
}

impl CooldownPermit {
    /// Scope key this permit holds.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Charges the cooldown at the current time and releases the key.
    pub fn commit(mut self) -> DateTime<Utc> {
        let now = self.clock.utc();
        {
            let mut state = self.slot.lock();
            state.last = Some(now);
            state.in_flight = false;
        }
        self.released = true;
        now
    }
}

impl Drop for CooldownPermit {
    fn drop(&mut self) {
        if !self.released {
            self.slot.lock().in_flight = false;
        }
    }
}
