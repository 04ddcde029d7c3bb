//! Hierarchical timing wheel for O(1) expiry scheduling.
//!
//! Four cascading levels — 60 second slots, 60 minute slots, 24 hour slots,
//! 7 day slots — supporting TTLs from one second to seven days. Time is
//! driven externally through `advance`; the wheel holds no clock of its own,
//! so expiry processing is fully deterministic.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

const SEC_SLOTS: usize = 60;
const MIN_SLOTS: usize = 60;
const HOUR_SLOTS: usize = 24;
const DAY_SLOTS: usize = 7;

/// Maximum schedulable TTL in seconds (the span of the day wheel).
pub const MAX_TTL_SECS: i64 = (DAY_SLOTS as i64) * 86_400;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WheelError {
    #[error("Item {0} is already scheduled")]
    AlreadyScheduled(String),

    #[error("TTL of {ttl_secs}s exceeds the wheel horizon of {MAX_TTL_SECS}s")]
    TtlBeyondHorizon { ttl_secs: i64 },
}

/// A scheduled expiry entry.
#[derive(Debug, Clone, PartialEq)]
struct Entry {
    key: String,
    expires_secs: i64,
}

/// Hierarchical four-level timing wheel keyed by item id.
#[derive(Debug, Clone)]
pub struct TimerWheel {
    current_secs: i64,
    seconds: Vec<Vec<Entry>>,
    minutes: Vec<Vec<Entry>>,
    hours: Vec<Vec<Entry>>,
    days: Vec<Vec<Entry>>,
    /// Items scheduled at or before the current time, drained on advance.
    due: Vec<Entry>,
    /// Key -> expiry seconds, for O(1) cancel and membership checks.
    scheduled: BTreeMap<String, i64>,
}

impl TimerWheel {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current_secs: start.timestamp(),
            seconds: vec![Vec::new(); SEC_SLOTS],
            minutes: vec![Vec::new(); MIN_SLOTS],
            hours: vec![Vec::new(); HOUR_SLOTS],
            days: vec![Vec::new(); DAY_SLOTS],
            due: Vec::new(),
            scheduled: BTreeMap::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        timestamp(self.current_secs)
    }

    pub fn len(&self) -> usize {
        self.scheduled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
    }

    /// Schedule `key` to expire at `expires_at`.
    ///
    /// Late scheduling (`expires_at <= now`) is legal: the item goes straight
    /// to the due list and is returned by the next `advance`.
    pub fn schedule(&mut self, key: &str, expires_at: DateTime<Utc>) -> Result<(), WheelError> {
        if self.scheduled.contains_key(key) {
            return Err(WheelError::AlreadyScheduled(key.to_string()));
        }
        let expires_secs = expires_at.timestamp();
        let delta = expires_secs - self.current_secs;
        if delta >= MAX_TTL_SECS {
            return Err(WheelError::TtlBeyondHorizon { ttl_secs: delta });
        }

        let entry = Entry { key: key.to_string(), expires_secs };
        if delta <= 0 {
            debug!(key, "late schedule: moved directly to due list");
            self.due.push(entry);
        } else {
            self.place(entry);
        }
        self.scheduled.insert(key.to_string(), expires_secs);
        Ok(())
    }

    /// Cancel a scheduled expiry. Returns false if the key is unknown.
    pub fn cancel(&mut self, key: &str) -> bool {
        let expires_secs = match self.scheduled.remove(key) {
            Some(secs) => secs,
            None => return false,
        };
        let slot = self.slot_for_mut(expires_secs);
        slot.retain(|e| e.key != key);
        self.due.retain(|e| e.key != key);
        true
    }

    /// Advance the wheel to `now`, returning the keys of every item that
    /// expired in the elapsed interval, in deterministic order.
    ///
    /// Advancing to a time at or before the current one only drains the due
    /// list, which makes forward progress idempotent.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let target_secs = now.timestamp();
        let mut expired: Vec<Entry> = std::mem::take(&mut self.due);

        if self.scheduled.len() == expired.len() {
            // Nothing is left on the wheel itself; jump straight to the target.
            self.current_secs = self.current_secs.max(target_secs);
        }

        while self.current_secs < target_secs {
            self.current_secs += 1;
            let secs = self.current_secs;

            // Cascade coarser wheels into finer ones at their rollovers,
            // before draining this tick's second slot.
            if secs % 60 == 0 {
                let minute_slot = ((secs / 60) % 60) as usize;
                self.cascade_minute(minute_slot, &mut expired);
                if secs % 3_600 == 0 {
                    let hour_slot = ((secs / 3_600) % 24) as usize;
                    self.cascade_hour(hour_slot, &mut expired);
                    if secs % 86_400 == 0 {
                        let day_slot = ((secs / 86_400) % 7) as usize;
                        self.cascade_day(day_slot, &mut expired);
                    }
                }
            }

            let slot = (secs % 60) as usize;
            expired.append(&mut self.seconds[slot]);
        }

        for entry in &expired {
            self.scheduled.remove(&entry.key);
        }
        expired.into_iter().map(|e| e.key).collect()
    }

    /// Place an entry on the coarsest wheel that still resolves its delta.
    fn place(&mut self, entry: Entry) {
        let delta = entry.expires_secs - self.current_secs;
        debug_assert!(delta > 0 && delta < MAX_TTL_SECS);
        if delta < 60 {
            let slot = (entry.expires_secs % 60) as usize;
            self.seconds[slot].push(entry);
        } else if delta < 3_600 {
            let slot = ((entry.expires_secs / 60) % 60) as usize;
            self.minutes[slot].push(entry);
        } else if delta < 86_400 {
            let slot = ((entry.expires_secs / 3_600) % 24) as usize;
            self.hours[slot].push(entry);
        } else {
            let slot = ((entry.expires_secs / 86_400) % 7) as usize;
            self.days[slot].push(entry);
        }
    }

    fn slot_for_mut(&mut self, expires_secs: i64) -> &mut Vec<Entry> {
        let delta = expires_secs - self.current_secs;
        if delta < 60 {
            &mut self.seconds[(expires_secs % 60) as usize]
        } else if delta < 3_600 {
            &mut self.minutes[((expires_secs / 60) % 60) as usize]
        } else if delta < 86_400 {
            &mut self.hours[((expires_secs / 3_600) % 24) as usize]
        } else {
            &mut self.days[((expires_secs / 86_400) % 7) as usize]
        }
    }

    fn cascade_minute(&mut self, slot: usize, expired: &mut Vec<Entry>) {
        let entries = std::mem::take(&mut self.minutes[slot]);
        self.replace_entries(entries, expired);
    }

    fn cascade_hour(&mut self, slot: usize, expired: &mut Vec<Entry>) {
        let entries = std::mem::take(&mut self.hours[slot]);
        self.replace_entries(entries, expired);
    }

    fn cascade_day(&mut self, slot: usize, expired: &mut Vec<Entry>) {
        let entries = std::mem::take(&mut self.days[slot]);
        self.replace_entries(entries, expired);
    }

    fn replace_entries(&mut self, entries: Vec<Entry>, expired: &mut Vec<Entry>) {
        for entry in entries {
            if entry.expires_secs <= self.current_secs {
                expired.push(entry);
            } else {
                self.place(entry);
            }
        }
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).expect("wheel time within chrono range")
}
