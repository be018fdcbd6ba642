//! Windowed join memories.
//!
//! Each join side keeps a bounded, insertion-ordered window of bindings. An entry
//! leaves the window when it is older than the range or when the window is full
//! and a newer entry arrives. A match is only found while both contributing
//! bindings are inside their windows.

use crate::core::binding::Binding;
use crate::core::message::{now_millis, Meta};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Default number of entries a join side retains.
pub const DEFAULT_WINDOW_CAPACITY: usize = 5000;

/// Default maximum entry age: 15 minutes.
pub const DEFAULT_WINDOW_RANGE_MS: u64 = 15 * 60 * 1000;

/// Time source for window ageing.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        now_millis()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self { now: Arc::new(AtomicI64::new(start)) }
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub capacity: usize,
    pub range_ms: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_WINDOW_CAPACITY, range_ms: DEFAULT_WINDOW_RANGE_MS }
    }
}

#[derive(Clone, Debug)]
pub struct WindowEntry {
    pub binding: Binding,
    pub meta: Meta,
    pub inserted_at: i64,
}

/// A bounded window of bindings, oldest first.
#[derive(Debug)]
pub struct WindowedMemory {
    entries: VecDeque<WindowEntry>,
    config: WindowConfig,
    evicted: u64,
}

impl WindowedMemory {
    pub fn new(config: WindowConfig) -> Self {
        Self { entries: VecDeque::new(), config, evicted: 0 }
    }

    /// Insert at time `now`, first evicting expired entries and then the oldest
    /// entries until there is room. Returns the number of entries evicted.
    pub fn insert(&mut self, binding: Binding, meta: Meta, now: i64) -> usize {
        let mut evicted = self.expire(now);

        while self.config.capacity > 0 && self.entries.len() >= self.config.capacity {
            self.entries.pop_front();
            evicted += 1;
        }

        if self.config.capacity > 0 {
            self.entries.push_back(WindowEntry { binding, meta, inserted_at: now });
        }
        self.evicted += evicted as u64;
        evicted
    }

    /// Drop every entry older than the range at time `now`.
    pub fn expire(&mut self, now: i64) -> usize {
        let range = i64::try_from(self.config.range_ms).unwrap_or(i64::MAX);
        let mut evicted = 0;
        while let Some(front) = self.entries.front() {
            if now.saturating_sub(front.inserted_at) > range {
                self.entries.pop_front();
                evicted += 1;
            } else {
                break;
            }
        }
        evicted
    }

    /// Entries still live at time `now`, oldest first.
    pub fn probe(&self, now: i64) -> impl Iterator<Item = &WindowEntry> {
        let range = i64::try_from(self.config.range_ms).unwrap_or(i64::MAX);
        self.entries.iter().filter(move |e| now.saturating_sub(e.inserted_at) <= range)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_evicted(&self) -> u64 {
        self.evicted
    }

    pub fn config(&self) -> WindowConfig {
        self.config
    }
}
