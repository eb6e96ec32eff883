// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! Operators of the pipeline hold state in various forms: the campaign table
//! holds the latest value of every key, and windows gather aggregates until
//! they are queried or drained.
//!
//! The window store keeps its counters in a sharded concurrent hash map held
//! in the process's memory. Updates of a single key are atomic with respect to
//! each other and to readers; there is no cross-key snapshot. This backend does
//! not provide any guarantees on fault tolerance: a run that is interrupted
//! starts over from a clean load phase.

use crate::datasource::date::Millis;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// The key of a windowed counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowKey {
    /// The campaign the counted events belong to.
    pub campaign_id:  String,
    /// The inclusive start of the window.
    pub window_start: Millis,
}

impl WindowKey {
    /// Creates a new window key.
    pub fn new(campaign_id: impl Into<String>, window_start: Millis) -> Self {
        WindowKey {
            campaign_id: campaign_id.into(),
            window_start,
        }
    }
}

/// A windowed counter read out of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowedCount {
    /// The campaign the counted events belong to.
    pub campaign_id:  String,
    /// The inclusive start of the window.
    pub window_start: Millis,
    /// The number of events counted in the window.
    pub count:        u64,
}

/// What an eviction removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    /// Number of windows removed.
    pub windows: usize,
    /// Sum of the counters of the removed windows.
    pub records: u64,
}

/// Per-(campaign, window) counters.
#[derive(Debug, Default)]
pub struct WindowStore {
    counts: DashMap<WindowKey, u64>,
}

impl WindowStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        WindowStore {
            counts: DashMap::new(),
        }
    }

    /// Increments the counter of `key`, creating it at zero if absent, and
    /// returns the new count.
    pub fn increment(&self, key: WindowKey) -> u64 {
        let mut count = self.counts.entry(key).or_insert(0);
        *count += 1;
        *count
    }

    /// Returns the counter of `(campaign_id, window_start)`, or zero if no
    /// event has been counted there.
    pub fn get(&self, campaign_id: &str, window_start: Millis) -> u64 {
        self.counts
            .get(&WindowKey::new(campaign_id, window_start))
            .map(|c| *c.value())
            .unwrap_or(0)
    }

    /// Removes every window starting before `horizon`.
    pub fn evict_before(&self, horizon: Millis) -> Eviction {
        let mut eviction = Eviction::default();
        self.counts.retain(|key, count| {
            if key.window_start >= horizon {
                return true;
            }
            eviction.windows += 1;
            eviction.records += *count;
            false
        });
        eviction
    }

    /// Takes back one increment of `key`, removing the counter when it drops to
    /// zero. Returns false if the counter no longer exists.
    pub fn decrement(&self, key: &WindowKey) -> bool {
        match self.counts.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() <= 1 {
                    entry.remove();
                } else {
                    *entry.get_mut() -= 1;
                }
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Returns the number of live windows.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns true if no window has been created.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Returns every counter ordered by campaign and window start.
    pub fn snapshot(&self) -> Vec<WindowedCount> {
        self.counts
            .iter()
            .map(|entry| WindowedCount {
                campaign_id:  entry.key().campaign_id.clone(),
                window_start: entry.key().window_start,
                count:        *entry.value(),
            })
            .sorted_by(|a, b| {
                (&a.campaign_id, a.window_start).cmp(&(&b.campaign_id, b.window_start))
            })
            .collect()
    }

    /// Removes and returns every counter ordered by campaign and window start.
    pub fn drain(&self) -> Vec<WindowedCount> {
        let keys: Vec<WindowKey> = self.counts.iter().map(|e| e.key().clone()).collect();
        keys.into_iter()
            .filter_map(|key| self.counts.remove(&key))
            .map(|(key, count)| WindowedCount {
                campaign_id: key.campaign_id,
                window_start: key.window_start,
                count,
            })
            .sorted_by(|a, b| {
                (&a.campaign_id, a.window_start).cmp(&(&b.campaign_id, b.window_start))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn missing_counters_read_zero() {
        let store = WindowStore::new();
        assert_eq!(0, store.get("c1", 0));
        assert!(store.is_empty());
    }

    #[test]
    fn snapshot_and_drain_are_ordered() {
        let store = WindowStore::new();
        store.increment(WindowKey::new("c2", 0));
        store.increment(WindowKey::new("c1", 10));
        store.increment(WindowKey::new("c1", 0));
        store.increment(WindowKey::new("c1", 0));

        let snapshot = store.snapshot();
        let keys: Vec<_> = snapshot
            .iter()
            .map(|w| (w.campaign_id.as_str(), w.window_start, w.count))
            .collect();
        assert_eq!(vec![("c1", 0, 2), ("c1", 10, 1), ("c2", 0, 1)], keys);

        assert_eq!(snapshot, store.drain());
        assert!(store.is_empty());
    }

    #[test]
    fn eviction_keeps_newer_windows() {
        let store = WindowStore::new();
        for start in [0, 10, 20, 30] {
            store.increment(WindowKey::new("c1", start));
        }
        store.increment(WindowKey::new("c1", 10));
        assert_eq!(
            Eviction {
                windows: 2,
                records: 3,
            },
            store.evict_before(20)
        );
        assert_eq!(0, store.get("c1", 10));
        assert_eq!(1, store.get("c1", 20));
    }

    #[test]
    fn decrement_removes_empty_counters() {
        let store = WindowStore::new();
        let key = WindowKey::new("c1", 0);
        store.increment(key.clone());
        store.increment(key.clone());
        assert!(store.decrement(&key));
        assert_eq!(1, store.get("c1", 0));
        assert!(store.decrement(&key));
        assert!(store.is_empty());
        assert!(!store.decrement(&key));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let store = Arc::new(WindowStore::new());
        let tasks = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    for _ in 0..1000 {
                        store.increment(WindowKey::new("c1", 0));
                    }
                })
            })
            .collect::<Vec<_>>();
        futures::future::join_all(tasks).await;
        assert_eq!(8000, store.get("c1", 0));
    }
}
