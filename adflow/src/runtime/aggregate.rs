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

//! Windowed count per campaign.

use crate::datasource::date::Millis;
use crate::state::{WindowKey, WindowStore, WindowedCount};
use crate::stream::{Retention, TumblingWindow};
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counts rekeyed records per (campaign, tumbling window).
///
/// The window of a record is derived from its event time only, so the result
/// does not depend on the order or the moment in which records arrive.
#[derive(Debug)]
pub struct WindowedAggregator {
    window:       TumblingWindow,
    retention:    Retention,
    store:        WindowStore,
    newest_start: AtomicU64,
    late:         AtomicU64,
    evicted:      AtomicU64,
}

impl WindowedAggregator {
    /// Creates an aggregator that keeps every window.
    pub fn new(window: TumblingWindow) -> Self {
        Self::with_retention(window, Retention::Unbounded)
    }

    /// Creates an aggregator with an explicit retention policy.
    pub fn with_retention(window: TumblingWindow, retention: Retention) -> Self {
        WindowedAggregator {
            window,
            retention,
            store: WindowStore::new(),
            newest_start: AtomicU64::new(0),
            late: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Returns the window definition.
    pub fn window(&self) -> &TumblingWindow {
        &self.window
    }

    /// Counts one record of `campaign_id` that occurred at `event_time`.
    /// Returns the updated count of its window, or `None` if the window has
    /// already been evicted.
    pub fn add(&self, campaign_id: &str, event_time: Millis) -> Option<u64> {
        let start = self.window.window_start(event_time);
        if let Retention::Unbounded = self.retention {
            return Some(self.store.increment(WindowKey::new(campaign_id, start)));
        }

        let previous = self.newest_start.fetch_max(start, Ordering::AcqRel);
        let newest = previous.max(start);
        let horizon = self.retention.horizon(&self.window, newest);
        if start < horizon {
            self.late.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let key = WindowKey::new(campaign_id, start);
        let count = self.store.increment(key.clone());
        if start > previous {
            let eviction = self.store.evict_before(horizon);
            if eviction.windows > 0 {
                self.evicted.fetch_add(eviction.records, Ordering::Relaxed);
                debug!("Evicted {} windows older than {}.", eviction.windows, horizon);
            }
        }

        // Another worker may have advanced the horizon past this window while
        // the increment was in flight.
        let horizon = self
            .retention
            .horizon(&self.window, self.newest_start.load(Ordering::Acquire));
        if start < horizon {
            if self.store.decrement(&key) {
                self.late.fetch_add(1, Ordering::Relaxed);
            }
            return None;
        }
        Some(count)
    }

    /// Returns the count of `(campaign_id, window_start)`; zero for windows
    /// that never saw a record.
    pub fn count(&self, campaign_id: &str, window_start: Millis) -> u64 {
        self.store.get(campaign_id, window_start)
    }

    /// Returns every live counter ordered by campaign and window start.
    pub fn snapshot(&self) -> Vec<WindowedCount> {
        self.store.snapshot()
    }

    /// Removes and returns every live counter.
    pub fn drain(&self) -> Vec<WindowedCount> {
        self.store.drain()
    }

    /// Returns the number of records dropped because their window had been
    /// evicted.
    pub fn late_records(&self) -> u64 {
        self.late.load(Ordering::Relaxed)
    }

    /// Returns the number of counted records whose window was later evicted.
    pub fn evicted_records(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::stream::tumbling_window;
    use std::sync::Arc;

    #[test]
    fn counts_by_event_time_window() -> Result<()> {
        let aggregator = WindowedAggregator::new(tumbling_window(10_000)?);
        aggregator.add("C1", 1000);
        aggregator.add("C1", 9999);
        assert_eq!(2, aggregator.count("C1", 0));

        aggregator.add("C1", 10_500);
        assert_eq!(1, aggregator.count("C1", 10_000));
        assert_eq!(2, aggregator.count("C1", 0));
        assert_eq!(0, aggregator.count("C2", 0));
        Ok(())
    }

    #[test]
    fn arrival_order_does_not_matter() -> Result<()> {
        let times = [25_000, 1000, 19_999, 10_000, 9999, 20_000];
        let forward = WindowedAggregator::new(tumbling_window(10_000)?);
        let backward = WindowedAggregator::new(tumbling_window(10_000)?);
        times.iter().for_each(|t| {
            forward.add("C1", *t);
        });
        times.iter().rev().for_each(|t| {
            backward.add("C1", *t);
        });
        assert_eq!(forward.snapshot(), backward.snapshot());
        assert_eq!(2, forward.count("C1", 0));
        assert_eq!(2, forward.count("C1", 10_000));
        assert_eq!(2, forward.count("C1", 20_000));
        Ok(())
    }

    #[test]
    fn bounded_retention_evicts_old_windows() -> Result<()> {
        let aggregator =
            WindowedAggregator::with_retention(tumbling_window(10)?, Retention::Latest(2));
        assert_eq!(Some(1), aggregator.add("C1", 5));
        assert_eq!(Some(1), aggregator.add("C1", 15));
        assert_eq!(Some(1), aggregator.add("C2", 25));
        // Window 0 is now older than the two newest windows.
        assert_eq!(0, aggregator.count("C1", 0));
        assert_eq!(None, aggregator.add("C1", 7));
        assert_eq!(1, aggregator.late_records());
        assert_eq!(Some(2), aggregator.add("C1", 19));
        assert_eq!(2, aggregator.snapshot().len());
        Ok(())
    }

    #[test]
    fn drain_empties_the_aggregate() -> Result<()> {
        let aggregator = WindowedAggregator::new(tumbling_window(100)?);
        assert_eq!(100, aggregator.window().size());
        aggregator.add("C2", 150);
        aggregator.add("C1", 20);
        aggregator.add("C1", 99);

        let drained = aggregator.drain();
        assert_eq!(
            vec![("C1", 0, 2), ("C2", 100, 1)],
            drained
                .iter()
                .map(|w| (w.campaign_id.as_str(), w.window_start, w.count))
                .collect::<Vec<_>>()
        );
        assert!(aggregator.snapshot().is_empty());
        assert_eq!(0, aggregator.count("C1", 0));
        Ok(())
    }

    #[test]
    fn concurrent_workers_account_every_record() -> Result<()> {
        let aggregator = Arc::new(WindowedAggregator::with_retention(
            tumbling_window(10)?,
            Retention::Latest(2),
        ));
        let workers = 4u64;
        let per_worker = 5_000u64;
        let threads = (0..workers)
            .map(|w| {
                let aggregator = aggregator.clone();
                std::thread::spawn(move || {
                    for i in 0..per_worker {
                        aggregator.add("C1", i * 3 + w * 7);
                    }
                })
            })
            .collect::<Vec<_>>();
        for t in threads {
            t.join().unwrap();
        }

        let horizon = Retention::Latest(2).horizon(
            aggregator.window(),
            aggregator.snapshot().iter().map(|w| w.window_start).max().unwrap_or(0),
        );
        let live = aggregator.snapshot();
        assert!(live.iter().all(|w| w.window_start >= horizon));
        assert_eq!(
            workers * per_worker,
            live.iter().map(|w| w.count).sum::<u64>()
                + aggregator.late_records()
                + aggregator.evicted_records()
        );
        Ok(())
    }
}
