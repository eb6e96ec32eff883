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

//! Run-scoped counters shared by the generator and the pipeline.

use std::sync::atomic::{AtomicU64, Ordering};

/// `processed_records` and `processed_bytes` of the current phase.
///
/// The driver creates one instance per benchmark, resets it at every phase
/// boundary and reads it when the phase ends. Whichever component is producing
/// or consuming in that phase increments it.
#[derive(Debug, Default)]
pub struct RunCounters {
    records: AtomicU64,
    bytes:   AtomicU64,
}

/// A point-in-time copy of [`RunCounters`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Records produced or consumed.
    pub records: u64,
    /// Key and value bytes produced or consumed.
    pub bytes:   u64,
}

impl RunCounters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        RunCounters {
            records: AtomicU64::new(0),
            bytes:   AtomicU64::new(0),
        }
    }

    /// Zeroes both counters at the start of a phase.
    pub fn reset(&self) {
        self.records.store(0, Ordering::SeqCst);
        self.bytes.store(0, Ordering::SeqCst);
    }

    /// Accounts one record of `bytes` bytes and returns the record count
    /// including it.
    pub fn record(&self, bytes: usize) -> u64 {
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.records.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the number of records accounted in this phase.
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Acquire)
    }

    /// Returns the number of bytes accounted in this phase.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    /// Reads both counters.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            records: self.records(),
            bytes:   self.bytes(),
        }
    }
}
