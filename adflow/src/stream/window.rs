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

//! Tumbling event-time windows and their retention policy.

use crate::datasource::date::Millis;
use crate::error::{AdflowError, Result};
use serde::{Deserialize, Serialize};

/// A query that aggregates data using distinct time-based windows that open
/// and close at regular intervals. Each record belongs to a specific window
/// and is counted only once.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct TumblingWindow {
    size: Millis,
}

impl TumblingWindow {
    /// Creates a tumbling window of `size` milliseconds.
    pub fn new(size: Millis) -> Result<Self> {
        if size == 0 {
            return Err(AdflowError::Config(
                "the window size must be positive".to_string(),
            ));
        }
        Ok(TumblingWindow { size })
    }

    /// Returns the window size in milliseconds.
    pub fn size(&self) -> Millis {
        self.size
    }

    /// Returns the start of the window that contains `event_time`, i.e.
    /// `event_time` floored to a multiple of the window size.
    pub fn window_start(&self, event_time: Millis) -> Millis {
        event_time - event_time % self.size
    }

    /// Returns the exclusive end of the window starting at `window_start`.
    pub fn window_end(&self, window_start: Millis) -> Millis {
        window_start.saturating_add(self.size)
    }
}

/// Returns a new tumbling window of `millis` milliseconds.
pub fn tumbling_window(millis: Millis) -> Result<TumblingWindow> {
    TumblingWindow::new(millis)
}

/// How many windows a windowed aggregate keeps.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum Retention {
    /// Every window is kept for the lifetime of the aggregate. Memory grows
    /// with the number of windows the run spans.
    Unbounded,
    /// Only the newest `k` window starts observed so far are kept. Older
    /// windows are evicted, and records that fall into an evicted window are
    /// dropped as late.
    Latest(usize),
}

impl Default for Retention {
    fn default() -> Retention {
        Retention::Unbounded
    }
}

impl Retention {
    /// Returns the oldest window start that is still retained, given the newest
    /// window start observed so far.
    pub fn horizon(&self, window: &TumblingWindow, newest_start: Millis) -> Millis {
        match *self {
            Retention::Unbounded => 0,
            Retention::Latest(k) => {
                let span = window.size().saturating_mul(k.saturating_sub(1) as Millis);
                newest_start.saturating_sub(span)
            }
        }
    }
}
