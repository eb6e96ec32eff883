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

//! A single-shot completion signal.
//!
//! The monitor starts armed with a target record count. The first observation
//! that reaches the target moves it to signaled and releases every waiter;
//! later observations are no-ops.

use crate::error::{AdflowError, Result};
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// The state of a [`CompletionMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    /// The target has not been reached yet.
    Armed,
    /// The target has been reached.
    Signaled,
}

/// Signals run completion once a target number of records has been observed.
#[derive(Debug)]
pub struct CompletionMonitor {
    target:   u64,
    signaled: AtomicBool,
    tx:       watch::Sender<bool>,
    rx:       watch::Receiver<bool>,
}

impl CompletionMonitor {
    /// Creates a monitor armed with `target`. A target of zero is reached
    /// before any record is observed, so the monitor starts signaled.
    pub fn new(target: u64) -> Self {
        let (tx, rx) = watch::channel(target == 0);
        CompletionMonitor {
            target,
            signaled: AtomicBool::new(target == 0),
            tx,
            rx,
        }
    }

    /// Returns the target record count.
    pub fn target(&self) -> u64 {
        self.target
    }

    /// Returns the current state.
    pub fn state(&self) -> CompletionState {
        if self.signaled.load(Ordering::Acquire) {
            CompletionState::Signaled
        } else {
            CompletionState::Armed
        }
    }

    /// Checks `observed` against the target. Returns true only for the call
    /// that performs the armed to signaled transition.
    pub fn check(&self, observed: u64) -> bool {
        if observed < self.target {
            return false;
        }
        if self
            .signaled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        info!("Observed {} of {} records.", observed, self.target);
        let _ = self.tx.send(true);
        true
    }

    /// Waits until the monitor is signaled.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Waits until the monitor is signaled or `timeout` elapses.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| {
                AdflowError::Timeout(format!(
                    "{} records were not observed within {}",
                    self.target,
                    humantime::format_duration(timeout)
                ))
            })
    }
}
