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

//! The campaign reference table and the task that materializes it.
//!
//! The campaigns topic is a changelog: every record upserts the campaign of
//! one ad, and only the latest value per key matters. The materializer replays
//! the topic into a concurrent map which the event pipeline reads while it is
//! being updated.

use crate::broker::{MemoryBroker, Subscription};
use crate::encoding::{CampaignCodec, Codec};
use crate::error::{AdflowError, Result};
use dashmap::DashMap;
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Maximum number of records a materializer task reads at once.
const MATERIALIZE_BATCH_SIZE: usize = 1024;

/// A materialized `ad_id -> campaign_id` mapping.
///
/// Writes replace the previous value of a key atomically; readers see either
/// the old or the new campaign, never a partial one. There is no snapshot
/// across keys.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    rows: DashMap<String, String>,
}

impl ReferenceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        ReferenceTable {
            rows: DashMap::new(),
        }
    }

    /// Replaces the campaign of `ad_id` and returns the previous one.
    pub fn upsert(&self, ad_id: String, campaign_id: String) -> Option<String> {
        self.rows.insert(ad_id, campaign_id)
    }

    /// Returns the campaign `ad_id` currently belongs to.
    pub fn lookup(&self, ad_id: &str) -> Option<String> {
        self.rows.get(ad_id).map(|c| c.value().clone())
    }

    /// Returns the number of ads in the table.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no ad has been materialized.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What the materializer did with the rows it consumed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaterializerStats {
    /// Rows applied to the table.
    pub applied:   u64,
    /// Rows dropped because they could not be decoded.
    pub malformed: u64,
}

#[derive(Debug, Default)]
struct Tally {
    applied:   AtomicU64,
    malformed: AtomicU64,
}

impl Tally {
    fn snapshot(&self) -> MaterializerStats {
        MaterializerStats {
            applied:   self.applied.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

/// Consumes the campaigns topic into a [`ReferenceTable`], one task per
/// partition.
pub struct TableMaterializer {
    topic:   String,
    table:   Arc<ReferenceTable>,
    broker:  Arc<MemoryBroker>,
    applied: Vec<watch::Receiver<usize>>,
    tally:   Arc<Tally>,
    tasks:   Vec<JoinHandle<Result<()>>>,
}

impl TableMaterializer {
    /// Starts materializing `topic` into a new table.
    pub fn start(broker: Arc<MemoryBroker>, topic: &str) -> Result<Self> {
        let table = Arc::new(ReferenceTable::new());
        let tally = Arc::new(Tally::default());
        let mut applied = vec![];
        let mut tasks = vec![];
        for sub in broker.subscribe(topic)? {
            let (tx, rx) = watch::channel(0);
            applied.push(rx);
            tasks.push(tokio::spawn(materialize(
                sub,
                table.clone(),
                tally.clone(),
                tx,
            )));
        }
        Ok(TableMaterializer {
            topic: topic.to_owned(),
            table,
            broker,
            applied,
            tally,
            tasks,
        })
    }

    /// Returns a read handle on the materialized table.
    pub fn table(&self) -> Arc<ReferenceTable> {
        self.table.clone()
    }

    /// Waits until every row that was in the topic when this method was called
    /// has been applied to the table.
    pub async fn catch_up(&self) -> Result<()> {
        let targets = self.broker.topic(&self.topic)?.end_offsets();
        for (partition, (rx, target)) in self.applied.iter().zip(targets).enumerate() {
            let mut rx = rx.clone();
            while *rx.borrow_and_update() < target {
                if rx.changed().await.is_err() {
                    return Err(AdflowError::Execution(format!(
                        "materializer of {} partition {} stopped at offset {} before {}",
                        self.topic,
                        partition,
                        *rx.borrow(),
                        target
                    )));
                }
            }
        }
        debug!(
            "Reference table caught up with {}: {} ads.",
            self.topic,
            self.table.len()
        );
        Ok(())
    }

    /// Returns what has been applied so far.
    pub fn stats(&self) -> MaterializerStats {
        self.tally.snapshot()
    }

    /// Waits for every task to finish, which happens once the topic is sealed
    /// and fully consumed.
    pub async fn join(self) -> Result<MaterializerStats> {
        for result in futures::future::join_all(self.tasks).await {
            result??;
        }
        Ok(self.tally.snapshot())
    }

    /// Stops consuming. The table keeps the rows applied so far.
    pub fn shutdown(self) {
        self.tasks.iter().for_each(|t| t.abort());
    }
}

async fn materialize(
    mut sub: Subscription,
    table: Arc<ReferenceTable>,
    tally: Arc<Tally>,
    applied: watch::Sender<usize>,
) -> Result<()> {
    let codec = CampaignCodec;
    while let Some(batch) = sub.next_batch(MATERIALIZE_BATCH_SIZE).await? {
        for record in batch {
            match codec.decode(&record.value) {
                Ok(row) => {
                    table.upsert(record.key.clone(), row.campaign_id);
                    tally.applied.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(
                        "Dropping campaign row at {}/{}@{}: {}",
                        sub.topic(),
                        record.partition,
                        record.offset,
                        e
                    );
                    tally.malformed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        let _ = applied.send(sub.position());
    }
    Ok(())
}
