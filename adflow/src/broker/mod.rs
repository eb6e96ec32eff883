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

//! An in-process message broker with named, partitioned, replayable topics.
//!
//! Every topic is split into a fixed number of partitions. A record's key is
//! mapped to a partition through a consistent-hash ring, so all records that
//! share a key land in the same partition and are delivered in publish order.
//! Partitions are append-only logs: a subscription starts at offset zero,
//! waits for new records once it has caught up, and ends after the topic has
//! been sealed and fully read.
//!
//! The broker stands in for an external system such as Kafka; producers reach
//! it only through the [`Producer`] trait.

use crate::error::{AdflowError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use hashring::HashRing;
use log::debug;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

/// Number of points every partition owns on the hash ring.
const VIRTUAL_NODES_PER_PARTITION: usize = 64;

/// A keyed record stored in a partition log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The record key. Records with the same key share a partition.
    pub key:       String,
    /// The opaque payload.
    pub value:     Vec<u8>,
    /// The partition the record was appended to.
    pub partition: usize,
    /// The position of the record in its partition.
    pub offset:    usize,
}

impl Record {
    /// Returns the number of key and value bytes the record carries.
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// The publishing side of a channel.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Publishes `value` under `key` to `topic`. The call returns once the
    /// record is acknowledged; it may suspend while the transport applies
    /// backpressure.
    async fn send(&self, topic: &str, key: &str, value: Vec<u8>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LogState {
    end:    usize,
    sealed: bool,
}

struct Partition {
    log:   RwLock<Vec<Arc<Record>>>,
    state: watch::Sender<LogState>,
    // Keeps the channel open so that `state.send` never fails.
    probe: watch::Receiver<LogState>,
}

impl Partition {
    fn new() -> Self {
        let (state, probe) = watch::channel(LogState::default());
        Partition {
            log: RwLock::new(vec![]),
            state,
            probe,
        }
    }

    fn state(&self) -> LogState {
        *self.probe.borrow()
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct VirtualPartition {
    partition: usize,
    replica:   usize,
}

/// Maps record keys onto a fixed number of partitions with a consistent-hash
/// ring. The mapping depends only on the key and the partition count.
pub struct Partitioner {
    ring:       HashRing<VirtualPartition>,
    partitions: usize,
}

impl Partitioner {
    /// Creates a partitioner over `partitions` partitions.
    pub fn new(partitions: usize) -> Self {
        let mut ring = HashRing::new();
        for partition in 0..partitions {
            for replica in 0..VIRTUAL_NODES_PER_PARTITION {
                ring.add(VirtualPartition { partition, replica });
            }
        }
        Partitioner { ring, partitions }
    }

    /// Returns the number of partitions.
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Returns the partition that owns `key`.
    pub fn partition_for(&self, key: &str) -> usize {
        self.ring.get(&key).map(|v| v.partition).unwrap_or(0)
    }
}

/// A named, partitioned log.
pub struct Topic {
    name:        String,
    partitioner: Partitioner,
    partitions:  Vec<Arc<Partition>>,
}

impl Topic {
    fn new(name: &str, partitions: usize) -> Self {
        Topic {
            name:        name.to_owned(),
            partitioner: Partitioner::new(partitions),
            partitions:  (0..partitions).map(|_| Arc::new(Partition::new())).collect(),
        }
    }

    /// Returns the topic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of partitions.
    pub fn partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Returns the partition that owns `key`.
    pub fn partition_for(&self, key: &str) -> usize {
        self.partitioner.partition_for(key)
    }

    /// Appends a record to the partition that owns its key and returns the
    /// stored record.
    pub fn append(&self, key: &str, value: Vec<u8>) -> Result<Arc<Record>> {
        let partition = self.partition_for(key);
        let p = &self.partitions[partition];
        let mut log = p
            .log
            .write()
            .map_err(|_| AdflowError::Internal(format!("topic {} log poisoned", self.name)))?;
        let mut state = p.state();
        if state.sealed {
            return Err(AdflowError::Transport(format!(
                "topic {} is sealed",
                self.name
            )));
        }
        let record = Arc::new(Record {
            key: key.to_owned(),
            value,
            partition,
            offset: log.len(),
        });
        log.push(record.clone());
        state.end = log.len();
        // Published under the log lock so the high-water mark never goes back.
        let _ = p.state.send(state);
        Ok(record)
    }

    /// Seals the topic: no further records are accepted and subscriptions end
    /// once they have read every stored record.
    pub fn seal(&self) -> Result<()> {
        for p in &self.partitions {
            let log = p
                .log
                .write()
                .map_err(|_| AdflowError::Internal(format!("topic {} log poisoned", self.name)))?;
            let _ = p.state.send(LogState {
                end:    log.len(),
                sealed: true,
            });
        }
        debug!("Sealed topic {}.", self.name);
        Ok(())
    }

    /// Returns true once the topic has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.partitions.iter().all(|p| p.state().sealed)
    }

    /// Returns the end offset of every partition.
    pub fn end_offsets(&self) -> Vec<usize> {
        self.partitions.iter().map(|p| p.state().end).collect()
    }

    /// Returns the total number of records stored in the topic.
    pub fn len(&self) -> usize {
        self.end_offsets().iter().sum()
    }

    /// Returns true if the topic holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opens one subscription per partition, each positioned at offset zero.
    pub fn subscribe(&self) -> Vec<Subscription> {
        self.partitions
            .iter()
            .enumerate()
            .map(|(partition, p)| Subscription {
                topic: self.name.clone(),
                partition,
                offset: 0,
                rx: p.state.subscribe(),
                log: p.clone(),
            })
            .collect()
    }
}

/// A reader positioned in one partition of a topic.
pub struct Subscription {
    topic:     String,
    partition: usize,
    offset:    usize,
    rx:        watch::Receiver<LogState>,
    log:       Arc<Partition>,
}

impl Subscription {
    /// Returns the name of the subscribed topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the subscribed partition.
    pub fn partition(&self) -> usize {
        self.partition
    }

    /// Returns the offset of the next record to be read.
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Returns up to `max` records following the current position, waiting for
    /// new records if the subscription has caught up. Returns `None` once the
    /// topic is sealed and every record has been read.
    pub async fn next_batch(&mut self, max: usize) -> Result<Option<Vec<Arc<Record>>>> {
        loop {
            let state = *self.rx.borrow_and_update();
            if self.offset < state.end {
                let end = state.end.min(self.offset + max.max(1));
                let batch = {
                    let log = self.log.log.read().map_err(|_| {
                        AdflowError::Internal(format!("topic {} log poisoned", self.topic))
                    })?;
                    log[self.offset..end].to_vec()
                };
                self.offset = end;
                return Ok(Some(batch));
            }
            if state.sealed {
                return Ok(None);
            }
            if self.rx.changed().await.is_err() {
                return Err(AdflowError::Transport(format!(
                    "topic {} partition {} was dropped",
                    self.topic, self.partition
                )));
            }
        }
    }
}

/// An in-memory broker holding a set of topics.
#[derive(Default)]
pub struct MemoryBroker {
    topics: DashMap<String, Arc<Topic>>,
}

impl MemoryBroker {
    /// Creates a broker without topics.
    pub fn new() -> Self {
        MemoryBroker {
            topics: DashMap::new(),
        }
    }

    /// Creates `name` with the given number of partitions. Creating an existing
    /// topic again with the same partition count is a no-op.
    pub fn create_topic(&self, name: &str, partitions: usize) -> Result<Arc<Topic>> {
        if partitions == 0 {
            return Err(AdflowError::Config(format!(
                "topic {} needs at least one partition",
                name
            )));
        }
        let topic = self
            .topics
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Topic::new(name, partitions)))
            .clone();
        if topic.partitions() != partitions {
            return Err(AdflowError::Config(format!(
                "topic {} already exists with {} partitions",
                name,
                topic.partitions()
            )));
        }
        Ok(topic)
    }

    /// Returns the topic called `name`.
    pub fn topic(&self, name: &str) -> Result<Arc<Topic>> {
        self.topics
            .get(name)
            .map(|t| t.value().clone())
            .ok_or_else(|| AdflowError::Transport(format!("unknown topic {}", name)))
    }

    /// Opens one subscription per partition of `name`.
    pub fn subscribe(&self, name: &str) -> Result<Vec<Subscription>> {
        Ok(self.topic(name)?.subscribe())
    }

    /// Seals the topic called `name`.
    pub fn seal(&self, name: &str) -> Result<()> {
        self.topic(name)?.seal()
    }
}

#[async_trait]
impl Producer for MemoryBroker {
    async fn send(&self, topic: &str, key: &str, value: Vec<u8>) -> Result<()> {
        self.topic(topic)?.append(key, value).map(|_| ())
    }
}
