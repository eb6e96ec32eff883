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

//! The event pipeline of the benchmark query:
//!
//! ```text
//! events --> observe --> filter --> project --> join(campaigns) --> rekey --> window count
//! ```
//!
//! Each stage is a plain function with a narrow signature. The pipeline holds
//! them as function pointers, so a test or a variant of the query can swap a
//! stage without any dynamic dispatch on the hot path.
//!
//! Ingress runs one task per partition of the events topic, which preserves the
//! publish order of every ad. The rekeyed stream is repartitioned by campaign
//! over bounded queues, one per aggregation worker, so the records of a
//! campaign are counted by a single worker in arrival order.

use crate::broker::{Partitioner, Record, Subscription};
use crate::datasource::date::Millis;
use crate::datasource::ysb::{EventType, ProjectedEvent};
use crate::encoding::{Codec, EventCodec};
use crate::error::{AdflowError, Result};
use crate::runtime::aggregate::WindowedAggregator;
use crate::runtime::completion::CompletionMonitor;
use crate::runtime::counters::RunCounters;
use crate::runtime::table::ReferenceTable;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Maximum number of records an ingress task reads at once.
const INGRESS_BATCH_SIZE: usize = 512;

/// Decides whether an event continues down the pipeline.
pub type Predicate = fn(&ProjectedEvent) -> bool;
/// Transforms an event into a new one.
pub type Mapper = fn(&ProjectedEvent) -> ProjectedEvent;
/// Combines an event with the table value of its key.
pub type Joiner = fn(&ProjectedEvent, &str) -> String;

/// A keyed record flowing between stages. `event_time` travels with the
/// record so that windows can be assigned after the key has changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyed<V> {
    /// The record key.
    pub key:        String,
    /// The record value.
    pub value:      V,
    /// The event time of the record.
    pub event_time: Millis,
}

/// Keeps only view events.
pub fn is_view(event: &ProjectedEvent) -> bool {
    event.event_type == EventType::View
}

/// Selects the attributes the query reads.
pub fn project(event: &ProjectedEvent) -> ProjectedEvent {
    event.projected()
}

/// The joined value is the campaign of the event's ad.
pub fn campaign_of(_event: &ProjectedEvent, campaign_id: &str) -> String {
    campaign_id.to_owned()
}

/// Keys a joined record by its value, the campaign identifier.
pub fn rekey(joined: Keyed<String>) -> Keyed<String> {
    Keyed {
        key:        joined.value.clone(),
        value:      joined.value,
        event_time: joined.event_time,
    }
}

/// Returns true if the `observed`-th record completes a progress interval.
fn should_report(observed: u64, interval: u64) -> bool {
    interval > 0 && observed > 0 && observed % interval == 0
}

/// Where every ingested record ended up.
#[derive(Debug, Default)]
pub struct PipelineStats {
    ingested:    AtomicU64,
    malformed:   AtomicU64,
    filtered:    AtomicU64,
    join_misses: AtomicU64,
    emitted:     AtomicU64,
}

/// A point-in-time copy of [`PipelineStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Records that entered the pipeline.
    pub ingested:    u64,
    /// Records dropped because they could not be decoded.
    pub malformed:   u64,
    /// Events dropped by the filter.
    pub filtered:    u64,
    /// Events dropped because their ad was not in the table.
    pub join_misses: u64,
    /// Records handed to the aggregator.
    pub emitted:     u64,
}

impl PipelineStats {
    /// Reads every counter.
    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            ingested:    self.ingested.load(Ordering::Relaxed),
            malformed:   self.malformed.load(Ordering::Relaxed),
            filtered:    self.filtered.load(Ordering::Relaxed),
            join_misses: self.join_misses.load(Ordering::Relaxed),
            emitted:     self.emitted.load(Ordering::Relaxed),
        }
    }
}

/// The event pipeline of the benchmark query.
pub struct EventPipeline {
    predicate:         Predicate,
    mapper:            Mapper,
    joiner:            Joiner,
    codec:             EventCodec,
    table:             Arc<ReferenceTable>,
    counters:          Arc<RunCounters>,
    monitor:           Arc<CompletionMonitor>,
    progress_interval: u64,
    stats:             Arc<PipelineStats>,
}

impl EventPipeline {
    /// Creates the YSB pipeline reading `table`, accounting ingress in
    /// `counters` and reporting to `monitor`.
    pub fn new(
        table: Arc<ReferenceTable>,
        counters: Arc<RunCounters>,
        monitor: Arc<CompletionMonitor>,
    ) -> Self {
        EventPipeline {
            predicate: is_view,
            mapper: project,
            joiner: campaign_of,
            codec: EventCodec::default(),
            table,
            counters,
            monitor,
            progress_interval: 1_000_000,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    /// Replaces the filter stage.
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Replaces the projection stage.
    pub fn with_mapper(mut self, mapper: Mapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Replaces the join function.
    pub fn with_joiner(mut self, joiner: Joiner) -> Self {
        self.joiner = joiner;
        self
    }

    /// Sets the codec of the events topic.
    pub fn with_codec(mut self, codec: EventCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Logs a progress line every `interval` observed records.
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    /// Returns the per-stage statistics.
    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Counts the record towards the run, logs progress and checks for
    /// completion. Runs for every record, whatever happens to it afterwards.
    fn observe(&self, record: &Record) {
        self.stats.ingested.fetch_add(1, Ordering::Relaxed);
        let observed = self.counters.record(record.size());
        if should_report(observed, self.progress_interval) {
            info!("Processed {}", observed);
        }
        self.monitor.check(observed);
    }

    /// Runs one record through every stage up to and including the rekey.
    /// Returns the record keyed by campaign, or `None` if it was dropped.
    pub fn process(&self, record: &Record) -> Option<Keyed<String>> {
        self.observe(record);

        let event = match self.codec.decode(&record.value) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    "Dropping event at {}@{} (key {}): {}",
                    record.partition, record.offset, record.key, e
                );
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if !(self.predicate)(&event) {
            self.stats.filtered.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let event = (self.mapper)(&event);

        let campaign_id = match self.table.lookup(&event.ad_id) {
            Some(campaign_id) => campaign_id,
            None => {
                self.stats.join_misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        let joined = Keyed {
            value:      (self.joiner)(&event, &campaign_id),
            key:        event.ad_id,
            event_time: event.event_time,
        };

        self.stats.emitted.fetch_add(1, Ordering::Relaxed);
        Some(rekey(joined))
    }

    /// Spawns the pipeline over `subscriptions`, feeding `aggregator` through
    /// `workers` repartition queues of `buffer` records each.
    pub fn spawn(
        self,
        subscriptions: Vec<Subscription>,
        aggregator: Arc<WindowedAggregator>,
        workers: usize,
        buffer: usize,
    ) -> Result<RunningPipeline> {
        if workers == 0 || buffer == 0 {
            return Err(AdflowError::Config(
                "the pipeline needs at least one aggregation worker with a non-empty queue"
                    .to_string(),
            ));
        }
        let stats = self.stats.clone();
        let pipeline = Arc::new(self);

        let mut queues = Vec::with_capacity(workers);
        let mut aggregates = Vec::with_capacity(workers);
        for worker in 0..workers {
            let (tx, rx) = mpsc::channel::<Keyed<String>>(buffer);
            queues.push(tx);
            aggregates.push(tokio::spawn(aggregate(worker, rx, aggregator.clone())));
        }
        let queues = Arc::new(queues);
        let partitioner = Arc::new(Partitioner::new(workers));

        let ingress = subscriptions
            .into_iter()
            .map(|sub| {
                tokio::spawn(ingest(
                    sub,
                    pipeline.clone(),
                    partitioner.clone(),
                    queues.clone(),
                ))
            })
            .collect();

        Ok(RunningPipeline {
            ingress,
            aggregates,
            stats,
        })
    }
}

async fn ingest(
    mut sub: Subscription,
    pipeline: Arc<EventPipeline>,
    partitioner: Arc<Partitioner>,
    queues: Arc<Vec<mpsc::Sender<Keyed<String>>>>,
) -> Result<()> {
    while let Some(batch) = sub.next_batch(INGRESS_BATCH_SIZE).await? {
        for record in batch {
            if let Some(rekeyed) = pipeline.process(&record) {
                let worker = partitioner.partition_for(&rekeyed.key);
                queues[worker].send(rekeyed).await.map_err(|_| {
                    AdflowError::Execution(format!("aggregation worker {} is gone", worker))
                })?;
            }
        }
    }
    Ok(())
}

async fn aggregate(
    worker: usize,
    mut rx: mpsc::Receiver<Keyed<String>>,
    aggregator: Arc<WindowedAggregator>,
) -> Result<()> {
    let mut counted = 0u64;
    while let Some(record) = rx.recv().await {
        aggregator.add(&record.key, record.event_time);
        counted += 1;
    }
    debug!("Aggregation worker {} counted {} records.", worker, counted);
    Ok(())
}

/// A pipeline whose tasks are running.
pub struct RunningPipeline {
    ingress:    Vec<JoinHandle<Result<()>>>,
    aggregates: Vec<JoinHandle<Result<()>>>,
    stats:      Arc<PipelineStats>,
}

impl RunningPipeline {
    /// Returns the per-stage statistics collected so far.
    pub fn summary(&self) -> PipelineSummary {
        self.stats.summary()
    }

    /// Waits until the events topic has been drained and every rekeyed record
    /// has been counted. Only returns once the events topic is sealed.
    pub async fn join(self) -> Result<PipelineSummary> {
        for result in futures::future::join_all(self.ingress).await {
            result??;
        }
        for result in futures::future::join_all(self.aggregates).await {
            result??;
        }
        Ok(self.stats.summary())
    }

    /// Stops every task. Records in flight are lost.
    pub fn shutdown(self) -> PipelineSummary {
        self.ingress
            .iter()
            .chain(self.aggregates.iter())
            .for_each(|t| t.abort());
        self.stats.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MemoryBroker, Producer};
    use crate::runtime::completion::CompletionState;
    use crate::stream::tumbling_window;

    fn event(event_type: EventType, ad_id: &str, event_time: Millis) -> ProjectedEvent {
        ProjectedEvent {
            event_type,
            ad_id: ad_id.to_string(),
            event_time,
            user_id: Some("u".to_string()),
            page_id: Some("p".to_string()),
            add_type: Some("banner78".to_string()),
            ip_address: Some("1.2.3.4".to_string()),
        }
    }

    fn record(offset: usize, event: &ProjectedEvent) -> Result<Record> {
        Ok(Record {
            key: event.ad_id.clone(),
            value: EventCodec::default().encode(event)?,
            partition: 0,
            offset,
        })
    }

    fn table() -> Arc<ReferenceTable> {
        let table = ReferenceTable::new();
        table.upsert("a1".to_string(), "c1".to_string());
        table.upsert("a2".to_string(), "c2".to_string());
        Arc::new(table)
    }

    #[tokio::test]
    async fn every_record_is_observed() -> Result<()> {
        let counters = Arc::new(RunCounters::new());
        let monitor = Arc::new(CompletionMonitor::new(4));
        let pipeline = EventPipeline::new(table(), counters.clone(), monitor.clone());

        let view = record(0, &event(EventType::View, "a1", 1000))?;
        let click = record(1, &event(EventType::Click, "a1", 1001))?;
        let orphan = record(2, &event(EventType::View, "a9", 1002))?;
        let garbage = Record {
            key:       "a1".to_string(),
            value:     b"{not json".to_vec(),
            partition: 0,
            offset:    3,
        };

        let out = pipeline.process(&view);
        assert_eq!(
            Some(Keyed {
                key:        "c1".to_string(),
                value:      "c1".to_string(),
                event_time: 1000,
            }),
            out
        );
        assert_eq!(None, pipeline.process(&click));
        assert_eq!(None, pipeline.process(&orphan));
        assert_eq!(CompletionState::Armed, monitor.state());
        assert_eq!(None, pipeline.process(&garbage));
        assert_eq!(CompletionState::Signaled, monitor.state());

        let expected_bytes = [&view, &click, &orphan, &garbage]
            .iter()
            .map(|r| r.size() as u64)
            .sum::<u64>();
        assert_eq!(4, counters.records());
        assert_eq!(expected_bytes, counters.bytes());
        assert_eq!(
            PipelineSummary {
                ingested:    4,
                malformed:   1,
                filtered:    1,
                join_misses: 1,
                emitted:     1,
            },
            pipeline.stats().summary()
        );
        Ok(())
    }

    #[tokio::test]
    async fn stages_can_be_replaced() -> Result<()> {
        fn is_click(event: &ProjectedEvent) -> bool {
            event.event_type == EventType::Click
        }
        fn tag(event: &ProjectedEvent, campaign_id: &str) -> String {
            format!("{}/{}", campaign_id, event.event_type)
        }

        let pipeline = EventPipeline::new(
            table(),
            Arc::new(RunCounters::new()),
            Arc::new(CompletionMonitor::new(u64::MAX)),
        )
        .with_predicate(is_click)
        .with_joiner(tag);

        let click = record(0, &event(EventType::Click, "a2", 7))?;
        let view = record(1, &event(EventType::View, "a2", 8))?;
        assert_eq!(
            Some("c2/click".to_string()),
            pipeline.process(&click).map(|k| k.key)
        );
        assert_eq!(None, pipeline.process(&view));
        Ok(())
    }

    #[tokio::test]
    async fn progress_is_reported_every_interval() -> Result<()> {
        assert!(!should_report(1, 1_000_000));
        assert!(!should_report(999_999, 1_000_000));
        assert!(should_report(1_000_000, 1_000_000));
        assert!(!should_report(1_000_001, 1_000_000));
        assert!(should_report(2_000_000, 1_000_000));
        assert!(should_report(1, 1));
        assert!(!should_report(0, 2));
        assert!(!should_report(4, 0));
        Ok(())
    }

    #[tokio::test]
    async fn mapper_runs_before_the_join() -> Result<()> {
        fn shift(event: &ProjectedEvent) -> ProjectedEvent {
            let mut shifted = event.projected();
            shifted.event_time += 10_000;
            shifted
        }

        let pipeline = EventPipeline::new(
            table(),
            Arc::new(RunCounters::new()),
            Arc::new(CompletionMonitor::new(u64::MAX)),
        )
        .with_mapper(shift);

        let view = record(0, &event(EventType::View, "a1", 1_500))?;
        assert_eq!(
            Some(Keyed {
                key:        "c1".to_string(),
                value:      "c1".to_string(),
                event_time: 11_500,
            }),
            pipeline.process(&view)
        );
        Ok(())
    }

    #[tokio::test]
    async fn projection_drops_filler() -> Result<()> {
        let raw = event(EventType::View, "a1", 5);
        let projected = project(&raw);
        assert!(projected.is_projected());
        assert!(!raw.is_projected());
        assert_eq!(raw.ad_id, projected.ad_id);
        assert_eq!(raw.event_time, projected.event_time);
        Ok(())
    }

    #[tokio::test]
    async fn spawned_pipeline_counts_per_campaign() -> Result<()> {
        let broker = MemoryBroker::new();
        broker.create_topic("events", 3)?;
        let codec = EventCodec::default();
        let samples = vec![
            event(EventType::View, "a1", 1_000),
            event(EventType::View, "a1", 9_999),
            event(EventType::View, "a1", 10_500),
            event(EventType::View, "a2", 2_000),
            event(EventType::Purchase, "a2", 2_001),
            event(EventType::View, "a3", 2_002),
        ];
        for e in &samples {
            broker.send("events", &e.ad_id, codec.encode(e)?).await?;
        }
        broker.seal("events")?;

        let counters = Arc::new(RunCounters::new());
        let monitor = Arc::new(CompletionMonitor::new(samples.len() as u64));
        let aggregator = Arc::new(WindowedAggregator::new(tumbling_window(10_000)?));
        let running = EventPipeline::new(table(), counters.clone(), monitor.clone())
            .with_progress_interval(2)
            .spawn(broker.subscribe("events")?, aggregator.clone(), 2, 4)?;

        let summary = running.join().await?;
        assert_eq!(6, summary.ingested);
        assert_eq!(4, summary.emitted);
        assert_eq!(CompletionState::Signaled, monitor.state());
        assert_eq!(2, aggregator.count("c1", 0));
        assert_eq!(1, aggregator.count("c1", 10_000));
        assert_eq!(1, aggregator.count("c2", 0));
        assert_eq!(3, aggregator.snapshot().len());
        Ok(())
    }

    #[tokio::test]
    async fn zero_workers_is_rejected() -> Result<()> {
        let pipeline = EventPipeline::new(
            table(),
            Arc::new(RunCounters::new()),
            Arc::new(CompletionMonitor::new(1)),
        );
        let aggregator = Arc::new(WindowedAggregator::new(tumbling_window(10)?));
        assert!(pipeline.spawn(vec![], aggregator, 0, 8).is_err());
        Ok(())
    }
}
