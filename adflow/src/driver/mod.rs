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

//! The benchmark driver.
//!
//! A run has two phases that never overlap. The load phase publishes the
//! campaign table and the ad events, then seals both topics. The run phase
//! materializes the table, starts the event pipeline, and measures the time it
//! takes to observe the requested number of events.

use crate::broker::MemoryBroker;
use crate::configs::BenchmarkConfig;
use crate::datasource::ysb::YSBGenerator;
use crate::encoding::EventCodec;
use crate::error::{AdflowError, Result};
use crate::runtime::{
    CompletionMonitor, CounterSnapshot, EventPipeline, PipelineSummary, RunCounters,
    TableMaterializer, WindowedAggregator,
};
use crate::state::WindowedCount;
use crate::stream::tumbling_window;
use log::{info, warn};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Label of the load phase report.
pub const PRODUCER_LABEL: &str = "Producer Performance [records/latency/rec-sec/MB-sec write]";
/// Label of the run phase report.
pub const STREAMS_LABEL: &str = "Streams Yahoo Performance [records/latency/rec-sec/MB-sec counted]";

const MEGABYTE: f64 = 1024.0 * 1024.0;

/// Which phases to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchmarkMode {
    /// Publish the workload only.
    Load,
    /// Measure the query. The workload is published first without a report.
    Run,
    /// Publish the workload, then measure the query.
    All,
}

impl FromStr for BenchmarkMode {
    type Err = AdflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "load" => Ok(BenchmarkMode::Load),
            "run" => Ok(BenchmarkMode::Run),
            "all" => Ok(BenchmarkMode::All),
            _ => Err(AdflowError::Config(format!(
                "unknown mode `{}`, expected load, run or all",
                s
            ))),
        }
    }
}

/// The throughput of one phase.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// What was measured.
    pub label:           String,
    /// Records produced or observed.
    pub records:         u64,
    /// Elapsed time of the phase in milliseconds.
    pub latency_ms:      u64,
    /// Records per second.
    pub records_per_sec: f64,
    /// Megabytes (2^20 bytes) per second.
    pub mb_per_sec:      f64,
}

impl Report {
    /// Computes the throughput of `counted` over `elapsed`.
    pub fn new(label: &str, counted: CounterSnapshot, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let (records_per_sec, mb_per_sec) = if secs > 0.0 {
            (
                counted.records as f64 / secs,
                counted.bytes as f64 / MEGABYTE / secs,
            )
        } else {
            (0.0, 0.0)
        };
        Report {
            label: label.to_string(),
            records: counted.records,
            latency_ms: elapsed.as_millis() as u64,
            records_per_sec,
            mb_per_sec,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {}/{}/{}/{}",
            self.label, self.records, self.latency_ms, self.records_per_sec, self.mb_per_sec
        )
    }
}

/// Everything a run phase produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The measured throughput.
    pub report:       Report,
    /// The final view counts, ordered by campaign and window start.
    pub windows:      Vec<WindowedCount>,
    /// Where the ingested events ended up.
    pub stats:        PipelineSummary,
    /// Events dropped because their window had been evicted.
    pub late_records: u64,
}

/// The Yahoo Streaming Benchmark over an in-memory broker.
pub struct YahooBenchmark {
    config:   BenchmarkConfig,
    broker:   Arc<MemoryBroker>,
    counters: Arc<RunCounters>,
}

impl YahooBenchmark {
    /// Creates both topics of the benchmark on a fresh broker.
    pub fn new(config: BenchmarkConfig) -> Result<Self> {
        config.validate()?;
        let broker = Arc::new(MemoryBroker::new());
        broker.create_topic(&config.campaigns_topic, config.partitions)?;
        broker.create_topic(&config.events_topic, config.partitions)?;
        Ok(YahooBenchmark {
            config,
            broker,
            counters: Arc::new(RunCounters::new()),
        })
    }

    /// Returns the configuration of the benchmark.
    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Returns the broker holding both topics.
    pub fn broker(&self) -> Arc<MemoryBroker> {
        self.broker.clone()
    }

    /// Returns the counters of the current phase.
    pub fn counters(&self) -> Arc<RunCounters> {
        self.counters.clone()
    }

    /// Runs the phases selected by `mode` and returns their reports.
    pub async fn execute(&self, mode: BenchmarkMode, num_records: usize) -> Result<Vec<Report>> {
        match mode {
            BenchmarkMode::Load => Ok(vec![self.load_phase(num_records).await?]),
            BenchmarkMode::Run => {
                info!("Preloading {} events.", num_records);
                self.load_phase(num_records).await?;
                Ok(vec![self.run_phase(num_records).await?.report])
            }
            BenchmarkMode::All => {
                let load = self.load_phase(num_records).await?;
                let run = self.run_phase(num_records).await?;
                Ok(vec![load, run.report])
            }
        }
    }

    /// Publishes the campaign table and `num_records` events, then seals both
    /// topics. The report covers the events only.
    pub async fn load_phase(&self, num_records: usize) -> Result<Report> {
        let mut generator =
            YSBGenerator::new(&self.config.campaigns_topic, &self.config.events_topic)
                .with_codec(EventCodec::new(self.config.encoding));

        info!("Initializing topic {}", self.config.campaigns_topic);
        self.counters.reset();
        let ads = generator
            .generate_campaigns(
                self.broker.as_ref(),
                &self.counters,
                self.config.num_campaigns,
                self.config.ads_per_campaign,
            )
            .await?;
        self.broker.seal(&self.config.campaigns_topic)?;

        info!("Initializing topic {}", self.config.events_topic);
        self.counters.reset();
        let elapsed = generator
            .generate_events(self.broker.as_ref(), &self.counters, num_records, &ads)
            .await?;
        self.broker.seal(&self.config.events_topic)?;

        Ok(Report::new(
            PRODUCER_LABEL,
            self.counters.snapshot(),
            elapsed,
        ))
    }

    /// Runs the query until `num_records` events have been observed.
    ///
    /// The clock starts once the reference table has caught up with the
    /// campaigns topic and stops when the completion monitor fires. Sealed
    /// topics are then drained so that the returned windows are final.
    pub async fn run_phase(&self, num_records: usize) -> Result<RunOutcome> {
        let events = self.broker.topic(&self.config.events_topic)?;
        if events.is_sealed() && events.len() < num_records {
            return Err(AdflowError::Execution(format!(
                "{} holds {} events, fewer than the {} to observe",
                events.name(),
                events.len(),
                num_records
            )));
        }

        self.counters.reset();
        let materializer =
            TableMaterializer::start(self.broker.clone(), &self.config.campaigns_topic)?;
        materializer.catch_up().await?;
        info!(
            "Reference table holds {} ads.",
            materializer.table().len()
        );

        let monitor = Arc::new(CompletionMonitor::new(num_records as u64));
        let aggregator = Arc::new(WindowedAggregator::with_retention(
            tumbling_window(self.config.window_size)?,
            self.config.retention,
        ));

        let start = Instant::now();
        let pipeline = EventPipeline::new(
            materializer.table(),
            self.counters.clone(),
            monitor.clone(),
        )
        .with_codec(EventCodec::new(self.config.encoding))
        .with_progress_interval(self.config.progress_interval)
        .spawn(
            events.subscribe(),
            aggregator.clone(),
            self.config.aggregate_workers,
            self.config.repartition_buffer,
        )?;

        let completed = match self.config.run_timeout {
            Some(timeout) => monitor.wait_timeout(timeout).await,
            None => {
                monitor.wait().await;
                Ok(())
            }
        };
        let elapsed = start.elapsed();
        if let Err(e) = completed {
            let stats = pipeline.shutdown();
            materializer.shutdown();
            warn!("Run phase aborted after {} events: {}", stats.ingested, e);
            return Err(e);
        }
        let report = Report::new(STREAMS_LABEL, self.counters.snapshot(), elapsed);

        let stats = if events.is_sealed() {
            pipeline.join().await?
        } else {
            pipeline.shutdown()
        };
        if self.broker.topic(&self.config.campaigns_topic)?.is_sealed() {
            materializer.join().await?;
        } else {
            materializer.shutdown();
        }

        Ok(RunOutcome {
            report,
            windows: aggregator.snapshot(),
            stats,
            late_records: aggregator.late_records(),
        })
    }
}
