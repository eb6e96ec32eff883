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

//! End-to-end runs of the benchmark query over the in-memory broker.

use crate::prelude::*;
use crate::stream::tumbling_window;
use std::sync::Arc;
use std::time::Duration;

async fn publish_campaigns(broker: &MemoryBroker, rows: &[(&str, &str)]) -> Result<()> {
    let codec = CampaignCodec;
    for (ad, campaign) in rows {
        let row = CampaignAd::new(*ad, *campaign);
        broker.send("campaigns", ad, codec.encode(&row)?).await?;
    }
    broker.seal("campaigns")
}

async fn publish_events(
    broker: &MemoryBroker,
    events: &[(EventType, &str, u64)],
) -> Result<()> {
    let codec = EventCodec::default();
    for (event_type, ad, event_time) in events {
        let event = ProjectedEvent {
            event_type: *event_type,
            ad_id:      ad.to_string(),
            event_time: *event_time,
            user_id:    None,
            page_id:    None,
            add_type:   None,
            ip_address: None,
        };
        broker.send("events", ad, codec.encode(&event)?).await?;
    }
    broker.seal("events")
}

async fn run_query(
    broker: Arc<MemoryBroker>,
    target: u64,
) -> Result<(Arc<WindowedAggregator>, PipelineSummary)> {
    let materializer = TableMaterializer::start(broker.clone(), "campaigns")?;
    materializer.catch_up().await?;
    let monitor = Arc::new(CompletionMonitor::new(target));
    let aggregator = Arc::new(WindowedAggregator::new(tumbling_window(10_000)?));
    let running = EventPipeline::new(
        materializer.table(),
        Arc::new(RunCounters::new()),
        monitor.clone(),
    )
    .spawn(broker.subscribe("events")?, aggregator.clone(), 3, 2)?;

    monitor.wait_timeout(Duration::from_secs(10)).await?;
    let summary = running.join().await?;
    materializer.join().await?;
    Ok((aggregator, summary))
}

fn broker() -> Result<Arc<MemoryBroker>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let broker = Arc::new(MemoryBroker::new());
    broker.create_topic("campaigns", 2)?;
    broker.create_topic("events", 4)?;
    Ok(broker)
}

#[tokio::test]
async fn views_are_counted_per_event_time_window() -> Result<()> {
    let broker = broker()?;
    publish_campaigns(&broker, &[("a1", "C1"), ("a2", "C1"), ("a3", "C2")]).await?;
    publish_events(
        &broker,
        &[
            (EventType::View, "a1", 1_000),
            (EventType::View, "a2", 9_999),
            (EventType::Click, "a1", 5_000),
            (EventType::View, "a3", 10_000),
            (EventType::View, "a1", 10_500),
            (EventType::Purchase, "a3", 10_600),
            (EventType::View, "a2", 25_000),
            (EventType::View, "a1", 2_500),
        ],
    )
    .await?;

    let (aggregator, summary) = run_query(broker, 8).await?;
    assert_eq!(8, summary.ingested);
    assert_eq!(2, summary.filtered);
    assert_eq!(6, summary.emitted);

    assert_eq!(3, aggregator.count("C1", 0));
    assert_eq!(1, aggregator.count("C1", 10_000));
    assert_eq!(1, aggregator.count("C1", 20_000));
    assert_eq!(1, aggregator.count("C2", 10_000));
    assert_eq!(0, aggregator.count("C2", 0));
    assert_eq!(
        vec![
            WindowedCount {
                campaign_id:  "C1".to_string(),
                window_start: 0,
                count:        3,
            },
            WindowedCount {
                campaign_id:  "C1".to_string(),
                window_start: 10_000,
                count:        1,
            },
            WindowedCount {
                campaign_id:  "C1".to_string(),
                window_start: 20_000,
                count:        1,
            },
            WindowedCount {
                campaign_id:  "C2".to_string(),
                window_start: 10_000,
                count:        1,
            },
        ],
        aggregator.snapshot()
    );
    Ok(())
}

#[tokio::test]
async fn unknown_ads_are_dropped_silently() -> Result<()> {
    let broker = broker()?;
    publish_campaigns(&broker, &[("a1", "C1")]).await?;
    publish_events(
        &broker,
        &[
            (EventType::View, "ghost-1", 1_000),
            (EventType::View, "ghost-2", 2_000),
        ],
    )
    .await?;

    let (aggregator, summary) = run_query(broker, 2).await?;
    assert_eq!(2, summary.join_misses);
    assert_eq!(0, summary.emitted);
    assert!(aggregator.snapshot().is_empty());
    Ok(())
}

#[tokio::test]
async fn joins_use_the_latest_campaign_of_an_ad() -> Result<()> {
    let broker = broker()?;
    publish_campaigns(&broker, &[("a1", "C1"), ("a1", "C2"), ("a2", "C3")]).await?;
    publish_events(
        &broker,
        &[(EventType::View, "a1", 1_000), (EventType::View, "a2", 1_000)],
    )
    .await?;

    let (aggregator, _) = run_query(broker, 2).await?;
    assert_eq!(0, aggregator.count("C1", 0));
    assert_eq!(1, aggregator.count("C2", 0));
    assert_eq!(1, aggregator.count("C3", 0));
    Ok(())
}

#[tokio::test]
async fn every_generated_view_reaches_the_aggregator() -> Result<()> {
    let broker = broker()?;
    let counters = RunCounters::new();
    let mut generator = YSBGenerator::new("campaigns", "events").with_seed(11);
    let ads = generator
        .generate_campaigns(broker.as_ref(), &counters, 4, 5)
        .await?;
    broker.seal("campaigns")?;
    generator
        .generate_events(broker.as_ref(), &counters, 1_000, &ads)
        .await?;
    broker.seal("events")?;

    let codec = EventCodec::default();
    let mut views = 0;
    for mut sub in broker.subscribe("events")? {
        while let Some(batch) = sub.next_batch(128).await? {
            views += batch
                .iter()
                .map(|r| codec.decode(&r.value))
                .collect::<Result<Vec<_>>>()?
                .iter()
                .filter(|e| e.event_type == EventType::View)
                .count() as u64;
        }
    }

    let (aggregator, summary) = run_query(broker, 1_000).await?;
    assert_eq!(views, summary.emitted);
    assert_eq!(
        views,
        aggregator.snapshot().iter().map(|w| w.count).sum::<u64>()
    );
    let campaigns = aggregator
        .snapshot()
        .into_iter()
        .map(|w| w.campaign_id)
        .collect::<std::collections::HashSet<_>>();
    assert!(campaigns.len() <= 4);
    Ok(())
}

#[tokio::test]
async fn compressed_benchmark_end_to_end() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    for encoding in [Encoding::Snappy, Encoding::Lz4, Encoding::Zstd] {
        let benchmark = YahooBenchmark::new(BenchmarkConfig {
            num_campaigns: 10,
            ads_per_campaign: 3,
            encoding,
            run_timeout: Some(Duration::from_secs(30)),
            ..BenchmarkConfig::default()
        })?;
        let reports = benchmark.execute(BenchmarkMode::All, 300).await?;
        assert_eq!(2, reports.len());
        assert_eq!(300, reports[0].records);
        assert!(reports[0].to_string().starts_with("Producer Performance"));
        assert_eq!(300, reports[1].records);
        assert!(reports[1]
            .to_string()
            .starts_with("Streams Yahoo Performance"));
    }
    Ok(())
}

#[tokio::test]
async fn bounded_retention_keeps_recent_windows() -> Result<()> {
    let benchmark = YahooBenchmark::new(BenchmarkConfig {
        num_campaigns: 2,
        ads_per_campaign: 2,
        retention: Retention::Latest(1),
        run_timeout: Some(Duration::from_secs(30)),
        ..BenchmarkConfig::default()
    })?;
    benchmark.load_phase(100).await?;
    let outcome = benchmark.run_phase(100).await?;

    let starts = outcome
        .windows
        .iter()
        .map(|w| w.window_start)
        .collect::<std::collections::HashSet<_>>();
    assert!(starts.len() <= 1);
    let counted = outcome.windows.iter().map(|w| w.count).sum::<u64>();
    assert!(outcome.stats.emitted >= counted + outcome.late_records);
    Ok(())
}
