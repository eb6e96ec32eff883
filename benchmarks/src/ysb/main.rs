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

//! Runs the Yahoo Streaming Benchmark against the in-memory broker.

use adflow::prelude::*;
use humantime::parse_duration;
use log::info;
use std::time::Duration;
use structopt::StructOpt;

#[derive(Default, Clone, Debug, StructOpt)]
pub struct YSBBenchmarkOpt {
    /// Phases to execute: load, run or all
    #[structopt(short = "m", long = "mode", default_value = "all")]
    pub mode: String,

    /// Number of events to publish and to observe
    #[structopt(short = "n", long = "records", default_value = "1000000")]
    pub records: usize,

    /// Number of campaigns in the reference table
    #[structopt(short = "c", long = "campaigns")]
    pub campaigns: Option<usize>,

    /// Number of ads per campaign
    #[structopt(short = "a", long = "ads")]
    pub ads: Option<usize>,

    /// Number of partitions of each topic
    #[structopt(short = "p", long = "partitions")]
    pub partitions: Option<usize>,

    /// Number of aggregation workers
    #[structopt(short = "w", long = "workers")]
    pub workers: Option<usize>,

    /// Upper bound on the run phase, e.g. "90s" or "5min"
    #[structopt(short = "t", long = "timeout", parse(try_from_str = parse_duration))]
    pub timeout: Option<Duration>,

    /// Compression of the event payloads: none, snappy, lz4 or zstd
    #[structopt(short = "e", long = "encoding")]
    pub encoding: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    ysb_benchmark(YSBBenchmarkOpt::from_args()).await?;
    Ok(())
}

fn benchmark_config(opt: &YSBBenchmarkOpt) -> Result<BenchmarkConfig> {
    let mut config = BenchmarkConfig::from_conf(&ADFLOW_CONF)?;
    if let Some(campaigns) = opt.campaigns {
        config.num_campaigns = campaigns;
    }
    if let Some(ads) = opt.ads {
        config.ads_per_campaign = ads;
    }
    if let Some(partitions) = opt.partitions {
        config.partitions = partitions;
    }
    if let Some(workers) = opt.workers {
        config.aggregate_workers = workers;
    }
    if let Some(timeout) = opt.timeout {
        config.run_timeout = Some(timeout);
    }
    if let Some(encoding) = &opt.encoding {
        config.encoding = encoding.parse::<Encoding>()?;
    }
    config.validate()?;
    Ok(config)
}

async fn ysb_benchmark(opt: YSBBenchmarkOpt) -> Result<()> {
    info!("Running the YSB benchmark with the following options: {:?}", opt);
    let mode = opt.mode.parse::<BenchmarkMode>()?;
    let config = benchmark_config(&opt)?;
    info!(
        "{} campaigns with {} ads each over {} partitions, {:?} payloads.",
        config.num_campaigns, config.ads_per_campaign, config.partitions, config.encoding
    );

    let benchmark = YahooBenchmark::new(config)?;
    for report in benchmark.execute(mode, opt.records).await? {
        println!("{}", report);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn command_line_overrides_defaults() -> Result<()> {
        let opt = YSBBenchmarkOpt::from_iter(vec![
            "ysb_bench", "-n", "10", "-c", "3", "-a", "2", "-t", "5s", "-e", "lz4",
        ]);
        let config = benchmark_config(&opt)?;
        assert_eq!(10, opt.records);
        assert_eq!(3, config.num_campaigns);
        assert_eq!(2, config.ads_per_campaign);
        assert_eq!(Some(Duration::from_secs(5)), config.run_timeout);
        assert_eq!(Encoding::Lz4, config.encoding);
        assert_eq!(BenchmarkConfig::default().partitions, config.partitions);
        Ok(())
    }

    #[tokio::test]
    async fn ysb_load_and_run() -> Result<()> {
        let opt = YSBBenchmarkOpt::from_iter(vec!["ysb_bench", "-n", "100", "-c", "4", "-a", "3"]);
        ysb_benchmark(opt).await
    }

    #[tokio::test]
    async fn invalid_mode_is_rejected() -> Result<()> {
        let opt = YSBBenchmarkOpt::from_iter(vec!["ysb_bench", "-m", "replay"]);
        assert!(ysb_benchmark(opt).await.is_err());
        Ok(())
    }
}
