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

//! Configuration settings that affect all crates in current system.

use crate::encoding::Encoding;
use crate::error::{AdflowError, Result};
use crate::stream::Retention;
use humantime::parse_duration;
use ini::Ini;
use lazy_static::lazy_static;
use std::str::FromStr;
use std::time::Duration;

lazy_static! {
    /// Global settings.
    pub static ref ADFLOW_CONF: Ini = Ini::load_from_str(include_str!("./config.toml")).unwrap();
}

/// The tunables of a YSB run. Defaults come from [`ADFLOW_CONF`] and can be
/// overridden field by field by the driver's command line.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkConfig {
    /// Name of the reference table topic.
    pub campaigns_topic:    String,
    /// Name of the ad event topic.
    pub events_topic:       String,
    /// Number of campaigns generated in the load phase.
    pub num_campaigns:      usize,
    /// Number of ads per campaign.
    pub ads_per_campaign:   usize,
    /// Tumbling window size in milliseconds.
    pub window_size:        u64,
    /// A progress line is logged every `progress_interval` observed records.
    pub progress_interval:  u64,
    /// How many windows the aggregator keeps.
    pub retention:          Retention,
    /// Number of partitions of each topic.
    pub partitions:         usize,
    /// Number of aggregation workers behind the rekey stage.
    pub aggregate_workers:  usize,
    /// Capacity of each repartition queue between the join and the aggregator.
    pub repartition_buffer: usize,
    /// Compression applied to serialized events.
    pub encoding:           Encoding,
    /// Upper bound on the run phase's completion wait. `None` waits forever.
    pub run_timeout:        Option<Duration>,
}

impl BenchmarkConfig {
    /// Builds a configuration from the given settings.
    pub fn from_conf(conf: &Ini) -> Result<Self> {
        let retention = match parse::<usize>(conf, "ysb", "window_retention")? {
            0 => Retention::Unbounded,
            k => Retention::Latest(k),
        };
        let run_timeout = match get(conf, "runtime", "run_timeout")? {
            "none" => None,
            s => Some(parse_duration(s).map_err(|e| {
                AdflowError::Config(format!("runtime.run_timeout `{}`: {}", s, e))
            })?),
        };

        let config = BenchmarkConfig {
            campaigns_topic: get(conf, "ysb", "campaigns_topic")?.to_string(),
            events_topic: get(conf, "ysb", "events_topic")?.to_string(),
            num_campaigns: parse(conf, "ysb", "num_campaigns")?,
            ads_per_campaign: parse(conf, "ysb", "ads_per_campaign")?,
            window_size: parse(conf, "ysb", "window_size")?,
            progress_interval: parse(conf, "ysb", "progress_interval")?,
            retention,
            partitions: parse(conf, "broker", "partitions")?,
            aggregate_workers: parse(conf, "runtime", "aggregate_workers")?,
            repartition_buffer: parse(conf, "runtime", "repartition_buffer")?,
            encoding: Encoding::from_str(get(conf, "runtime", "encoding")?)?,
            run_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that would otherwise make the pipeline misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.campaigns_topic == self.events_topic {
            return Err(AdflowError::Config(format!(
                "campaigns and events must use distinct topics, both are `{}`",
                self.events_topic
            )));
        }
        let positive = [
            ("ysb.window_size", self.window_size as usize),
            ("ysb.progress_interval", self.progress_interval as usize),
            ("broker.partitions", self.partitions),
            ("runtime.aggregate_workers", self.aggregate_workers),
            ("runtime.repartition_buffer", self.repartition_buffer),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(AdflowError::Config(format!("{} must be positive", key)));
            }
        }
        Ok(())
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig::from_conf(&ADFLOW_CONF).unwrap()
    }
}

fn get<'a>(conf: &'a Ini, section: &str, key: &str) -> Result<&'a str> {
    conf.get_from(Some(section), key)
        .ok_or_else(|| AdflowError::Config(format!("missing setting {}.{}", section, key)))
}

fn parse<T: FromStr>(conf: &Ini, section: &str, key: &str) -> Result<T> {
    let value = get(conf, section, key)?;
    value.parse::<T>().map_err(|_| {
        AdflowError::Config(format!("invalid value `{}` for {}.{}", value, section, key))
    })
}
