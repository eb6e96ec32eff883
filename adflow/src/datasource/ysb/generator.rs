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

//! The data generator for YSB.

use crate::broker::Producer;
use crate::datasource::date::{current_millis, Clock};
use crate::datasource::ysb::event::{CampaignAd, EventType, ProjectedEvent};
use crate::encoding::{CampaignCodec, Codec, EventCodec};
use crate::error::Result;
use crate::runtime::RunCounters;
use log::{info, warn};
use rand::prelude::SliceRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// The ad format every generated event carries.
const AD_TYPE: &str = "banner78";
/// The user address every generated event carries.
const IP_ADDRESS: &str = "1.2.3.4";

/// A generator for the Yahoo Streaming Benchmark.
///
/// Campaign rows and events are published through any [`Producer`], and every
/// published record is accounted in the shared [`RunCounters`].
pub struct YSBGenerator {
    campaigns_topic: String,
    events_topic:    String,
    rng:             StdRng,
    clock:           Clock,
    codec:           EventCodec,
    user_id:         String,
    page_id:         String,
}

impl YSBGenerator {
    /// Creates a generator publishing to `campaigns_topic` and `events_topic`.
    pub fn new(campaigns_topic: impl Into<String>, events_topic: impl Into<String>) -> Self {
        YSBGenerator {
            campaigns_topic: campaigns_topic.into(),
            events_topic:    events_topic.into(),
            rng:             StdRng::from_entropy(),
            clock:           current_millis,
            codec:           EventCodec::default(),
            user_id:         Uuid::new_v4().to_string(),
            page_id:         Uuid::new_v4().to_string(),
        }
    }

    /// Makes the event stream reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Replaces the source of event timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the codec of the events topic.
    pub fn with_codec(mut self, codec: EventCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Publishes `num_campaigns * ads_per_campaign` campaign rows keyed by
    /// ad and returns the ads in publish order.
    pub async fn generate_campaigns(
        &mut self,
        producer: &dyn Producer,
        counters: &RunCounters,
        num_campaigns: usize,
        ads_per_campaign: usize,
    ) -> Result<Vec<String>> {
        let codec = CampaignCodec;
        let mut ads = Vec::with_capacity(num_campaigns * ads_per_campaign);
        for _ in 0..num_campaigns {
            let campaign_id = Uuid::new_v4().to_string();
            for _ in 0..ads_per_campaign {
                let row = CampaignAd::new(Uuid::new_v4().to_string(), campaign_id.clone());
                let value = codec.encode(&row)?;
                let bytes = value.len() + row.ad_id.len();
                producer
                    .send(&self.campaigns_topic, &row.ad_id, value)
                    .await?;
                counters.record(bytes);
                ads.push(row.ad_id);
            }
        }
        info!(
            "Published {} campaigns with {} ads each to {}.",
            num_campaigns, ads_per_campaign, self.campaigns_topic
        );
        Ok(ads)
    }

    /// Publishes `num_records` events referencing ads drawn uniformly from
    /// `ads`. Returns the time spent publishing.
    pub async fn generate_events(
        &mut self,
        producer: &dyn Producer,
        counters: &RunCounters,
        num_records: usize,
        ads: &[String],
    ) -> Result<Duration> {
        if ads.is_empty() && num_records > 0 {
            warn!(
                "No ads to reference; skipping {} events for {}.",
                num_records, self.events_topic
            );
            return Ok(Duration::from_secs(0));
        }

        let start = Instant::now();
        let mut event = ProjectedEvent {
            event_type: EventType::View,
            ad_id:      String::new(),
            event_time: 0,
            user_id:    Some(self.user_id.clone()),
            page_id:    Some(self.page_id.clone()),
            add_type:   Some(AD_TYPE.to_string()),
            ip_address: Some(IP_ADDRESS.to_string()),
        };
        for _ in 0..num_records {
            let ad_id = match ads.choose(&mut self.rng) {
                Some(ad_id) => ad_id,
                None => break,
            };
            event.event_type = self.next_event_type();
            event.ad_id.clone_from(ad_id);
            event.event_time = (self.clock)();

            let value = self.codec.encode(&event)?;
            let bytes = value.len() + ad_id.len();
            producer.send(&self.events_topic, ad_id, value).await?;
            counters.record(bytes);
        }

        let elapsed = start.elapsed();
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        info!(
            "Published {} events to {} in {} ({:.0} events/s).",
            num_records,
            self.events_topic,
            humantime::format_duration(elapsed),
            num_records as f64 / secs
        );
        Ok(elapsed)
    }

    fn next_event_type(&mut self) -> EventType {
        *EventType::ALL
            .choose(&mut self.rng)
            .unwrap_or(&EventType::View)
    }
}
