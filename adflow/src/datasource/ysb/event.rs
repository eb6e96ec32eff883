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

//! YSB Ad Event.

use crate::datasource::date::Millis;
use crate::error::{AdflowError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of interaction an ad event records.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// The ad was displayed.
    View,
    /// The ad was clicked.
    Click,
    /// The ad led to a purchase.
    Purchase,
}

impl EventType {
    /// All event types, in the order the generator samples them from.
    pub const ALL: [EventType; 3] = [EventType::View, EventType::Click, EventType::Purchase];

    /// Returns the wire name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::View => "view",
            EventType::Click => "click",
            EventType::Purchase => "purchase",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw ad interaction.
///
/// Only `event_type`, `ad_id` and `event_time` are used by the query; the
/// remaining attributes inflate the record to a realistic size and are dropped
/// by the projection stage.
#[derive(Debug, Eq, PartialEq, Clone, Serialize, Deserialize)]
pub struct ProjectedEvent {
    /// One of "view", "click", and "purchase".
    #[serde(rename = "eventType")]
    pub event_type: EventType,
    /// A UUID for the specific advertisement that was interacted with.
    #[serde(rename = "adID")]
    pub ad_id:      String,
    /// The producer-side timestamp in milliseconds of the time the event
    /// occurred.
    #[serde(rename = "eventTime")]
    pub event_time: Millis,
    /// A UUID identifying the user that caused the event.
    #[serde(rename = "userID", default, skip_serializing_if = "Option::is_none")]
    pub user_id:    Option<String>,
    /// A UUID identifying the page on which the event occurred.
    #[serde(rename = "pageID", default, skip_serializing_if = "Option::is_none")]
    pub page_id:    Option<String>,
    /// The ad format, e.g. "banner78".
    #[serde(rename = "addType", default, skip_serializing_if = "Option::is_none")]
    pub add_type:   Option<String>,
    /// A string of the user's IP address.
    #[serde(rename = "ipAddress", default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

impl ProjectedEvent {
    /// Returns a newly allocated copy that carries only the attributes the
    /// query reads.
    pub fn projected(&self) -> ProjectedEvent {
        ProjectedEvent {
            event_type: self.event_type,
            ad_id:      self.ad_id.clone(),
            event_time: self.event_time,
            user_id:    None,
            page_id:    None,
            add_type:   None,
            ip_address: None,
        }
    }

    /// Returns true if the event carries no filler attributes.
    pub fn is_projected(&self) -> bool {
        self.user_id.is_none()
            && self.page_id.is_none()
            && self.add_type.is_none()
            && self.ip_address.is_none()
    }
}

/// Campaigns map from ad_id to campaign_id.
#[derive(Debug, Eq, PartialEq, Clone, Hash, Serialize, Deserialize)]
pub struct CampaignAd {
    /// A UUID for the specific advertisement.
    pub ad_id:       String,
    /// A UUID for the campaign that the ad belongs to.
    pub campaign_id: String,
}

impl CampaignAd {
    /// Creates a new reference row.
    pub fn new(ad_id: impl Into<String>, campaign_id: impl Into<String>) -> Self {
        CampaignAd {
            ad_id:       ad_id.into(),
            campaign_id: campaign_id.into(),
        }
    }
}

impl fmt::Display for CampaignAd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ad_id, self.campaign_id)
    }
}

impl FromStr for CampaignAd {
    type Err = AdflowError;

    /// Parses `ad_id:campaign_id`, splitting on the first colon.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((ad_id, campaign_id)) if !ad_id.is_empty() && !campaign_id.is_empty() => {
                Ok(CampaignAd::new(ad_id, campaign_id))
            }
            _ => Err(AdflowError::Serialization(format!(
                "malformed campaign row `{}`",
                s
            ))),
        }
    }
}
