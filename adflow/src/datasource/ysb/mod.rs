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

//! Yahoo Streaming Benchmark Suite.
//!
//! The workload models an ad network: a reference table maps every ad to the
//! campaign it belongs to, and an unbounded stream of impressions, clicks and
//! purchases references those ads. The query counts the views of every
//! campaign in tumbling event-time windows.

pub mod event;
pub mod generator;

pub use event::{CampaignAd, EventType, ProjectedEvent};
pub use generator::YSBGenerator;
