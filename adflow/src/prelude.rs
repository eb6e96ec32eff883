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

//! A "prelude" for users of the adflow crate.
//!
//! Like the standard library's prelude, this module simplifies importing of
//! common items. Unlike the standard prelude, the contents of this module must
//! be imported manually:
//!
//! ```
//! use adflow::prelude::*;
//! ```

pub use crate::broker::{MemoryBroker, Producer, Record, Subscription};
pub use crate::configs::{BenchmarkConfig, ADFLOW_CONF};
pub use crate::datasource::ysb::{self, CampaignAd, EventType, ProjectedEvent, YSBGenerator};
pub use crate::driver::{BenchmarkMode, Report, RunOutcome, YahooBenchmark};
pub use crate::encoding::{CampaignCodec, Codec, Encoding, EventCodec};
pub use crate::error::{AdflowError, Result};
pub use crate::runtime::{
    CompletionMonitor, CompletionState, EventPipeline, PipelineStats, PipelineSummary,
    ReferenceTable, RunCounters, TableMaterializer, WindowedAggregator,
};
pub use crate::state::{WindowKey, WindowStore, WindowedCount};
pub use crate::stream::{Retention, TumblingWindow};
