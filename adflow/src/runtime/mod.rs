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

//! The benchmark runtime: the components of the query and the instruments the
//! driver uses to measure it.

mod aggregate;
mod completion;
mod counters;
mod pipeline;
mod table;

pub use aggregate::WindowedAggregator;
pub use completion::{CompletionMonitor, CompletionState};
pub use counters::{CounterSnapshot, RunCounters};
pub use pipeline::{
    campaign_of, is_view, project, rekey, EventPipeline, Joiner, Keyed, Mapper, PipelineStats,
    PipelineSummary, Predicate, RunningPipeline,
};
pub use table::{MaterializerStats, ReferenceTable, TableMaterializer};
