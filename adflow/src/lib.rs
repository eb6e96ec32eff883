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

#![warn(missing_docs, clippy::needless_borrow)]
// Clippy lints, some should be disabled incrementally
#![allow(
    clippy::module_inception,
    clippy::new_without_default,
    clippy::type_complexity,
    clippy::upper_case_acronyms
)]

//! Adflow is a small stateful stream-processing engine that runs the Yahoo
//! Streaming Benchmark (YSB) ad-campaign workload: raw ad events are filtered,
//! projected, joined against a changelog-backed campaign table, rekeyed by
//! campaign and counted in tumbling event-time windows.

pub mod broker;
pub mod configs;
pub mod datasource;
pub mod driver;
pub mod encoding;
pub mod error;
pub mod prelude;
pub mod runtime;
pub mod state;
pub mod stream;

#[cfg(test)]
mod tests;
