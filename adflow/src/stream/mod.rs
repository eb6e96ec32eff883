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

//! A stream is unbounded, so aggregations over it are bounded by windows. The
//! benchmark query uses tumbling windows defined in terms of event time: each
//! record belongs to exactly one fixed-size, non-overlapping interval, decided
//! solely by its own timestamp and independent of when it arrives.

mod window;

pub use window::{tumbling_window, Retention, TumblingWindow};
