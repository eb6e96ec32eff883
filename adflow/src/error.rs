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

//! Adflow error types

use std::error;
use std::fmt::{Display, Formatter};
use std::io;
use std::result;

/// Result type for operations that could result in an [AdflowError]
pub type Result<T> = result::Result<T, AdflowError>;

/// Adflow error
#[derive(Debug)]
pub enum AdflowError {
    /// Error associated to I/O operations and associated traits.
    IoError(io::Error),
    /// Error returned when serde_json failed to serialize or deserialize data.
    SerdeJson(serde_json::Error),
    /// Error returned when a payload cannot be compressed or decompressed.
    Compression(String),
    /// Error returned when a record cannot be published to, or consumed from,
    /// a channel. Transport errors are fatal to the current benchmark phase.
    Transport(String),
    /// Error returned when a record on a channel is malformed and cannot be
    /// decoded into the expected type.
    Serialization(String),
    /// Error returned when the benchmark configuration is invalid.
    Config(String),
    /// Error returned when a bounded wait expires before the awaited condition
    /// is reached.
    Timeout(String),
    /// Error returned during execution of the pipeline.
    Execution(String),
    /// Error returned as a consequence of an error in Adflow.
    /// This error should not happen in normal usage of Adflow.
    Internal(String),
}

impl From<io::Error> for AdflowError {
    fn from(e: io::Error) -> Self {
        AdflowError::IoError(e)
    }
}

impl From<serde_json::Error> for AdflowError {
    fn from(e: serde_json::Error) -> Self {
        AdflowError::SerdeJson(e)
    }
}

impl From<snap::Error> for AdflowError {
    fn from(e: snap::Error) -> Self {
        AdflowError::Compression(e.to_string())
    }
}

impl From<ini::ParseError> for AdflowError {
    fn from(e: ini::ParseError) -> Self {
        AdflowError::Config(e.to_string())
    }
}

impl From<tokio::task::JoinError> for AdflowError {
    fn from(e: tokio::task::JoinError) -> Self {
        AdflowError::Execution(e.to_string())
    }
}

impl From<&str> for AdflowError {
    fn from(e: &str) -> Self {
        AdflowError::Internal(e.to_string())
    }
}

impl Display for AdflowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            AdflowError::IoError(ref desc) => write!(f, "IO error: {}", desc),
            AdflowError::SerdeJson(ref desc) => write!(f, "serde_json error: {:?}", desc),
            AdflowError::Compression(ref desc) => write!(f, "Compression error: {}", desc),
            AdflowError::Transport(ref desc) => write!(f, "Transport error: {}", desc),
            AdflowError::Serialization(ref desc) => write!(f, "Serialization error: {}", desc),
            AdflowError::Config(ref desc) => write!(f, "Configuration error: {}", desc),
            AdflowError::Timeout(ref desc) => write!(f, "Timeout: {}", desc),
            AdflowError::Execution(ref desc) => write!(f, "Execution error: {}", desc),
            AdflowError::Internal(ref desc) => write!(
                f,
                "Internal error: {}. This is a bug in Adflow, please report it",
                desc
            ),
        }
    }
}

impl error::Error for AdflowError {}
