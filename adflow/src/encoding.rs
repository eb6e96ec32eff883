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

//! Codecs turn the typed records of the benchmark into the bytes carried by a
//! channel and back. A codec is chosen statically for each channel when the
//! generator and the pipeline are constructed.
//!
//! `Encoding` is a compression/decompression step that can be layered under
//! the JSON codec to trade CPU for smaller event payloads.

use crate::datasource::ysb::{CampaignAd, ProjectedEvent};
use crate::error::{AdflowError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::marker::PhantomData;
use std::str::FromStr;

/// A compressor/decompressor type.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum Encoding {
    /// Snappy is a LZ77-type compressor with a fixed, byte-oriented encoding.
    /// It does not aim for maximum compression, or compatibility with any other
    /// compression library; instead, it aims for very high speeds and
    /// reasonable compression.
    /// <https://github.com/burntsushi/rust-snappy>
    Snappy,
    /// LZ4 is a very fast lossless compression algorithm, providing compression
    /// speed at 400 MB/s per core, with near-linear scalability for
    /// multi-threaded applications.
    /// <https://github.com/bozaro/lz4-rs>
    Lz4,
    /// A fast lossless compression algorithm, targeting real-time compression
    /// scenarios at zlib-level and better compression ratios. <https://github.com/facebook/zstd>
    Zstd,
    /// No compression/decompression applied to the payload.
    None,
}

impl Default for Encoding {
    fn default() -> Encoding {
        Encoding::None
    }
}

impl FromStr for Encoding {
    type Err = AdflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "snappy" => Ok(Encoding::Snappy),
            "lz4" => Ok(Encoding::Lz4),
            "zstd" => Ok(Encoding::Zstd),
            "none" => Ok(Encoding::None),
            _ => Err(AdflowError::Config(format!("unknown encoding `{}`", s))),
        }
    }
}

impl Encoding {
    /// Compress data
    pub fn compress(&self, s: &[u8]) -> Result<Vec<u8>> {
        match *self {
            Encoding::Snappy => {
                let mut encoder = snap::raw::Encoder::new();
                Ok(encoder.compress_vec(s)?)
            }
            Encoding::Lz4 => lz4::block::compress(s, None, true)
                .map_err(|e| AdflowError::Compression(e.to_string())),
            Encoding::Zstd => zstd::stream::encode_all(Cursor::new(s), 3)
                .map_err(|e| AdflowError::Compression(e.to_string())),
            Encoding::None => Ok(s.to_vec()),
        }
    }

    /// Decompress data
    pub fn decompress(&self, s: &[u8]) -> Result<Vec<u8>> {
        match *self {
            Encoding::Snappy => {
                let mut decoder = snap::raw::Decoder::new();
                Ok(decoder.decompress_vec(s)?)
            }
            Encoding::Lz4 => lz4::block::decompress(s, None)
                .map_err(|e| AdflowError::Compression(e.to_string())),
            Encoding::Zstd => zstd::stream::decode_all(Cursor::new(s))
                .map_err(|e| AdflowError::Compression(e.to_string())),
            Encoding::None => Ok(s.to_vec()),
        }
    }
}

/// A typed serializer/deserializer for the values of one channel.
pub trait Codec<T>: Send + Sync {
    /// Serializes `value` into the bytes published on the channel.
    fn encode(&self, value: &T) -> Result<Vec<u8>>;
    /// Deserializes a value read from the channel.
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// Field-name tagged JSON, optionally compressed. Unknown fields are ignored on
/// decode, so producers may add attributes without breaking old consumers.
#[derive(Debug, Clone)]
pub struct JsonCodec<T> {
    encoding: Encoding,
    _marker:  PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    /// Creates a codec that compresses its output with `encoding`.
    pub fn new(encoding: Encoding) -> Self {
        JsonCodec {
            encoding,
            _marker: PhantomData,
        }
    }

    /// Returns the compression applied by this codec.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        JsonCodec::new(Encoding::None)
    }
}

impl<T: Serialize + DeserializeOwned> Codec<T> for JsonCodec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(value)?;
        match self.encoding {
            Encoding::None => Ok(json),
            encoding => encoding.compress(&json),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        let value = match self.encoding {
            Encoding::None => serde_json::from_slice(bytes),
            encoding => serde_json::from_slice(&encoding.decompress(bytes)?),
        };
        value.map_err(|e| AdflowError::Serialization(e.to_string()))
    }
}

/// The codec of the events channel.
pub type EventCodec = JsonCodec<ProjectedEvent>;

/// The codec of the campaigns channel: a UTF-8 `ad_id:campaign_id` string.
#[derive(Debug, Clone, Copy, Default)]
pub struct CampaignCodec;

impl Codec<CampaignAd> for CampaignCodec {
    fn encode(&self, value: &CampaignAd) -> Result<Vec<u8>> {
        Ok(value.to_string().into_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> Result<CampaignAd> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| AdflowError::Serialization(format!("campaign row: {}", e)))?;
        s.parse::<CampaignAd>()
    }
}
