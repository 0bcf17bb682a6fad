//! Wire types for the tile channel.
//!
//! One JSON text message per request (client → server) and one per response
//! (server → client). A response echoes the identity of the request it answers
//! (`tilecoord`, `endpoint`, `index`, `type`, `params`), which is the only thing
//! the client uses to correlate it; arrival order carries no meaning.

use std::collections::BTreeMap;

use foundation::Extrema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StreamError;

/// Request parameters. A `BTreeMap` keeps serialisation order stable.
pub type TileParams = BTreeMap<String, Value>;

/// Tile coordinate in ZXY scheme, already wrapped into `[0, 2^z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Wrap x and y modulo `2^z` (equirectangular wraparound), so tiles panned
    /// past the antimeridian address the same data.
    pub fn wrapped(x: i64, y: i64, z: u8) -> Self {
        let n = Self::tiles_per_axis(z) as i64;
        Self {
            x: x.rem_euclid(n) as u32,
            y: y.rem_euclid(n) as u32,
            z,
        }
    }

    /// Same tile with x and y wrapped into `[0, 2^z)`.
    pub fn normalized(self) -> Self {
        Self::wrapped(i64::from(self.x), i64::from(self.y), self.z)
    }

    /// Number of tiles along one axis at zoom `z`. Zoom is capped at 32.
    pub fn tiles_per_axis(z: u8) -> u64 {
        1u64 << z.min(32)
    }
}

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRequest {
    pub tilecoord: TileCoord,
    pub endpoint: String,
    pub index: String,
    #[serde(rename = "type")]
    pub tile_type: String,
    #[serde(default)]
    pub params: TileParams,
}

impl TileRequest {
    pub fn new(
        endpoint: impl Into<String>,
        index: impl Into<String>,
        tile_type: impl Into<String>,
        tilecoord: TileCoord,
        params: TileParams,
    ) -> Self {
        Self {
            tilecoord: tilecoord.normalized(),
            endpoint: endpoint.into(),
            index: index.into(),
            tile_type: tile_type.into(),
            params,
        }
    }
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileResponse {
    pub tilecoord: TileCoord,
    pub endpoint: String,
    pub index: String,
    #[serde(rename = "type")]
    pub tile_type: String,
    #[serde(default)]
    pub params: TileParams,
    #[serde(default)]
    pub success: bool,
    /// Inline payload. When absent the payload is fetched over HTTP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Value range observed by the server for this tile, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extrema: Option<Extrema>,
}

impl TileResponse {
    /// Build the response a server would send for `request`.
    pub fn answering(request: &TileRequest, success: bool) -> Self {
        Self {
            tilecoord: request.tilecoord,
            endpoint: request.endpoint.clone(),
            index: request.index.clone(),
            tile_type: request.tile_type.clone(),
            params: request.params.clone(),
            success,
            data: None,
            extrema: None,
        }
    }
}

/// Decoded tile payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TileData {
    /// Row-major grid of `resolution²` bin values.
    Bins(Vec<f64>),
    /// Label → count (word clouds).
    Counts(BTreeMap<String, f64>),
    /// Label → ordered per-bucket counts (topic frequency).
    Frequencies(BTreeMap<String, Vec<f64>>),
    /// Nothing to draw.
    Empty,
}

impl TileData {
    /// Decode a binary body: a flat sequence of little-endian f64 values.
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, StreamError> {
        if bytes.len() % 8 != 0 {
            return Err(StreamError::BinaryLength(bytes.len()));
        }
        if bytes.is_empty() {
            return Ok(Self::Empty);
        }
        let bins = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                f64::from_le_bytes(buf)
            })
            .collect();
        Ok(Self::Bins(bins))
    }

    /// Decode a JSON payload: an array of bins, a `name → count` object, or a
    /// `name → [count, ...]` object.
    pub fn from_json(value: &Value) -> Result<Self, StreamError> {
        match value {
            Value::Null => Ok(Self::Empty),
            Value::Array(items) => {
                if items.is_empty() {
                    return Ok(Self::Empty);
                }
                Ok(Self::Bins(numbers(items)?))
            }
            Value::Object(map) => {
                if map.is_empty() {
                    return Ok(Self::Empty);
                }
                if map.values().all(Value::is_number) {
                    let counts = map
                        .iter()
                        .map(|(k, v)| (k.clone(), v.as_f64().unwrap_or(0.0)))
                        .collect();
                    return Ok(Self::Counts(counts));
                }
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    let Value::Array(items) = v else {
                        return Err(StreamError::UnexpectedPayload(format!(
                            "entry '{k}' is neither a count nor a count sequence"
                        )));
                    };
                    out.insert(k.clone(), numbers(items)?);
                }
                Ok(Self::Frequencies(out))
            }
            other => Err(StreamError::UnexpectedPayload(format!(
                "expected array or object, got {other}"
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bins(b) => b.is_empty(),
            Self::Counts(c) => c.is_empty(),
            Self::Frequencies(f) => f.is_empty(),
            Self::Empty => true,
        }
    }
}

fn numbers(items: &[Value]) -> Result<Vec<f64>, StreamError> {
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| StreamError::UnexpectedPayload(format!("non-numeric value {v}")))
        })
        .collect()
}
