use serde::{Deserialize, Serialize};
use streaming::{FetchedTile, TileCoord, TileRequest, TileSource};
use tracing::warn;

use crate::capabilities::HasParams;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LayerId(pub u64);

pub trait Layer {
    fn id(&self) -> LayerId;
}

/// Server-side identity of the data a layer draws.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMeta {
    pub endpoint: String,
    pub index: String,
    #[serde(rename = "type")]
    pub tile_type: String,
}

impl LayerMeta {
    pub fn new(endpoint: impl Into<String>, index: impl Into<String>, tile_type: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            index: index.into(),
            tile_type: tile_type.into(),
        }
    }
}

/// A layer whose tiles are requested from the tile server.
pub trait TileLayer: Layer + HasParams {
    fn meta(&self) -> &LayerMeta;

    /// Request for `coord` under the layer's current parameters.
    fn tile_request(&self, coord: TileCoord) -> TileRequest {
        let meta = self.meta();
        TileRequest::new(
            meta.endpoint.clone(),
            meta.index.clone(),
            meta.tile_type.clone(),
            coord,
            self.layer_state().params().to_tile_params(),
        )
    }
}

/// Outcome of drawing one tile.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome<T> {
    /// Output for the tile. `invalidated` lists earlier tiles whose rendering
    /// is stale because this tile widened the layer's extrema.
    Drawn { output: T, invalidated: Vec<TileCoord> },
    /// The tile widened the extrema under [`crate::ExtremaPolicy::Abort`].
    Aborted,
    /// Nothing to draw (no data, or the request failed).
    Blank,
}

impl<T> RenderOutcome<T> {
    pub fn drawn(output: T) -> Self {
        Self::Drawn {
            output,
            invalidated: Vec::new(),
        }
    }

    pub fn output(&self) -> Option<&T> {
        match self {
            Self::Drawn { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn into_output(self) -> Option<T> {
        match self {
            Self::Drawn { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn invalidated(&self) -> &[TileCoord] {
        match self {
            Self::Drawn { invalidated, .. } => invalidated,
            _ => &[],
        }
    }
}

/// Fetch `coord` under the layer's current parameters, logging a failure.
pub(crate) async fn fetch_tile<L: TileLayer>(layer: &L, source: &TileSource, coord: TileCoord) -> Option<FetchedTile> {
    match source.fetch(layer.tile_request(coord)).await {
        Ok(tile) => Some(tile),
        Err(err) => {
            warn!(
                layer = layer.id().0,
                tile_type = %layer.meta().tile_type,
                x = coord.x,
                y = coord.y,
                z = coord.z,
                %err,
                "tile request failed; leaving tile blank"
            );
            None
        }
    }
}
