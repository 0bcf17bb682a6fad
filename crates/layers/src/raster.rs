use foundation::{Extrema, ScaleKind};
use serde::{Deserialize, Serialize};
use streaming::{FetchedTile, TileCoord, TileData, TileSource};
use tracing::{debug, warn};

use crate::capabilities::*;
use crate::error::LayerError;
use crate::layer::{Layer, LayerId, LayerMeta, RenderOutcome, TileLayer, fetch_tile};
use crate::state::{DrawnTiles, ExtremaPolicy, LayerState, Observation};
use crate::symbology::{ColorRamp, TileImage, rasterize, scale_nearest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    pub tile_size: u32,
    pub scale: ScaleKind,
    pub policy: ExtremaPolicy,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            scale: ScaleKind::Log,
            policy: ExtremaPolicy::Redraw,
        }
    }
}

/// Binned counts coloured through a ramp.
#[derive(Debug, Clone)]
pub struct HeatmapLayer {
    id: LayerId,
    meta: LayerMeta,
    state: LayerState,
    ramp: ColorRamp,
    pub config: HeatmapConfig,
    drawn: DrawnTiles<Vec<f64>>,
}

impl HeatmapLayer {
    pub fn new(id: u64, meta: LayerMeta, config: HeatmapConfig) -> Self {
        Self {
            id: LayerId(id),
            meta,
            state: LayerState::new(),
            ramp: ColorRamp::default(),
            config,
            drawn: DrawnTiles::new(),
        }
    }

    /// Request, decode and draw one tile. Failures are logged and leave the
    /// tile blank.
    pub async fn draw(&mut self, source: &TileSource, coord: TileCoord) -> RenderOutcome<TileImage> {
        let Some(tile) = fetch_tile(&*self, source, coord).await else {
            return RenderOutcome::Blank;
        };
        self.render(coord, &tile).unwrap_or_else(|err| {
            warn!(layer = self.id.0, x = coord.x, y = coord.y, z = coord.z, %err, "heatmap tile not drawn");
            RenderOutcome::Blank
        })
    }

    /// Draw a fetched tile, merging its value range into the layer extrema.
    pub fn render(&mut self, coord: TileCoord, tile: &FetchedTile) -> Result<RenderOutcome<TileImage>, LayerError> {
        let bins = match &tile.data {
            TileData::Bins(bins) if !bins.is_empty() => bins,
            TileData::Bins(_) | TileData::Empty => return Ok(RenderOutcome::Blank),
            _ => return Err(LayerError::UnexpectedData { expected: "bins" }),
        };
        let resolution = self.bin_resolution(bins.len())?;

        let mut observed = Extrema::of(bins).unwrap_or(Extrema::EMPTY);
        if let Some(reported) = tile.extrema {
            observed.widen(reported);
        }

        self.drawn.sync(self.state.generation());
        let invalidated = match self.state.observe(observed, self.config.policy) {
            Observation::Unchanged => Vec::new(),
            Observation::Widened => self.drawn.others(coord),
            Observation::Abort => {
                debug!(layer = self.id.0, "extrema widened; render abandoned");
                return Ok(RenderOutcome::Aborted);
            }
        };

        let image = self.paint(bins, resolution)?;
        self.drawn.insert(coord, bins.clone());
        Ok(RenderOutcome::Drawn {
            output: image,
            invalidated,
        })
    }

    /// Repaint a previously drawn tile against the current extrema and ramp.
    pub fn redraw(&mut self, coord: TileCoord) -> Option<TileImage> {
        self.drawn.sync(self.state.generation());
        let bins = self.drawn.get(&coord)?;
        let resolution = self.bin_resolution(bins.len()).ok()?;
        self.paint(bins, resolution).ok()
    }

    /// Forget a tile that left the viewport.
    pub fn unload(&mut self, coord: TileCoord) {
        self.drawn.remove(&coord);
    }

    fn paint(&self, bins: &[f64], resolution: u32) -> Result<TileImage, LayerError> {
        let raw = rasterize(bins, resolution, self.state.extrema(), &self.ramp, self.config.scale)?;
        Ok(scale_nearest(&raw, self.config.tile_size, self.config.tile_size))
    }

    /// The configured resolution, or the square root of the bin count when unset.
    fn bin_resolution(&self, len: usize) -> Result<u32, LayerError> {
        if let Some(resolution) = self.resolution() {
            let expected = resolution as usize * resolution as usize;
            if expected != len {
                return Err(LayerError::BinCount {
                    resolution,
                    expected,
                    actual: len,
                });
            }
            return Ok(resolution);
        }
        let side = (len as f64).sqrt().round() as u32;
        if side as usize * side as usize != len {
            return Err(LayerError::BinCount {
                resolution: side,
                expected: side as usize * side as usize,
                actual: len,
            });
        }
        Ok(side)
    }
}

impl Layer for HeatmapLayer {
    fn id(&self) -> LayerId {
        self.id
    }
}

impl HasParams for HeatmapLayer {
    fn layer_state(&self) -> &LayerState {
        &self.state
    }

    fn layer_state_mut(&mut self) -> &mut LayerState {
        &mut self.state
    }
}

impl TileLayer for HeatmapLayer {
    fn meta(&self) -> &LayerMeta {
        &self.meta
    }
}

impl HasColorRamp for HeatmapLayer {
    fn color_ramp(&self) -> &ColorRamp {
        &self.ramp
    }

    fn color_ramp_mut(&mut self) -> &mut ColorRamp {
        &mut self.ramp
    }
}

impl HasExtrema for HeatmapLayer {}
impl HasBinning for HeatmapLayer {}
impl HasTiling for HeatmapLayer {}
impl HasTimeRange for HeatmapLayer {}
impl HasTopics for HeatmapLayer {}
