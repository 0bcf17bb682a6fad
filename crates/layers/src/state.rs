//! Per-layer parameter set, extrema and lifecycle.
//!
//! A layer starts `Idle`, becomes `Configured` once a parameter is set and
//! `Accumulating` after the first tile reports its value range. Reports made
//! while `Idle` still widen the range but leave the phase alone. Any parameter
//! change drops back to `Configured` and starts a new extrema generation, since
//! ranges observed under one parameter set say nothing about the next.

use std::collections::{BTreeMap, VecDeque};

use foundation::Extrema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use streaming::TileCoord;
use tracing::debug;

use crate::extrema::ExtremaTracker;
use crate::params::LayerParams;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LayerPhase {
    Idle,
    Configured,
    Accumulating,
}

/// What a layer does when a tile widens its extrema mid-render.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtremaPolicy {
    /// Draw with the widened range and invalidate tiles drawn earlier.
    #[default]
    Redraw,
    /// Abandon the render of the tile that widened the range.
    Abort,
}

/// Result of merging one tile's range into the layer's extrema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Unchanged,
    Widened,
    Abort,
}

#[derive(Debug, Clone)]
pub struct LayerState {
    params: LayerParams,
    extrema: ExtremaTracker,
    phase: LayerPhase,
    generation: u64,
}

impl LayerState {
    pub fn new() -> Self {
        Self {
            params: LayerParams::new(),
            extrema: ExtremaTracker::new(),
            phase: LayerPhase::Idle,
            generation: 0,
        }
    }

    pub fn phase(&self) -> LayerPhase {
        self.phase
    }

    pub fn params(&self) -> &LayerParams {
        &self.params
    }

    /// Bumped whenever the parameter set or extrema are reset.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn extrema(&self) -> Extrema {
        self.extrema.current()
    }

    /// Store a parameter. A differing value resets extrema and returns true;
    /// an equal value leaves the layer untouched.
    pub fn set_param(&mut self, name: &str, value: impl Into<Value>) -> bool {
        if !self.params.set(name, value.into()) {
            return false;
        }
        debug!(param = name, "layer parameter changed; extrema reset");
        self.reset();
        true
    }

    pub fn remove_param(&mut self, name: &str) -> bool {
        if !self.params.remove(name) {
            return false;
        }
        self.reset();
        true
    }

    /// Widen-only merge of an observed range. Returns true if a bound moved.
    pub fn report_extrema(&mut self, observed: Extrema) -> bool {
        let widened = self.extrema.report(observed);
        if self.phase == LayerPhase::Configured {
            self.phase = LayerPhase::Accumulating;
        }
        widened
    }

    /// Merge `observed` and decide how the current render proceeds.
    pub fn observe(&mut self, observed: Extrema, policy: ExtremaPolicy) -> Observation {
        if !self.report_extrema(observed) {
            return Observation::Unchanged;
        }
        match policy {
            ExtremaPolicy::Redraw => Observation::Widened,
            ExtremaPolicy::Abort => Observation::Abort,
        }
    }

    pub fn clear_extrema(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.extrema.reset();
        self.generation += 1;
        self.phase = if self.params.is_empty() {
            LayerPhase::Idle
        } else {
            LayerPhase::Configured
        };
    }
}

impl Default for LayerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded inputs of tiles drawn under the current layer generation, kept so a
/// widened range can redraw them without another request.
///
/// Bounded: once `capacity` tiles are held, the least recently drawn one is
/// evicted. Evicted tiles are no longer reported for redraw, so callers should
/// still `remove` tiles as they leave the view.
#[derive(Debug, Clone)]
pub struct DrawnTiles<T> {
    generation: u64,
    capacity: usize,
    tiles: BTreeMap<TileCoord, T>,
    order: VecDeque<TileCoord>,
}

impl<T> DrawnTiles<T> {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            generation: 0,
            capacity: capacity.max(1),
            tiles: BTreeMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Forget everything drawn under an older generation.
    pub fn sync(&mut self, generation: u64) {
        if self.generation != generation {
            self.tiles.clear();
            self.order.clear();
            self.generation = generation;
        }
    }

    pub fn insert(&mut self, coord: TileCoord, input: T) {
        if self.tiles.insert(coord, input).is_some() {
            self.order.retain(|c| *c != coord);
        }
        self.order.push_back(coord);
        while self.tiles.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.tiles.remove(&oldest);
            debug!(x = oldest.x, y = oldest.y, z = oldest.z, "evicting drawn tile input");
        }
    }

    pub fn get(&self, coord: &TileCoord) -> Option<&T> {
        self.tiles.get(coord)
    }

    pub fn remove(&mut self, coord: &TileCoord) -> Option<T> {
        let removed = self.tiles.remove(coord);
        if removed.is_some() {
            self.order.retain(|c| c != coord);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Coordinates of every drawn tile other than `coord`.
    pub fn others(&self, coord: TileCoord) -> Vec<TileCoord> {
        self.tiles.keys().copied().filter(|c| *c != coord).collect()
    }
}

impl<T> Default for DrawnTiles<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lifecycle_follows_params_and_reports() {
        let mut s = LayerState::new();
        assert_eq!(s.phase(), LayerPhase::Idle);

        assert!(s.report_extrema(Extrema::new(1.0, 4.0)));
        assert_eq!(s.phase(), LayerPhase::Idle);
        assert_eq!(s.extrema(), Extrema::new(1.0, 4.0));

        assert!(s.set_param("resolution", 64));
        assert_eq!(s.phase(), LayerPhase::Configured);
        assert_eq!(s.extrema(), Extrema::EMPTY);

        assert!(s.report_extrema(Extrema::new(1.0, 10.0)));
        assert_eq!(s.phase(), LayerPhase::Accumulating);

        assert!(s.set_param("resolution", 32));
        assert_eq!(s.phase(), LayerPhase::Configured);
        assert_eq!(s.extrema(), Extrema::EMPTY);
    }

    #[test]
    fn equal_param_keeps_extrema() {
        let mut s = LayerState::new();
        s.set_param("topics", json!("a,b"));
        s.report_extrema(Extrema::new(1.0, 10.0));
        let generation = s.generation();

        assert!(!s.set_param("topics", json!("a,b")));
        assert_eq!(s.extrema(), Extrema::new(1.0, 10.0));
        assert_eq!(s.generation(), generation);
        assert_eq!(s.phase(), LayerPhase::Accumulating);
    }

    #[test]
    fn field_name_change_resets_extrema() {
        let mut s = LayerState::new();
        s.set_param("time", "timestamp");
        s.report_extrema(Extrema::new(0.0, 3.0));
        assert!(s.set_param("time", "created_at"));
        assert_eq!(s.extrema(), Extrema::EMPTY);
    }

    #[test]
    fn observe_applies_policy_only_on_widening() {
        let mut s = LayerState::new();
        assert_eq!(s.observe(Extrema::new(1.0, 5.0), ExtremaPolicy::Redraw), Observation::Widened);
        assert_eq!(s.observe(Extrema::new(2.0, 4.0), ExtremaPolicy::Redraw), Observation::Unchanged);
        assert_eq!(s.observe(Extrema::new(2.0, 9.0), ExtremaPolicy::Abort), Observation::Abort);
        assert_eq!(s.extrema(), Extrema::new(1.0, 9.0));
    }

    #[test]
    fn drawn_tiles_follow_generation() {
        let mut s = LayerState::new();
        let mut drawn = DrawnTiles::new();
        drawn.sync(s.generation());
        drawn.insert(TileCoord::new(0, 0, 1), 1u8);
        drawn.insert(TileCoord::new(1, 0, 1), 2u8);
        assert_eq!(drawn.others(TileCoord::new(0, 0, 1)), vec![TileCoord::new(1, 0, 1)]);

        s.set_param("resolution", 16);
        drawn.sync(s.generation());
        assert!(drawn.is_empty());
    }

    #[test]
    fn drawn_tiles_evict_least_recently_drawn() {
        let mut drawn = DrawnTiles::with_capacity(2);
        let (a, b, c) = (TileCoord::new(0, 0, 2), TileCoord::new(1, 0, 2), TileCoord::new(2, 0, 2));
        drawn.insert(a, 1u8);
        drawn.insert(b, 2u8);
        drawn.insert(a, 3u8);
        drawn.insert(c, 4u8);

        assert_eq!(drawn.len(), 2);
        assert_eq!(drawn.get(&a), Some(&3));
        assert_eq!(drawn.get(&b), None);
        assert_eq!(drawn.get(&c), Some(&4));

        assert_eq!(drawn.remove(&a), Some(3));
        drawn.insert(b, 5u8);
        assert_eq!(drawn.len(), 2);
        assert_eq!(drawn.get(&c), Some(&4));
    }
}
