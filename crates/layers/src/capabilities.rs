//! Capability traits shared by the tile layers.
//!
//! Each trait is a thin facade over the layer's [`LayerState`]; a layer opts in
//! by implementing [`HasParams`] and naming the capabilities it supports.

use foundation::Extrema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::params::*;
use crate::state::LayerState;
use crate::symbology::{ColorRamp, ColorRampUpdate};

pub trait HasParams {
    fn layer_state(&self) -> &LayerState;
    fn layer_state_mut(&mut self) -> &mut LayerState;
}

pub trait HasExtrema: HasParams {
    fn extrema(&self) -> Extrema {
        self.layer_state().extrema()
    }

    fn update_extrema(&mut self, observed: Extrema) -> bool {
        self.layer_state_mut().report_extrema(observed)
    }

    fn clear_extrema(&mut self) {
        self.layer_state_mut().clear_extrema();
    }
}

pub trait HasColorRamp {
    fn color_ramp(&self) -> &ColorRamp;
    fn color_ramp_mut(&mut self) -> &mut ColorRamp;

    /// Apply a partial update; endpoints left `None` keep their value.
    fn set_color_ramp(&mut self, update: ColorRampUpdate) -> bool {
        self.color_ramp_mut().apply(update)
    }
}

pub trait HasBinning: HasParams {
    fn set_resolution(&mut self, resolution: u32) -> bool {
        self.layer_state_mut().set_param(RESOLUTION, resolution)
    }

    fn resolution(&self) -> Option<u32> {
        self.layer_state()
            .params()
            .get_i64(RESOLUTION)
            .and_then(|r| u32::try_from(r).ok())
    }
}

/// Data-space bounds of the tiled domain. Unset edges are left untouched on update.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extents {
    pub top: Option<f64>,
    pub bottom: Option<f64>,
    pub left: Option<f64>,
    pub right: Option<f64>,
}

pub trait HasTiling: HasParams {
    fn set_x_field(&mut self, field: &str) -> bool {
        self.layer_state_mut().set_param(X_FIELD, field)
    }

    fn x_field(&self) -> Option<&str> {
        self.layer_state().params().get_str(X_FIELD)
    }

    fn set_y_field(&mut self, field: &str) -> bool {
        self.layer_state_mut().set_param(Y_FIELD, field)
    }

    fn y_field(&self) -> Option<&str> {
        self.layer_state().params().get_str(Y_FIELD)
    }

    fn set_extents(&mut self, extents: Extents) -> bool {
        let state = self.layer_state_mut();
        let mut changed = false;
        for (name, edge) in [
            (EXTENT_TOP, extents.top),
            (EXTENT_BOTTOM, extents.bottom),
            (EXTENT_LEFT, extents.left),
            (EXTENT_RIGHT, extents.right),
        ] {
            if let Some(v) = edge {
                changed |= state.set_param(name, v);
            }
        }
        changed
    }

    fn extents(&self) -> Extents {
        let params = self.layer_state().params();
        Extents {
            top: params.get_f64(EXTENT_TOP),
            bottom: params.get_f64(EXTENT_BOTTOM),
            left: params.get_f64(EXTENT_LEFT),
            right: params.get_f64(EXTENT_RIGHT),
        }
    }
}

/// Inclusive time window in epoch milliseconds.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl TimeRange {
    pub fn new(from: i64, to: i64) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }
}

pub trait HasTimeRange: HasParams {
    fn set_time_range(&mut self, range: TimeRange) -> bool {
        let state = self.layer_state_mut();
        let mut changed = false;
        for (name, bound) in [(TIME_FROM, range.from), (TIME_TO, range.to)] {
            changed |= match bound {
                Some(v) => state.set_param(name, v),
                None => state.remove_param(name),
            };
        }
        changed
    }

    fn time_range(&self) -> TimeRange {
        let params = self.layer_state().params();
        TimeRange {
            from: params.get_i64(TIME_FROM),
            to: params.get_i64(TIME_TO),
        }
    }

    fn set_time_field(&mut self, field: &str) -> bool {
        self.layer_state_mut().set_param(TIME_FIELD, field)
    }

    fn time_field(&self) -> Option<&str> {
        self.layer_state().params().get_str(TIME_FIELD)
    }
}

pub trait HasTimeBucket: HasTimeRange {
    /// Bucket interval name understood by the server, e.g. `"day"` or `"week"`.
    fn set_time_interval(&mut self, interval: &str) -> bool {
        self.layer_state_mut().set_param(TIME_INTERVAL, interval)
    }

    fn time_interval(&self) -> Option<&str> {
        self.layer_state().params().get_str(TIME_INTERVAL)
    }
}

/// Lower-case, sort and comma-join a topic list.
pub fn normalize_topics<I, S>(topics: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut topics: Vec<String> = topics.into_iter().map(|t| t.as_ref().to_lowercase()).collect();
    topics.sort();
    topics.join(",")
}

pub trait HasTopics: HasParams {
    fn set_topics<I, S>(&mut self, topics: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        Self: Sized,
    {
        let joined = normalize_topics(topics);
        self.layer_state_mut().set_param(TOPICS, Value::String(joined))
    }

    fn topics(&self) -> Vec<String> {
        match self.layer_state().params().get_str(TOPICS) {
            Some(s) if !s.is_empty() => s.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }

    fn set_topic_field(&mut self, field: &str) -> bool {
        self.layer_state_mut().set_param(TOPIC_FIELD, field)
    }

    fn topic_field(&self) -> Option<&str> {
        self.layer_state().params().get_str(TOPIC_FIELD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LayerPhase;

    #[derive(Default)]
    struct Probe {
        state: LayerState,
        ramp: ColorRamp,
    }

    impl HasParams for Probe {
        fn layer_state(&self) -> &LayerState {
            &self.state
        }
        fn layer_state_mut(&mut self) -> &mut LayerState {
            &mut self.state
        }
    }
    impl HasExtrema for Probe {}
    impl HasBinning for Probe {}
    impl HasTiling for Probe {}
    impl HasTimeRange for Probe {}
    impl HasTimeBucket for Probe {}
    impl HasTopics for Probe {}
    impl HasColorRamp for Probe {
        fn color_ramp(&self) -> &ColorRamp {
            &self.ramp
        }
        fn color_ramp_mut(&mut self) -> &mut ColorRamp {
            &mut self.ramp
        }
    }

    #[test]
    fn topics_are_normalized() {
        let mut p = Probe::default();
        assert!(p.set_topics(["Zeta", "alpha", "Beta"]));
        assert_eq!(p.state.params().get_str(TOPICS), Some("alpha,beta,zeta"));
        assert_eq!(p.topics(), vec!["alpha", "beta", "zeta"]);

        p.update_extrema(Extrema::new(1.0, 2.0));
        assert!(!p.set_topics(["beta", "ZETA", "Alpha"]));
        assert_eq!(p.extrema(), Extrema::new(1.0, 2.0));
    }

    #[test]
    fn resolution_change_resets_extrema() {
        let mut p = Probe::default();
        p.set_resolution(64);
        p.update_extrema(Extrema::new(0.0, 50.0));
        assert_eq!(p.state.phase(), LayerPhase::Accumulating);

        assert!(!p.set_resolution(64));
        assert_eq!(p.extrema(), Extrema::new(0.0, 50.0));

        assert!(p.set_resolution(128));
        assert_eq!(p.resolution(), Some(128));
        assert_eq!(p.extrema(), Extrema::EMPTY);
    }

    #[test]
    fn time_range_updates_both_bounds() {
        let mut p = Probe::default();
        assert!(p.set_time_range(TimeRange::new(1_000, 2_000)));
        assert_eq!(p.time_range(), TimeRange::new(1_000, 2_000));
        assert!(!p.set_time_range(TimeRange::new(1_000, 2_000)));
        assert!(p.set_time_range(TimeRange {
            from: Some(1_000),
            to: None
        }));
        assert_eq!(p.time_range().to, None);

        assert!(p.set_time_interval("week"));
        assert_eq!(p.time_interval(), Some("week"));
        assert!(p.set_time_field("timestamp"));
        assert_eq!(p.time_field(), Some("timestamp"));
    }

    #[test]
    fn extents_merge_partially() {
        let mut p = Probe::default();
        p.set_extents(Extents {
            top: Some(90.0),
            bottom: Some(-90.0),
            left: Some(-180.0),
            right: Some(180.0),
        });
        p.update_extrema(Extrema::new(1.0, 4.0));
        assert!(p.set_extents(Extents {
            top: Some(85.0),
            ..Extents::default()
        }));
        assert_eq!(p.extents().top, Some(85.0));
        assert_eq!(p.extents().bottom, Some(-90.0));
        assert_eq!(p.extrema(), Extrema::EMPTY);

        assert!(p.set_x_field("lon"));
        assert!(p.set_y_field("lat"));
        assert_eq!((p.x_field(), p.y_field()), (Some("lon"), Some("lat")));
    }

    #[test]
    fn color_ramp_is_independent_of_extrema() {
        let mut p = Probe::default();
        p.update_extrema(Extrema::new(1.0, 4.0));
        assert!(p.set_color_ramp(ColorRampUpdate {
            from: Some(crate::symbology::Rgba::new(0, 0, 0, 0)),
            to: None,
        }));
        assert_eq!(p.extrema(), Extrema::new(1.0, 4.0));
        assert_eq!(p.color_ramp().to, ColorRamp::DEFAULT_TO);
    }
}
