use serde_json::Value;
use streaming::TileParams;

pub const RESOLUTION: &str = "resolution";
pub const TIME_FROM: &str = "from";
pub const TIME_TO: &str = "to";
pub const TIME_FIELD: &str = "time";
pub const TIME_INTERVAL: &str = "interval";
pub const TOPICS: &str = "topics";
pub const TOPIC_FIELD: &str = "text";
pub const X_FIELD: &str = "x";
pub const Y_FIELD: &str = "y";
pub const EXTENT_TOP: &str = "top";
pub const EXTENT_BOTTOM: &str = "bottom";
pub const EXTENT_LEFT: &str = "left";
pub const EXTENT_RIGHT: &str = "right";

/// Named request parameters owned by one layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerParams {
    values: TileParams,
}

impl LayerParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }

    /// Store `value` under `name`. Returns false (and stores nothing) if the
    /// parameter already holds an equal value.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        if self.values.get(name) == Some(&value) {
            return false;
        }
        self.values.insert(name.to_string(), value);
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.values.remove(name).is_some()
    }

    /// Parameters as sent on the wire.
    pub fn to_tile_params(&self) -> TileParams {
        self.values.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_reports_changes_only() {
        let mut p = LayerParams::new();
        assert!(p.set(RESOLUTION, json!(64)));
        assert!(!p.set(RESOLUTION, json!(64)));
        assert!(p.set(RESOLUTION, json!(32)));
        assert_eq!(p.get_i64(RESOLUTION), Some(32));
        assert!(p.remove(RESOLUTION));
        assert!(p.is_empty());
    }
}
