use serde::{Deserialize, Serialize};

use crate::extrema::Extrema;

/// How a value is normalised into `[0, 1]` against an extrema range.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleKind {
    Linear,
    #[default]
    Log,
}

impl std::str::FromStr for ScaleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "log" => Ok(Self::Log),
            other => Err(format!("unknown scale kind: {other}")),
        }
    }
}

/// Normalise `value` into `[0, 1]`.
///
/// The value is clamped into the range first. Degenerate inputs never panic:
/// a zero-width range divides by 1, log bounds that are not positive are read
/// as 1, and any non-finite intermediate result maps to 0.
pub fn normalize(value: f64, extrema: Extrema, kind: ScaleKind) -> f64 {
    let Extrema { min, max } = extrema;
    // min/max order is not guaranteed (the empty range is {+inf, 0}), so no f64::clamp.
    let clamped = value.min(max).max(min);
    let t = match kind {
        ScaleKind::Linear => {
            let range = max - min;
            let range = if range == 0.0 { 1.0 } else { range };
            (clamped - min) / range
        }
        ScaleKind::Log => {
            let log_min = positive_or_one(min).log10();
            let log_max = positive_or_one(max).log10();
            let log_range = log_max - log_min;
            let log_range = if log_range == 0.0 { 1.0 } else { log_range };
            (positive_or_one(clamped).log10() - log_min) / log_range
        }
    };
    if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 }
}

fn positive_or_one(v: f64) -> f64 {
    if v > 0.0 { v } else { 1.0 }
}

/// Round a unit fraction to a percentage bucket on the nearest 10.
pub fn percent_bucket(t: f64) -> u32 {
    ((t * 100.0) / 10.0).round() as u32 * 10
}
