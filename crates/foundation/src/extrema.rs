use serde::{Deserialize, Serialize};

/// Observed value range used to normalise colour and size scales.
///
/// The empty range is `{ min: +inf, max: 0 }`: any finite observation widens
/// `min`, and any positive observation widens `max`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extrema {
    pub min: f64,
    pub max: f64,
}

impl Extrema {
    pub const EMPTY: Extrema = Extrema {
        min: f64::INFINITY,
        max: 0.0,
    };

    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Range covering every finite value in `values`, or `None` if there is none.
    pub fn of(values: &[f64]) -> Option<Self> {
        let mut out: Option<Extrema> = None;
        for v in values.iter().copied().filter(|v| v.is_finite()) {
            out = Some(match out {
                None => Extrema::new(v, v),
                Some(e) => Extrema::new(e.min.min(v), e.max.max(v)),
            });
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Widen-only merge. Returns true if either bound moved.
    pub fn widen(&mut self, observed: Extrema) -> bool {
        let mut changed = false;
        if observed.min < self.min {
            self.min = observed.min;
            changed = true;
        }
        if observed.max > self.max {
            self.max = observed.max;
            changed = true;
        }
        changed
    }
}

impl Default for Extrema {
    fn default() -> Self {
        Self::EMPTY
    }
}
