use foundation::Extrema;

/// Running value range for one layer's current parameter set.
///
/// `min` never increases and `max` never decreases between resets.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtremaTracker {
    current: Extrema,
    reports: u64,
}

impl ExtremaTracker {
    pub fn new() -> Self {
        Self {
            current: Extrema::EMPTY,
            reports: 0,
        }
    }

    pub fn current(&self) -> Extrema {
        self.current
    }

    /// Number of ranges reported since the last reset.
    pub fn reports(&self) -> u64 {
        self.reports
    }

    /// Merge an observed range. Returns true if either bound widened.
    pub fn report(&mut self, observed: Extrema) -> bool {
        self.reports += 1;
        self.current.widen(observed)
    }

    pub fn reset(&mut self) {
        self.current = Extrema::EMPTY;
        self.reports = 0;
    }
}

impl Default for ExtremaTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::ExtremaTracker;
    use foundation::Extrema;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn starts_empty() {
        let t = ExtremaTracker::new();
        assert_eq!(t.current().min, f64::INFINITY);
        assert_eq!(t.current().max, 0.0);
        assert_eq!(t.reports(), 0);
    }

    #[test]
    fn bounds_are_monotonic_under_random_reports() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut t = ExtremaTracker::new();
        let mut prev = t.current();
        for _ in 0..500 {
            let a: f64 = rng.gen_range(-50.0..5_000.0);
            let b: f64 = rng.gen_range(-50.0..5_000.0);
            let observed = Extrema::new(a.min(b), a.max(b));
            let changed = t.report(observed);
            let now = t.current();
            assert!(now.min <= prev.min);
            assert!(now.max >= prev.max);
            assert_eq!(changed, now != prev);
            prev = now;
        }
    }

    #[test]
    fn reset_restores_empty_range() {
        let mut t = ExtremaTracker::new();
        t.report(Extrema::new(2.0, 9.0));
        t.reset();
        assert_eq!(t.current(), Extrema::EMPTY);
        assert_eq!(t.reports(), 0);
    }
}
